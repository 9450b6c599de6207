pub mod encode;
pub mod input;
pub mod processors;
pub mod stage;
pub mod step;
pub mod store;
