pub mod core;
pub mod mutation;
pub mod records;
