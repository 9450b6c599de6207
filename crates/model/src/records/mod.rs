pub mod batch;
pub mod entity;
pub mod row;
pub mod skip;
