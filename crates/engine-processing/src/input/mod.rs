pub mod collector;
pub mod extract;
pub mod header;
pub mod parser;

pub use collector::BadCollector;
pub use header::{Header, HeaderEntry};
pub use parser::EntityParser;
