//! Processors of the import pipeline: raw rows are parsed into entities,
//! entities are encoded into mutations and mutations are merged into the
//! import store.

pub mod encode;
pub mod import;
pub mod parse;

pub use encode::EncodeProcessor;
pub use import::ImportProcessor;
pub use parse::ParseProcessor;

/// Step names used by the import stage and its settings.
pub const PARSE_STEP: &str = "parse";
pub const ENCODE_STEP: &str = "encode";
pub const IMPORT_STEP: &str = "import";
