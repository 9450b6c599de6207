pub mod import_store;

pub use import_store::ImportStore;
