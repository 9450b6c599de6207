pub mod batch;
pub mod entry;
pub mod key;
pub mod key_mutation;

pub use batch::MutationBatch;
pub use entry::Entry;
pub use key::StoreKey;
pub use key_mutation::KeyMutation;
