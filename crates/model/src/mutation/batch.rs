use crate::mutation::{key::StoreKey, key_mutation::KeyMutation};

/// Mutations produced for one ticket, in production order. Keys may repeat;
/// the import store merges them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    mutations: Vec<(StoreKey, KeyMutation)>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MutationBatch {
            mutations: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, key: StoreKey, mutation: KeyMutation) {
        self.mutations.push((key, mutation));
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn total_mutations(&self) -> usize {
        self.mutations.iter().map(|(_, m)| m.total_mutations()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(StoreKey, KeyMutation)> {
        self.mutations.iter()
    }
}

impl IntoIterator for MutationBatch {
    type Item = (StoreKey, KeyMutation);
    type IntoIter = std::vec::IntoIter<(StoreKey, KeyMutation)>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}

impl FromIterator<(StoreKey, KeyMutation)> for MutationBatch {
    fn from_iter<I: IntoIterator<Item = (StoreKey, KeyMutation)>>(iter: I) -> Self {
        MutationBatch {
            mutations: iter.into_iter().collect(),
        }
    }
}
