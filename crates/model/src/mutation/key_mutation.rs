use crate::mutation::entry::Entry;
use serde::{Deserialize, Serialize};

/// Pending additions and deletions for one store key.
///
/// Two mutations for the same key merge by concatenation: nothing queued
/// before a flush is ever overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMutation {
    additions: Vec<Entry>,
    deletions: Vec<Entry>,
}

impl KeyMutation {
    pub fn new(additions: Vec<Entry>, deletions: Vec<Entry>) -> Self {
        KeyMutation {
            additions,
            deletions,
        }
    }

    pub fn additions_only(additions: Vec<Entry>) -> Self {
        Self::new(additions, Vec::new())
    }

    pub fn additions(&self) -> &[Entry] {
        &self.additions
    }

    pub fn deletions(&self) -> &[Entry] {
        &self.deletions
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    /// Number of individual operations this mutation carries.
    pub fn total_mutations(&self) -> usize {
        self.additions.len() + self.deletions.len()
    }

    pub fn merge(&mut self, other: KeyMutation) {
        self.additions.extend(other.additions);
        self.deletions.extend(other.deletions);
    }

    pub fn into_parts(self) -> (Vec<Entry>, Vec<Entry>) {
        (self.additions, self.deletions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_both_lists() {
        let mut first = KeyMutation::new(vec![Entry::new("a", "1")], vec![Entry::column_only("x")]);
        let second = KeyMutation::new(vec![Entry::new("a", "2")], vec![]);

        first.merge(second);

        assert_eq!(
            first.additions(),
            &[Entry::new("a", "1"), Entry::new("a", "2")]
        );
        assert_eq!(first.deletions(), &[Entry::column_only("x")]);
        assert_eq!(first.total_mutations(), 3);
    }
}
