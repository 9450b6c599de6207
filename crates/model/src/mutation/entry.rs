use serde::{Deserialize, Serialize};

/// A single column/value cell under a store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub column: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(column: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Entry {
            column: column.into(),
            value: value.into(),
        }
    }

    /// A deletion only needs the column it removes.
    pub fn column_only(column: impl Into<Vec<u8>>) -> Self {
        Entry {
            column: column.into(),
            value: Vec::new(),
        }
    }
}
