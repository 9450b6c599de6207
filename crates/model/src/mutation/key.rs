use serde::{Deserialize, Serialize};
use std::fmt;

/// Row key in the storage engine. Opaque bytes; ordering is bytewise.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct StoreKey(Vec<u8>);

impl StoreKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        StoreKey(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for StoreKey {
    fn from(s: &str) -> Self {
        StoreKey(s.as_bytes().to_vec())
    }
}

impl From<String> for StoreKey {
    fn from(s: String) -> Self {
        StoreKey(s.into_bytes())
    }
}

impl From<Vec<u8>> for StoreKey {
    fn from(bytes: Vec<u8>) -> Self {
        StoreKey(bytes)
    }
}

impl AsRef<[u8]> for StoreKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "StoreKey({s:?})"),
            Err(_) => write!(f, "StoreKey({:02x?})", self.0),
        }
    }
}
