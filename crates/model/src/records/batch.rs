use crate::records::{entity::InputEntity, row::RawRow};

/// Raw rows read from the input, one ticket worth.
pub type RowBatch = Vec<RawRow>;

/// Parsed entities, one ticket worth.
pub type EntityBatch = Vec<InputEntity>;

/// Buffers that can be handed back to a pool once their contents have been
/// moved out.
pub trait Recyclable: Default + Send {
    /// Drops any remaining contents while keeping the allocation.
    fn reset(&mut self);
}

impl<T: Send> Recyclable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}
