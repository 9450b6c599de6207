use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Guarantees a step is asked to uphold when it is started.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StepFlags: u32 {
        /// Batches must reach the downstream step in ticket order.
        const ORDER_SEND_DOWNSTREAM = 0x1;
        /// Consumed input batches go back to the upstream pool.
        const RECYCLE_BATCHES = 0x2;
    }
}

impl StepFlags {
    pub fn ordered(&self) -> bool {
        self.contains(StepFlags::ORDER_SEND_DOWNSTREAM)
    }

    pub fn recycles(&self) -> bool {
        self.contains(StepFlags::RECYCLE_BATCHES)
    }
}
