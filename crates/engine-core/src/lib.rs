pub mod connectors;
pub mod error;
pub mod flags;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod signal;
pub mod ticket;

pub use ticket::Ticket;
