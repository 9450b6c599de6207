use async_trait::async_trait;
use engine_config::StepSettings;
use engine_core::{
    Ticket, error::StepError, flags::StepFlags, metrics::StepStats, signal::PanicSignal,
};
use std::{sync::Arc, time::Duration};

pub mod processor;

pub use processor::ProcessorStep;

/// Lifecycle and inspection side of a pipeline step. Object safe so a stage
/// can hold steps of different batch types in one list.
#[async_trait]
pub trait StepControl: Send + Sync {
    fn name(&self) -> &str;

    /// Joins the step to its stage's panic signal. Must precede `start`.
    fn attach(&self, signal: PanicSignal);

    /// Spawns the workers. `receive` fails until this has been called.
    fn start(&self, flags: StepFlags) -> Result<(), StepError>;

    /// No more batches will be received. Workers drain what is queued, the
    /// step forwards everything it owes and then ends its downstream.
    fn end_of_upstream(&self);

    /// Every received batch has been processed and forwarded.
    fn is_completed(&self) -> bool;

    fn is_panicked(&self) -> bool;

    /// Takes the error the step panicked with, if any.
    fn take_panic(&self) -> Option<StepError>;

    fn stats(&self) -> StepStats;

    /// Releases queued batches, pooled buffers and worker tasks. Runs once;
    /// later calls return immediately.
    async fn close(&self);
}

/// A step accepting batches of type `T`.
#[async_trait]
pub trait Step<T>: StepControl {
    /// Hands a batch to one of the workers. Blocks while the step's queue is
    /// full and returns the time spent blocked.
    async fn receive(&self, ticket: Ticket, batch: T) -> Result<Duration, StepError>;
}

/// A step that forwards batches of type `O`.
pub trait Producing<O>: Send + Sync {
    /// Wires the next step. Must happen before `start`.
    fn set_downstream(&self, next: Arc<dyn Step<O>>);
}

/// Work done by the workers of a `ProcessorStep`.
///
/// The processor gets the input batch by reference so it can move the
/// contents out and leave the buffer behind for recycling.
#[async_trait]
pub trait BatchProcessor<I, O>: Send + Sync + 'static {
    async fn process(&self, ticket: Ticket, batch: &mut I) -> Result<O, StepError>;
}

/// Flags a step configured by `settings` is started with.
pub fn flags_for(settings: &StepSettings, recycle: bool) -> StepFlags {
    let mut flags = StepFlags::empty();
    flags.set(StepFlags::ORDER_SEND_DOWNSTREAM, settings.ordered);
    flags.set(StepFlags::RECYCLE_BATCHES, recycle);
    flags
}
