use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Default)]
struct InnerCounters {
    received: AtomicU64,
    processed: AtomicU64,
    done: AtomicU64,
    queue_wait_nanos: AtomicU64,
    downstream_wait_nanos: AtomicU64,
    processing_nanos: AtomicU64,
}

/// Live progress counters of a step, shared with its workers.
#[derive(Debug, Clone, Default)]
pub struct StepCounters {
    inner: Arc<InnerCounters>,
}

/// Point-in-time view of a step's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepStats {
    pub name: String,
    pub workers: usize,
    /// Batches accepted by `receive`.
    pub received: u64,
    /// Batches a worker finished processing.
    pub processed: u64,
    /// Batches fully handled: forwarded downstream, or consumed by a terminal step.
    pub done: u64,
    /// Batches currently queued.
    pub queued: usize,
    /// Time upstream spent blocked on this step's full queue.
    pub queue_wait: Duration,
    /// Time this step spent blocked on its downstream's full queue.
    pub downstream_wait: Duration,
    /// Time spent inside the processor, summed over workers.
    pub processing: Duration,
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl StepCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, queue_wait: Duration) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
        self.inner
            .queue_wait_nanos
            .fetch_add(nanos(queue_wait), Ordering::Relaxed);
    }

    pub fn record_processed(&self, elapsed: Duration) {
        self.inner.processed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .processing_nanos
            .fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    pub fn record_done(&self, downstream_wait: Duration) {
        self.inner.done.fetch_add(1, Ordering::Release);
        self.inner
            .downstream_wait_nanos
            .fetch_add(nanos(downstream_wait), Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.inner.received.load(Ordering::Acquire)
    }

    pub fn done(&self) -> u64 {
        self.inner.done.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, name: &str, workers: usize, queued: usize) -> StepStats {
        StepStats {
            name: name.to_string(),
            workers,
            received: self.inner.received.load(Ordering::Relaxed),
            processed: self.inner.processed.load(Ordering::Relaxed),
            done: self.inner.done.load(Ordering::Relaxed),
            queued,
            queue_wait: Duration::from_nanos(self.inner.queue_wait_nanos.load(Ordering::Relaxed)),
            downstream_wait: Duration::from_nanos(
                self.inner.downstream_wait_nanos.load(Ordering::Relaxed),
            ),
            processing: Duration::from_nanos(self.inner.processing_nanos.load(Ordering::Relaxed)),
        }
    }
}

impl StepStats {
    pub fn avg_processing(&self) -> Duration {
        match u32::try_from(self.processed) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.processing / n,
        }
    }
}

impl fmt::Display for StepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [workers={} received={} processed={} done={} queued={} queue_wait={}ms downstream_wait={}ms avg={}us]",
            self.name,
            self.workers,
            self.received,
            self.processed,
            self.done,
            self.queued,
            self.queue_wait.as_millis(),
            self.downstream_wait.as_millis(),
            self.avg_processing().as_micros(),
        )
    }
}
