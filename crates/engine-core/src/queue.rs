use crate::{error::QueueError, ticket::Ticket};
use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::sync::{
    self as tsync,
    mpsc::{self, error::TrySendError},
};
use tokio_util::sync::CancellationToken;

/// Bounded queue of ticketed batches between a step and its workers.
///
/// `put` parks the caller while `work_ahead` batches are already queued, which
/// is the only backpressure in the pipeline. Both ends give up as soon as the
/// halt token is cancelled so a panicking pipeline never leaves a task parked.
pub struct BatchQueue<T> {
    tx: Mutex<Option<mpsc::Sender<(Ticket, T)>>>,
    rx: tsync::Mutex<mpsc::Receiver<(Ticket, T)>>,
    queued: AtomicUsize,
    work_ahead: usize,
    halt: CancellationToken,
}

impl<T: Send> BatchQueue<T> {
    pub fn new(work_ahead: usize, halt: CancellationToken) -> Self {
        let work_ahead = work_ahead.max(1);
        let (tx, rx) = mpsc::channel(work_ahead);
        BatchQueue {
            tx: Mutex::new(Some(tx)),
            rx: tsync::Mutex::new(rx),
            queued: AtomicUsize::new(0),
            work_ahead,
            halt,
        }
    }

    pub fn work_ahead(&self) -> usize {
        self.work_ahead
    }

    /// Batches currently waiting for a worker.
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues a batch, returning how long the caller was blocked on a full
    /// queue.
    pub async fn put(&self, ticket: Ticket, batch: T) -> Result<Duration, QueueError> {
        if self.halt.is_cancelled() {
            return Err(QueueError::Halted);
        }
        let tx = self.sender()?;

        let (permit, waited) = match tx.try_reserve() {
            Ok(permit) => (permit, Duration::ZERO),
            Err(TrySendError::Closed(())) => return Err(QueueError::Closed),
            Err(TrySendError::Full(())) => {
                let start = Instant::now();
                let permit = tokio::select! {
                    biased;
                    _ = self.halt.cancelled() => return Err(QueueError::Halted),
                    permit = tx.reserve() => permit.map_err(|_| QueueError::Closed)?,
                };
                (permit, start.elapsed())
            }
        };

        // Counted before the batch is visible to a taker.
        self.queued.fetch_add(1, Ordering::AcqRel);
        permit.send((ticket, batch));
        Ok(waited)
    }

    /// Waits for the next batch. `Ok(None)` means end of upstream was signalled
    /// and every queued batch has been taken.
    pub async fn take(&self) -> Result<Option<(Ticket, T)>, QueueError> {
        let mut rx = tokio::select! {
            biased;
            _ = self.halt.cancelled() => return Err(QueueError::Halted),
            rx = self.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = self.halt.cancelled() => Err(QueueError::Halted),
            item = rx.recv() => {
                if item.is_some() {
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                }
                Ok(item)
            }
        }
    }

    /// No more batches will be put. Takers drain what is left and then see
    /// the end of the stream.
    pub fn end_of_upstream(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_ended(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Drops every queued batch and refuses further puts.
    pub fn clear(&self) -> usize {
        self.end_of_upstream();
        let Ok(mut rx) = self.rx.try_lock() else {
            return 0;
        };
        rx.close();
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.queued.store(0, Ordering::Release);
        dropped
    }

    fn sender(&self) -> Result<mpsc::Sender<(Ticket, T)>, QueueError> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(QueueError::Closed)
    }
}
