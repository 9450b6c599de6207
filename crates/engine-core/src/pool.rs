use model::records::batch::Recyclable;
use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

/// Free list of batch buffers shared between a producer and the step that
/// consumes its batches.
#[derive(Debug)]
pub struct BatchPool<T> {
    free: Mutex<Vec<T>>,
    capacity: usize,
    reused: AtomicU64,
}

impl<T: Recyclable> BatchPool<T> {
    pub fn new(capacity: usize) -> Self {
        BatchPool {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            reused: AtomicU64::new(0),
        }
    }

    /// Hands out a recycled buffer when one is available.
    pub fn acquire(&self) -> T {
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match recycled {
            Some(batch) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                batch
            }
            None => T::default(),
        }
    }

    pub fn release(&self, mut batch: T) {
        batch.reset();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(batch);
        }
    }

    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of `acquire` calls served from the free list.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Where a step returns input buffers it has consumed.
pub trait Recycler<T>: Send + Sync {
    fn recycle(&self, batch: T);

    fn clear(&self);
}

impl<T: Recyclable> Recycler<T> for BatchPool<T> {
    fn recycle(&self, batch: T) {
        self.release(batch);
    }

    fn clear(&self) {
        BatchPool::clear(self);
    }
}
