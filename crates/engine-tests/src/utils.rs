#![allow(dead_code)]

use async_trait::async_trait;
use engine_core::{Ticket, error::StepError};
use engine_processing::step::BatchProcessor;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Deterministic pseudo-random processing delay of 0-3ms per ticket.
pub fn jitter(ticket: Ticket) -> Duration {
    let mixed = ticket.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    Duration::from_millis(mixed % 4)
}

/// Middle step of the test pipelines: sleeps for a jittered time, fails at
/// `fail_at` when set, and passes the batch on.
pub struct Transform {
    pub fail_at: Option<Ticket>,
}

#[async_trait]
impl BatchProcessor<Vec<u64>, Vec<u64>> for Transform {
    async fn process(&self, ticket: Ticket, batch: &mut Vec<u64>) -> Result<Vec<u64>, StepError> {
        let delay = jitter(ticket);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(ticket) {
            return Err(StepError::processing("transform", format!("injected failure at {ticket}")));
        }
        Ok(batch.drain(..).map(|v| v + 1).collect())
    }
}

/// Pass-through first step.
pub struct Forward;

#[async_trait]
impl BatchProcessor<Vec<u64>, Vec<u64>> for Forward {
    async fn process(&self, _: Ticket, batch: &mut Vec<u64>) -> Result<Vec<u64>, StepError> {
        Ok(std::mem::take(batch))
    }
}

/// Terminal step recording tickets in arrival order.
#[derive(Clone, Default)]
pub struct Collector {
    pub received: Arc<Mutex<Vec<(Ticket, Vec<u64>)>>>,
}

impl Collector {
    pub fn tickets(&self) -> Vec<Ticket> {
        self.received.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl BatchProcessor<Vec<u64>, ()> for Collector {
    async fn process(&self, ticket: Ticket, batch: &mut Vec<u64>) -> Result<(), StepError> {
        self.received
            .lock()
            .unwrap()
            .push((ticket, std::mem::take(batch)));
        Ok(())
    }
}
