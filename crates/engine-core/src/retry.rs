use crate::error::SinkError;
use std::time::Duration;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// A single attempt; failures surface immediately.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Preset for sinks writing to local disk.
    pub fn for_sink() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(2))
    }

    /// Decides what to do after `attempts` failed tries ended in an error
    /// classified as `disposition`. `Some(delay)` means try again after it.
    pub fn next_delay(&self, attempts: usize, disposition: RetryDisposition) -> Option<Duration> {
        match disposition {
            RetryDisposition::Stop => None,
            RetryDisposition::Retry if attempts >= self.max_attempts => None,
            RetryDisposition::Retry => Some(self.delay_for(attempts.saturating_sub(1))),
        }
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let factor = 1u128 << attempt.min(6);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

/// I/O and storage hiccups are worth another attempt; a sink that rejects the
/// data or is already closed will not change its mind.
pub fn classify_sink_error(err: &SinkError) -> RetryDisposition {
    match err {
        SinkError::Io(_) | SinkError::Storage(_) => RetryDisposition::Retry,
        SinkError::Rejected(_) | SinkError::Closed => RetryDisposition::Stop,
    }
}
