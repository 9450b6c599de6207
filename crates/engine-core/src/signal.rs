use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Stage-wide panic flag. The first step to raise it is remembered; raising it
/// at all cancels the halt token every queue of the stage listens on.
#[derive(Debug, Clone, Default)]
pub struct PanicSignal {
    token: CancellationToken,
    first: Arc<OnceLock<String>>,
}

impl PanicSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that is also halted when `parent` is cancelled.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        PanicSignal {
            token: parent.child_token(),
            first: Arc::new(OnceLock::new()),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Marks `step` as panicked. Returns `true` if it was the first to do so.
    pub fn raise(&self, step: &str) -> bool {
        let first = self.first.set(step.to_string()).is_ok();
        self.token.cancel();
        first
    }

    /// Halts without blaming a step, e.g. on external cancellation.
    pub fn halt(&self) {
        self.token.cancel();
    }

    pub fn is_halted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Name of the step that panicked first, if any.
    pub fn first(&self) -> Option<&str> {
        self.first.get().map(String::as_str)
    }

    pub async fn halted(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_raise_wins() {
        let signal = PanicSignal::new();
        assert!(signal.raise("encode"));
        assert!(!signal.raise("import"));
        assert_eq!(signal.first(), Some("encode"));
        assert!(signal.is_halted());
    }

    #[test]
    fn parent_cancellation_halts_without_blame() {
        let parent = CancellationToken::new();
        let signal = PanicSignal::with_parent(&parent);
        parent.cancel();
        assert!(signal.is_halted());
        assert_eq!(signal.first(), None);
    }
}
