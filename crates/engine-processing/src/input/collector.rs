use engine_core::error::InputError;
use model::records::skip::SkipReport;
use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use tracing::warn;

/// Side channel for records that were skipped or only partly imported.
///
/// Every report counts against the tolerance; the report that exceeds it
/// turns into an error that aborts the run.
#[derive(Debug)]
pub struct BadCollector {
    tolerance: u64,
    seen: AtomicU64,
    reports: Mutex<Vec<SkipReport>>,
}

impl BadCollector {
    pub fn new(tolerance: u64) -> Self {
        BadCollector {
            tolerance,
            seen: AtomicU64::new(0),
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn collect(&self, report: SkipReport) -> Result<(), InputError> {
        let seen = self.seen.fetch_add(1, Ordering::AcqRel) + 1;
        warn!(
            source = %report.source,
            line = report.line,
            reason = %report.reason,
            "Bad input entry"
        );
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);

        if seen > self.tolerance {
            return Err(InputError::TooManyBadEntries {
                seen,
                tolerance: self.tolerance,
            });
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.seen.load(Ordering::Acquire)
    }

    pub fn tolerance(&self) -> u64 {
        self.tolerance
    }

    /// Collected reports, in the order they were collected.
    pub fn reports(&self) -> Vec<SkipReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
