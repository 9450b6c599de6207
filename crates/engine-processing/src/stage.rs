use crate::step::{Producing, Step, StepControl};
use async_trait::async_trait;
use engine_core::{
    Ticket, error::StepError, flags::StepFlags, metrics::StepStats, signal::PanicSignal,
};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Supplies the batches fed into the first step of a stage.
#[async_trait]
pub trait BatchSource<T>: Send {
    /// `Ok(None)` once the input is exhausted.
    async fn next_batch(&mut self) -> Result<Option<T>, StepError>;
}

/// Feeds batches from an in-memory iterator.
pub struct IterSource<It>(pub It);

#[async_trait]
impl<T, It> BatchSource<T> for IterSource<It>
where
    T: Send,
    It: Iterator<Item = T> + Send,
{
    async fn next_batch(&mut self) -> Result<Option<T>, StepError> {
        Ok(self.0.next())
    }
}

/// Statistics of a finished (or failed) stage run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    /// Tickets handed to the first step.
    pub batches: u64,
    pub elapsed: Duration,
    /// One entry per step, in pipeline order.
    pub steps: Vec<StepStats>,
}

impl StageReport {
    pub fn step(&self, name: &str) -> Option<&StepStats> {
        self.steps.iter().find(|s| s.name == name)
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "stage '{}': {} batches in {}ms",
            self.name,
            self.batches,
            self.elapsed.as_millis()
        )?;
        for step in &self.steps {
            writeln!(f, "  {step}")?;
        }
        Ok(())
    }
}

/// The first fatal error of a failed run, with whatever statistics the steps
/// had gathered by then.
#[derive(Debug, Error)]
#[error("Stage '{}' failed: {error}", report.name)]
pub struct StageFailure {
    #[source]
    pub error: StepError,
    pub report: StageReport,
}

struct StageStep {
    step: Arc<dyn StepControl>,
    flags: StepFlags,
}

/// Ordered chain of steps fed from a single source.
pub struct Stage<I> {
    name: String,
    head: Arc<dyn Step<I>>,
    steps: Vec<StageStep>,
    signal: PanicSignal,
    poll_interval: Duration,
}

/// Builds a `Stage` step by step. `T` is the batch type the most recently
/// added step forwards.
pub struct StageBuilder<I, T> {
    name: String,
    head: Arc<dyn Step<I>>,
    tail: Arc<dyn Producing<T>>,
    steps: Vec<StageStep>,
    signal: PanicSignal,
    poll_interval: Duration,
}

impl<I: 'static, T: 'static> StageBuilder<I, T> {
    pub fn new<S>(name: impl Into<String>, first: Arc<S>, flags: StepFlags) -> Self
    where
        S: Step<I> + Producing<T> + 'static,
    {
        StageBuilder {
            name: name.into(),
            head: first.clone(),
            tail: first.clone(),
            steps: vec![StageStep { step: first, flags }],
            signal: PanicSignal::new(),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Appends `next` and makes it the downstream of the current last step.
    pub fn then<S, U>(self, next: Arc<S>, flags: StepFlags) -> StageBuilder<I, U>
    where
        S: Step<T> + Producing<U> + 'static,
        U: 'static,
    {
        self.tail.set_downstream(next.clone());
        let mut steps = self.steps;
        steps.push(StageStep {
            step: next.clone(),
            flags,
        });
        StageBuilder {
            name: self.name,
            head: self.head,
            tail: next,
            steps,
            signal: self.signal,
            poll_interval: self.poll_interval,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Halts the stage when `token` is cancelled, without blaming a step.
    pub fn cancel_on(mut self, token: &CancellationToken) -> Self {
        self.signal = PanicSignal::with_parent(token);
        self
    }

    pub fn build(self) -> Stage<I> {
        Stage {
            name: self.name,
            head: self.head,
            steps: self.steps,
            signal: self.signal,
            poll_interval: self.poll_interval,
        }
    }
}

impl<I: Send + 'static> Stage<I> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal(&self) -> &PanicSignal {
        &self.signal
    }

    /// Live statistics of every step, in pipeline order.
    pub fn stats(&self) -> Vec<StepStats> {
        self.steps.iter().map(|s| s.step.stats()).collect()
    }

    /// Runs the stage to completion: starts every step, feeds `source` into
    /// the first one with tickets `0, 1, 2, ...`, waits until every step has
    /// completed or one has panicked, and closes every step either way.
    pub async fn execute<S>(&self, mut source: S) -> Result<StageReport, StageFailure>
    where
        S: BatchSource<I>,
    {
        let started = Instant::now();
        info!(stage = %self.name, steps = self.steps.len(), "Stage started");

        let mut own_error = self.start_steps().err();
        let mut fed: Ticket = 0;

        if own_error.is_none() {
            match self.feed(&mut source, &mut fed).await {
                Ok(()) => self.head.end_of_upstream(),
                Err(e) if e.is_halt() => {}
                Err(e) => {
                    error!(stage = %self.name, error = %e, "Input failed, halting stage");
                    self.signal.raise(&self.name);
                    own_error = Some(e);
                }
            }
            self.await_completion().await;
        }

        for entry in &self.steps {
            entry.step.close().await;
        }

        let report = StageReport {
            name: self.name.clone(),
            batches: fed,
            elapsed: started.elapsed(),
            steps: self.stats(),
        };

        match self.first_error(own_error) {
            None => {
                info!(
                    stage = %self.name,
                    batches = fed,
                    duration_ms = report.elapsed.as_millis(),
                    "Stage completed"
                );
                Ok(report)
            }
            Some(error) => {
                error!(stage = %self.name, error = %error, batches = fed, "Stage failed");
                Err(StageFailure { error, report })
            }
        }
    }

    fn start_steps(&self) -> Result<(), StepError> {
        for entry in &self.steps {
            entry.step.attach(self.signal.clone());
        }
        // Downstream steps first so nothing is forwarded into an unstarted step.
        for entry in self.steps.iter().rev() {
            entry.step.start(entry.flags)?;
        }
        Ok(())
    }

    async fn feed<S: BatchSource<I>>(
        &self,
        source: &mut S,
        fed: &mut Ticket,
    ) -> Result<(), StepError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.signal.halted() => return Err(StepError::Halted),
                next = source.next_batch() => next?,
            };
            let Some(batch) = next else {
                return Ok(());
            };
            self.head.receive(*fed, batch).await?;
            *fed += 1;
        }
    }

    async fn await_completion(&self) {
        loop {
            if self.signal.is_halted() || self.steps.iter().any(|s| s.step.is_panicked()) {
                return;
            }
            if self.steps.iter().all(|s| s.step.is_completed()) {
                return;
            }
            tokio::select! {
                _ = self.signal.halted() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// The error of the step that panicked first. Errors of other steps are
    /// logged and dropped.
    fn first_error(&self, own: Option<StepError>) -> Option<StepError> {
        let first = self.signal.first().map(str::to_owned);
        let mut primary = own;

        for entry in &self.steps {
            let Some(err) = entry.step.take_panic() else {
                continue;
            };
            if primary.is_none() && first.as_deref() == Some(entry.step.name()) {
                primary = Some(err);
            } else {
                warn!(
                    stage = %self.name,
                    step = %entry.step.name(),
                    error = %err,
                    "Suppressed secondary step failure"
                );
            }
        }

        if primary.is_none() && self.signal.is_halted() {
            primary = Some(StepError::Halted);
        }
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{BatchProcessor, ProcessorStep};
    use engine_config::StepSettings;
    use std::sync::Mutex;

    struct Tag(&'static str);

    #[async_trait]
    impl BatchProcessor<Vec<u32>, Vec<u32>> for Tag {
        async fn process(&self, ticket: Ticket, batch: &mut Vec<u32>) -> Result<Vec<u32>, StepError> {
            if self.0 == "broken" && ticket == 3 {
                return Err(StepError::processing(self.0, "bad batch"));
            }
            Ok(std::mem::take(batch))
        }
    }

    #[derive(Clone, Default)]
    struct Tickets(Arc<Mutex<Vec<Ticket>>>);

    #[async_trait]
    impl BatchProcessor<Vec<u32>, ()> for Tickets {
        async fn process(&self, ticket: Ticket, _: &mut Vec<u32>) -> Result<(), StepError> {
            self.0.lock().unwrap().push(ticket);
            Ok(())
        }
    }

    fn stage(first: &'static str, seen: Tickets) -> Stage<Vec<u32>> {
        let first = Arc::new(ProcessorStep::new(first, StepSettings::default(), Tag(first)));
        let last = Arc::new(ProcessorStep::new("collect", StepSettings::default(), seen));
        StageBuilder::new("test", first, StepFlags::ORDER_SEND_DOWNSTREAM)
            .then::<_, ()>(last, StepFlags::ORDER_SEND_DOWNSTREAM)
            .poll_interval(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn assigns_consecutive_tickets_from_zero() {
        let seen = Tickets::default();
        let stage = stage("pass", seen.clone());

        let report = stage
            .execute(IterSource((0..25).map(|n| vec![n])))
            .await
            .unwrap();

        assert_eq!(report.batches, 25);
        assert_eq!(*seen.0.lock().unwrap(), (0..25).collect::<Vec<_>>());
        assert_eq!(report.step("pass").unwrap().done, 25);
        assert_eq!(report.step("collect").unwrap().received, 25);
    }

    #[tokio::test]
    async fn empty_input_completes() {
        let stage = stage("pass", Tickets::default());
        let report = stage.execute(IterSource(std::iter::empty())).await.unwrap();
        assert_eq!(report.batches, 0);
        assert_eq!(report.steps.len(), 2);
    }

    #[tokio::test]
    async fn step_panic_fails_the_stage_with_partial_stats() {
        let stage = stage("broken", Tickets::default());
        let failure = tokio::time::timeout(
            Duration::from_secs(5),
            stage.execute(IterSource((0..100).map(|n| vec![n]))),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(failure.error, StepError::Processing { ref step, .. } if step == "broken"));
        assert_eq!(stage.signal().first(), Some("broken"));
        assert!(failure.report.step("broken").unwrap().received >= 4);
    }

    struct FailingSource(u32);

    #[async_trait]
    impl BatchSource<Vec<u32>> for FailingSource {
        async fn next_batch(&mut self) -> Result<Option<Vec<u32>>, StepError> {
            self.0 += 1;
            if self.0 > 5 {
                return Err(StepError::processing("input", "unreadable"));
            }
            Ok(Some(vec![self.0]))
        }
    }

    #[tokio::test]
    async fn input_failure_fails_the_stage() {
        let stage = stage("pass", Tickets::default());
        let failure = stage.execute(FailingSource(0)).await.unwrap_err();
        assert!(matches!(failure.error, StepError::Processing { ref step, .. } if step == "input"));
        assert_eq!(failure.report.batches, 5);
    }

    #[tokio::test]
    async fn external_cancellation_halts_the_stage() {
        let token = CancellationToken::new();
        let first = Arc::new(ProcessorStep::new("pass", StepSettings::default(), Tag("pass")));
        let last = Arc::new(ProcessorStep::new(
            "collect",
            StepSettings::default(),
            Tickets::default(),
        ));
        let stage = StageBuilder::new("test", first, StepFlags::empty())
            .then::<_, ()>(last, StepFlags::empty())
            .cancel_on(&token)
            .build();

        token.cancel();
        let failure = stage
            .execute(IterSource(std::iter::repeat_with(|| vec![1])))
            .await
            .unwrap_err();
        assert!(failure.error.is_halt());
    }
}
