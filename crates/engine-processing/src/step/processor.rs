use super::{BatchProcessor, Producing, Step, StepControl};
use async_trait::async_trait;
use engine_config::StepSettings;
use engine_core::{
    Ticket,
    error::{QueueError, StepError},
    flags::StepFlags,
    metrics::{StepCounters, StepStats},
    pool::Recycler,
    queue::BatchQueue,
    signal::PanicSignal,
    ticket::TicketTracker,
};
use std::{
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A step backed by a fixed pool of workers that pull batches from a bounded
/// queue and run them through a `BatchProcessor`.
///
/// With `ORDER_SEND_DOWNSTREAM` finished batches pass through a ticket
/// tracker, so workers may finish in any order while the downstream still
/// sees tickets in sequence.
pub struct ProcessorStep<I, O, P> {
    shared: Arc<Shared<I, O, P>>,
}

struct Shared<I, O, P> {
    name: String,
    settings: StepSettings,
    processor: P,
    counters: StepCounters,
    signal: OnceLock<PanicSignal>,
    flags: OnceLock<StepFlags>,
    queue: OnceLock<BatchQueue<I>>,
    downstream: OnceLock<Arc<dyn Step<O>>>,
    recycler: OnceLock<Arc<dyn Recycler<I>>>,
    order: tokio::sync::Mutex<TicketTracker<O>>,
    active: AtomicUsize,
    upstream_ended: AtomicBool,
    completed: AtomicBool,
    panicked: AtomicBool,
    closed: AtomicBool,
    panic: Mutex<Option<StepError>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<I, O, P> ProcessorStep<I, O, P>
where
    I: Send + 'static,
    O: Send + 'static,
    P: BatchProcessor<I, O>,
{
    pub fn new(name: impl Into<String>, settings: StepSettings, processor: P) -> Self {
        ProcessorStep {
            shared: Arc::new(Shared {
                name: name.into(),
                settings,
                processor,
                counters: StepCounters::new(),
                signal: OnceLock::new(),
                flags: OnceLock::new(),
                queue: OnceLock::new(),
                downstream: OnceLock::new(),
                recycler: OnceLock::new(),
                order: tokio::sync::Mutex::new(TicketTracker::new()),
                active: AtomicUsize::new(0),
                upstream_ended: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                panicked: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                panic: Mutex::new(None),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Consumed input buffers go to `recycler` when the step is started with
    /// `RECYCLE_BATCHES`.
    pub fn with_recycler(self, recycler: Arc<dyn Recycler<I>>) -> Self {
        if self.shared.recycler.set(recycler).is_err() {
            warn!(step = %self.shared.name, "Recycler already set, ignoring");
        }
        self
    }

    pub fn settings(&self) -> &StepSettings {
        &self.shared.settings
    }
}

impl<I, O, P> Shared<I, O, P> {
    fn signal(&self) -> &PanicSignal {
        self.signal.get_or_init(PanicSignal::new)
    }

    fn flags(&self) -> StepFlags {
        self.flags.get().copied().unwrap_or_default()
    }

    fn is_halted(&self) -> bool {
        self.panicked.load(Ordering::Acquire) || self.signal().is_halted()
    }

    /// Marks the step panicked with `err` and halts the stage. Halt errors
    /// are fallout of another step's panic and are not recorded.
    fn fail(&self, err: StepError) {
        if err.is_halt() {
            return;
        }

        let message = err.to_string();
        {
            let mut slot = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                warn!(step = %self.name, error = %message, "Further failure of panicked step suppressed");
                return;
            }
            *slot = Some(err);
        }
        self.panicked.store(true, Ordering::Release);

        if self.signal().raise(&self.name) {
            error!(step = %self.name, error = %message, "Step panicked, halting stage");
        } else {
            warn!(step = %self.name, error = %message, "Step panicked after stage was halted");
        }
    }

    fn worker_exit(&self, worker: usize) {
        if std::thread::panicking() {
            self.fail(StepError::processing(
                self.name.as_str(),
                format!("worker {worker} panicked"),
            ));
        }

        if self.active.fetch_sub(1, Ordering::AcqRel) != 1
            || self.is_halted()
            || self.closed.load(Ordering::Acquire)
        {
            return;
        }

        if self.flags().ordered()
            && let Ok(order) = self.order.try_lock()
            && !order.is_drained()
        {
            self.fail(StepError::TicketGap {
                step: self.name.clone(),
                held: order.held(),
                expected: order.next_expected(),
            });
            return;
        }

        if let Some(next) = self.downstream.get() {
            next.end_of_upstream();
        }
        self.completed.store(true, Ordering::Release);

        info!(
            step = %self.name,
            received = self.counters.received(),
            done = self.counters.done(),
            "Step completed"
        );
    }
}

struct WorkerExit<I, O, P> {
    shared: Arc<Shared<I, O, P>>,
    worker: usize,
}

impl<I, O, P> Drop for WorkerExit<I, O, P> {
    fn drop(&mut self) {
        self.shared.worker_exit(self.worker);
    }
}

impl<I, O, P> Shared<I, O, P>
where
    I: Send + 'static,
    O: Send + 'static,
    P: BatchProcessor<I, O>,
{
    async fn run_worker(self: Arc<Self>, worker: usize) {
        let _exit = WorkerExit {
            shared: self.clone(),
            worker,
        };
        let Some(queue) = self.queue.get() else {
            return;
        };
        let recycler = self
            .flags()
            .recycles()
            .then(|| self.recycler.get().cloned())
            .flatten();

        loop {
            let (ticket, mut batch) = match queue.take().await {
                Ok(Some(item)) => item,
                Ok(None) | Err(_) => break,
            };

            let started = Instant::now();
            let result = self.processor.process(ticket, &mut batch).await;
            self.counters.record_processed(started.elapsed());

            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            };
            match &recycler {
                Some(recycler) => recycler.recycle(batch),
                None => drop(batch),
            }

            if let Err(e) = self.forward(ticket, output).await {
                self.fail(e);
                break;
            }
        }
    }

    async fn forward(&self, ticket: Ticket, output: O) -> Result<(), StepError> {
        if !self.flags().ordered() {
            return self.send(ticket, output).await;
        }

        // Held across the sends so released runs reach downstream in order.
        let mut order = self.order.lock().await;
        let ready = order
            .offer(ticket, output)
            .map_err(|source| StepError::DuplicateTicket {
                step: self.name.clone(),
                source,
            })?;
        for (ticket, output) in ready {
            self.send(ticket, output).await?;
        }
        Ok(())
    }

    async fn send(&self, ticket: Ticket, output: O) -> Result<(), StepError> {
        let waited = match self.downstream.get() {
            Some(next) => next.receive(ticket, output).await?,
            None => Duration::ZERO,
        };
        self.counters.record_done(waited);
        debug!(step = %self.name, ticket, waited_ms = waited.as_millis(), "Batch done");
        Ok(())
    }
}

#[async_trait]
impl<I, O, P> StepControl for ProcessorStep<I, O, P>
where
    I: Send + 'static,
    O: Send + 'static,
    P: BatchProcessor<I, O>,
{
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn attach(&self, signal: PanicSignal) {
        if self.shared.signal.set(signal).is_err() {
            warn!(step = %self.shared.name, "Step already attached to a panic signal");
        }
    }

    fn start(&self, flags: StepFlags) -> Result<(), StepError> {
        let shared = &self.shared;
        if shared.flags.set(flags).is_err() {
            return Err(StepError::AlreadyStarted(shared.name.clone()));
        }

        let queue = BatchQueue::new(shared.settings.work_ahead, shared.signal().token());
        if shared.queue.set(queue).is_err() {
            return Err(StepError::AlreadyStarted(shared.name.clone()));
        }
        if shared.upstream_ended.load(Ordering::SeqCst)
            && let Some(queue) = shared.queue.get()
        {
            queue.end_of_upstream();
        }

        let workers = shared.settings.workers.max(1);
        shared.active.store(workers, Ordering::Release);
        let mut handles = shared
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for worker in 0..workers {
            handles.push(tokio::spawn(Shared::run_worker(shared.clone(), worker)));
        }

        info!(
            step = %shared.name,
            workers,
            work_ahead = shared.settings.work_ahead,
            ordered = flags.ordered(),
            recycle = flags.recycles(),
            "Step started"
        );
        Ok(())
    }

    fn end_of_upstream(&self) {
        self.shared.upstream_ended.store(true, Ordering::SeqCst);
        if let Some(queue) = self.shared.queue.get() {
            queue.end_of_upstream();
        }
    }

    fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    fn is_panicked(&self) -> bool {
        self.shared.panicked.load(Ordering::Acquire)
    }

    fn take_panic(&self) -> Option<StepError> {
        self.shared
            .panic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn stats(&self) -> StepStats {
        let queued = self.shared.queue.get().map_or(0, BatchQueue::len);
        self.shared.counters.snapshot(
            &self.shared.name,
            self.shared.settings.workers.max(1),
            queued,
        )
    }

    async fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let handles = std::mem::take(
            &mut *shared
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !self.is_completed() {
            for handle in &handles {
                handle.abort();
            }
        }
        for joined in futures::future::join_all(handles).await {
            if let Err(source) = joined
                && source.is_panic()
            {
                shared.fail(StepError::Worker {
                    step: shared.name.clone(),
                    source,
                });
            }
        }

        // No worker can hold the receiving end any more.
        let dropped = shared.queue.get().map_or(0, BatchQueue::clear);
        shared.order.lock().await.clear();
        if let Some(recycler) = shared.recycler.get() {
            recycler.clear();
        }
        debug!(step = %shared.name, dropped, "Step closed");
    }
}

#[async_trait]
impl<I, O, P> Step<I> for ProcessorStep<I, O, P>
where
    I: Send + 'static,
    O: Send + 'static,
    P: BatchProcessor<I, O>,
{
    async fn receive(&self, ticket: Ticket, batch: I) -> Result<Duration, StepError> {
        let shared = &self.shared;
        let queue = shared
            .queue
            .get()
            .ok_or_else(|| StepError::NotStarted(shared.name.clone()))?;
        if shared.is_halted() {
            return Err(StepError::Halted);
        }

        let waited = queue.put(ticket, batch).await.map_err(|e| match e {
            QueueError::Halted => StepError::Halted,
            QueueError::Closed => StepError::UpstreamEnded(shared.name.clone()),
        })?;
        shared.counters.record_received(waited);
        Ok(waited)
    }
}

impl<I, O, P> Producing<O> for ProcessorStep<I, O, P>
where
    I: Send + 'static,
    O: Send + 'static,
    P: BatchProcessor<I, O>,
{
    fn set_downstream(&self, next: Arc<dyn Step<O>>) {
        if self.shared.downstream.set(next).is_err() {
            warn!(step = %self.shared.name, "Downstream already set, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct Double;

    #[async_trait]
    impl BatchProcessor<Vec<u64>, Vec<u64>> for Double {
        async fn process(&self, _: Ticket, batch: &mut Vec<u64>) -> Result<Vec<u64>, StepError> {
            Ok(batch.drain(..).map(|n| n * 2).collect())
        }
    }

    /// Terminal processor remembering the order tickets arrive in.
    #[derive(Clone, Default)]
    struct Collect {
        seen: Arc<Mutex<Vec<(Ticket, Vec<u64>)>>>,
    }

    #[async_trait]
    impl BatchProcessor<Vec<u64>, ()> for Collect {
        async fn process(&self, ticket: Ticket, batch: &mut Vec<u64>) -> Result<(), StepError> {
            self.seen
                .lock()
                .unwrap()
                .push((ticket, batch.drain(..).collect()));
            Ok(())
        }
    }

    struct FailAt(Ticket);

    #[async_trait]
    impl BatchProcessor<u64, ()> for FailAt {
        async fn process(&self, ticket: Ticket, _: &mut u64) -> Result<(), StepError> {
            if ticket == self.0 {
                return Err(StepError::processing("fail", "boom"));
            }
            Ok(())
        }
    }

    async fn wait_completed(step: &dyn StepControl) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !step.is_completed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("step did not complete");
    }

    #[tokio::test]
    async fn receive_before_start_is_rejected() {
        let step = ProcessorStep::new("collect", StepSettings::default(), Collect::default());
        let err = step.receive(0, vec![1]).await.unwrap_err();
        assert!(matches!(err, StepError::NotStarted(name) if name == "collect"));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let step = ProcessorStep::new("collect", StepSettings::default(), Collect::default());
        step.start(StepFlags::empty()).unwrap();
        assert!(matches!(
            step.start(StepFlags::empty()),
            Err(StepError::AlreadyStarted(_))
        ));
        step.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn forwards_and_propagates_end_of_upstream() {
        let collect = Collect::default();
        let sink = Arc::new(ProcessorStep::new(
            "collect",
            StepSettings::default(),
            collect.clone(),
        ));
        let double = ProcessorStep::new(
            "double",
            StepSettings::default().with_workers(4),
            Double,
        );
        double.set_downstream(sink.clone());

        sink.start(StepFlags::ORDER_SEND_DOWNSTREAM).unwrap();
        double.start(StepFlags::ORDER_SEND_DOWNSTREAM).unwrap();
        for ticket in 0..20 {
            double.receive(ticket, vec![ticket, ticket + 1]).await.unwrap();
        }
        double.end_of_upstream();

        wait_completed(sink.as_ref()).await;
        assert!(double.is_completed());

        let seen = collect.seen.lock().unwrap().clone();
        let tickets: Vec<Ticket> = seen.iter().map(|(t, _)| *t).collect();
        assert_eq!(tickets, (0..20).collect::<Vec<_>>());
        assert_eq!(seen[3].1, vec![6, 8]);

        let stats = double.stats();
        assert_eq!(stats.received, 20);
        assert_eq!(stats.done, 20);
        assert_eq!(stats.workers, 4);

        double.close().await;
        sink.close().await;
    }

    #[tokio::test]
    async fn processing_error_panics_step_and_halts_signal() {
        let signal = PanicSignal::new();
        let step = ProcessorStep::new("fail", StepSettings::default(), FailAt(2));
        step.attach(signal.clone());
        step.start(StepFlags::empty()).unwrap();

        let mut halted = false;
        for ticket in 0..100 {
            if step.receive(ticket, ticket).await.is_err() {
                halted = true;
                break;
            }
        }
        tokio::time::timeout(Duration::from_secs(5), signal.halted())
            .await
            .unwrap();

        assert!(halted || signal.is_halted());
        assert!(step.is_panicked());
        assert_eq!(signal.first(), Some("fail"));
        assert!(matches!(
            step.take_panic(),
            Some(StepError::Processing { .. })
        ));
        assert!(matches!(
            step.receive(1000, 0).await,
            Err(StepError::Halted)
        ));
        step.close().await;
    }

    #[tokio::test]
    async fn end_of_upstream_before_start_completes_on_start() {
        let step = ProcessorStep::new("collect", StepSettings::default(), Collect::default());
        step.end_of_upstream();
        step.start(StepFlags::empty()).unwrap();
        wait_completed(&step).await;
        step.close().await;
        step.close().await;
    }

    #[tokio::test]
    async fn recycles_consumed_input_buffers() {
        let pool = Arc::new(engine_core::pool::BatchPool::<Vec<u64>>::new(4));
        let step = ProcessorStep::new("collect", StepSettings::default(), Collect::default())
            .with_recycler(pool.clone());
        step.start(StepFlags::RECYCLE_BATCHES).unwrap();

        let mut batch = pool.acquire();
        batch.extend(0..64);
        step.receive(0, batch).await.unwrap();
        step.end_of_upstream();
        wait_completed(&step).await;

        assert_eq!(pool.available(), 1);
        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert!(reused.capacity() >= 64);
        step.close().await;
    }

    struct Count(Arc<AtomicU64>);

    #[async_trait]
    impl BatchProcessor<u64, ()> for Count {
        async fn process(&self, _: Ticket, _: &mut u64) -> Result<(), StepError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[tokio::test]
    async fn receive_after_end_of_upstream_is_rejected() {
        let count = Arc::new(AtomicU64::new(0));
        let step = ProcessorStep::new("count", StepSettings::default(), Count(count.clone()));
        step.start(StepFlags::empty()).unwrap();
        step.receive(0, 0).await.unwrap();
        step.end_of_upstream();

        assert!(matches!(
            step.receive(1, 1).await,
            Err(StepError::UpstreamEnded(_))
        ));
        wait_completed(&step).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);
        step.close().await;
    }

    /// Holds every batch it is given until aborted.
    struct Stall;

    #[async_trait]
    impl BatchProcessor<Arc<()>, ()> for Stall {
        async fn process(&self, _: Ticket, _: &mut Arc<()>) -> Result<(), StepError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_releases_batches_queued_behind_busy_workers() {
        let step = ProcessorStep::new(
            "stall",
            StepSettings::default().with_work_ahead(8),
            Stall,
        );
        step.start(StepFlags::empty()).unwrap();

        let marker = Arc::new(());
        for ticket in 0..5 {
            step.receive(ticket, marker.clone()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(step.stats().queued, 4);

        step.close().await;
        assert_eq!(step.stats().queued, 0);
        assert_eq!(Arc::strong_count(&marker), 1);
        assert!(!step.is_completed());
        assert!(!step.is_panicked());
    }
}
