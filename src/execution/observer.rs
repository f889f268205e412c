use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Events emitted by the [`super::PipelineExecutor`] during a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        steps: usize,
        input_records: usize,
    },
    StepStarted {
        line: usize,
        directive: &'static str,
        input_records: usize,
    },
    StepFinished {
        line: usize,
        directive: &'static str,
        output_records: usize,
        elapsed: Duration,
    },
    StepFailed {
        line: usize,
        directive: &'static str,
        message: String,
    },
    RunFinished {
        elapsed: Duration,
        metrics: PipelineMetricsSnapshot,
    },
}

/// Observer hook for pipeline events.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StepFailed {
                line,
                directive,
                message,
            } => tracing::warn!(line, directive, %message, "step failed"),
            PipelineEvent::RunFinished { metrics, .. } => {
                tracing::info!(%metrics, "pipeline run finished")
            }
            other => tracing::debug!(event = ?other, "pipeline event"),
        }
    }
}

/// Live counters for the most recent run of an executor.
///
/// The executor resets them at the start of every run; callers may snapshot at any time.
pub struct PipelineMetrics {
    run_id: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    records_in: AtomicU64,
    records_out: AtomicU64,
    steps_executed: AtomicU64,
    steps_failed: AtomicU64,
    error_records: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            records_in: AtomicU64::new(0),
            records_out: AtomicU64::new(0),
            steps_executed: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            error_records: AtomicU64::new(0),
        }
    }

    pub fn begin_run(&self, input_records: usize) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut started) = self.started_at.lock() {
            *started = Some(Instant::now());
        }

        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.records_in.store(input_records as u64, Ordering::SeqCst);
        self.records_out.store(0, Ordering::SeqCst);
        self.steps_executed.store(0, Ordering::SeqCst);
        self.steps_failed.store(0, Ordering::SeqCst);
        self.error_records.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, output_records: usize, error_records: usize) {
        let elapsed = self
            .started_at
            .lock()
            .ok()
            .and_then(|started| started.map(|s| s.elapsed()))
            .unwrap_or_default();
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
        self.records_out.store(output_records as u64, Ordering::SeqCst);
        self.error_records.store(error_records as u64, Ordering::SeqCst);
    }

    pub fn on_step_executed(&self) {
        let _ = self.steps_executed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_step_failed(&self) {
        let _ = self.steps_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns));

        PipelineMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            records_in: self.records_in.load(Ordering::SeqCst),
            records_out: self.records_out.load(Ordering::SeqCst),
            steps_executed: self.steps_executed.load(Ordering::SeqCst),
            steps_failed: self.steps_failed.load(Ordering::SeqCst),
            error_records: self.error_records.load(Ordering::SeqCst),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of [`PipelineMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub run_id: u64,
    /// `None` until the run has finished.
    pub elapsed: Option<Duration>,
    pub records_in: u64,
    pub records_out: u64,
    pub steps_executed: u64,
    pub steps_failed: u64,
    pub error_records: u64,
}

impl fmt::Display for PipelineMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, records={}->{}, steps={} (failed {}), error_records={}, elapsed={:?}",
            self.run_id,
            self.records_in,
            self.records_out,
            self.steps_executed,
            self.steps_failed,
            self.error_records,
            self.elapsed
        )
    }
}
