//! Pipeline executor.
//!
//! A [`PipelineExecutor`] owns the configured [`Step`]s, the [`PipelineContext`] they share and
//! a rayon pool. A run is strictly sequential across steps: for each step the lineage effect
//! is applied first, then the step transforms the whole batch. Steps parallelise per-record
//! work on the executor's pool.
//!
//! Observability follows one pattern throughout: [`PipelineEvent`]s go to an optional
//! [`PipelineObserver`], counters land in [`PipelineMetrics`], and the final
//! [`LineageSnapshot`] goes to an optional [`LineageObserver`].

mod context;
mod observer;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::directive::{DirectiveConfig, ParsedDirective, parse_script};
use crate::error::{PipelineError, PipelineResult};
use crate::lineage::{ColumnLineage, LineageObserver, LineageSnapshot, RunConfig};
use crate::steps::Step;
use crate::types::Record;

pub use context::{DEFAULT_PARALLEL_THRESHOLD, ErrorRecord, PipelineContext};
pub use observer::{
    PipelineEvent, PipelineMetrics, PipelineMetricsSnapshot, PipelineObserver, TracingObserver,
};

/// Configuration for the [`PipelineExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads in the executor's pool.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Batch size from which steps process records in parallel.
    pub parallel_threshold: usize,
    /// Input columns registered with the lineage tracker at the start of a run.
    ///
    /// If `None`, the column names of the first input record are used.
    pub columns: Option<Vec<String>>,
    /// Metadata attached to the lineage of every run. `started_at` is refreshed per run.
    pub run: RunConfig,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            columns: None,
            run: RunConfig::default(),
        }
    }
}

/// Output of [`PipelineExecutor::run`].
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub records: Vec<Record>,
    /// Records routed out by `send-to-error`, in the order they were routed.
    pub errors: Vec<ErrorRecord>,
    pub lineage: LineageSnapshot,
}

/// Runs a configured pipeline over record batches.
pub struct PipelineExecutor {
    steps: Vec<Step>,
    context: PipelineContext,
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn PipelineObserver>>,
    lineage_observer: Option<Arc<dyn LineageObserver>>,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineExecutor {
    /// Build an executor over already routed steps.
    pub fn configure(
        steps: Vec<Step>,
        mut context: PipelineContext,
        opts: ExecutionOptions,
    ) -> PipelineResult<Self> {
        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        let pool = ThreadPoolBuilder::new().num_threads(n_threads).build()?;
        context.set_parallel_threshold(opts.parallel_threshold);

        tracing::debug!(steps = steps.len(), threads = n_threads, "pipeline configured");
        Ok(Self {
            steps,
            context,
            pool,
            opts,
            observer: None,
            lineage_observer: None,
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    /// Route `directives` in order and build an executor. The first directive that fails to
    /// route aborts configuration.
    pub fn from_directives(
        directives: &[ParsedDirective],
        config: &DirectiveConfig,
        context: PipelineContext,
        opts: ExecutionOptions,
    ) -> PipelineResult<Self> {
        let steps = directives
            .iter()
            .map(|parsed| Step::from_parsed(parsed, config))
            .collect::<Result<Vec<_>, _>>()?;
        Self::configure(steps, context, opts)
    }

    /// Parse a directive script and build an executor from it.
    pub fn from_script(
        script: &str,
        config: &DirectiveConfig,
        context: PipelineContext,
        opts: ExecutionOptions,
    ) -> PipelineResult<Self> {
        let directives = parse_script(script)?;
        Self::from_directives(&directives, config, context, opts)
    }

    /// Attach an observer for pipeline events.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach an observer that receives the lineage of every successful run.
    pub fn with_lineage_observer(mut self, observer: Arc<dyn LineageObserver>) -> Self {
        self.lineage_observer = Some(observer);
        self
    }

    /// Get a handle to real-time pipeline metrics.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut PipelineContext {
        &mut self.context
    }

    /// Run the pipeline and return only the final batch.
    pub fn execute(&mut self, records: Vec<Record>) -> PipelineResult<Vec<Record>> {
        self.run(records).map(|run| run.records)
    }

    /// Run the pipeline over `records`.
    ///
    /// The first failing step aborts the run; no partial output is returned and records the
    /// run routed to the error list are discarded. Every run starts from the seeded context
    /// variables and resolves schema decoders afresh.
    pub fn run(&mut self, records: Vec<Record>) -> PipelineResult<PipelineRun> {
        let start = Instant::now();
        self.context.begin_run();
        for step in &mut self.steps {
            step.begin_run();
        }
        self.metrics.begin_run(records.len());
        self.emit(PipelineEvent::RunStarted {
            steps: self.steps.len(),
            input_records: records.len(),
        });
        tracing::info!(
            steps = self.steps.len(),
            records = records.len(),
            "pipeline run started"
        );

        let run = RunConfig {
            started_at: Utc::now(),
            ..self.opts.run.clone()
        };
        let mut lineage = match &self.opts.columns {
            Some(columns) => ColumnLineage::new(run, columns),
            None => ColumnLineage::new(
                run,
                records
                    .first()
                    .map(|r| r.column_names().collect::<Vec<_>>())
                    .unwrap_or_default(),
            ),
        };

        let mut batch = records;
        for step in &self.steps {
            if let Err(source) = lineage.record(step) {
                self.step_failed(step, &source.to_string());
                self.context.take_error_records();
                return Err(PipelineError::Lineage {
                    line: step.line(),
                    directive: step.name().to_string(),
                    source,
                });
            }

            self.emit(PipelineEvent::StepStarted {
                line: step.line(),
                directive: step.name(),
                input_records: batch.len(),
            });
            tracing::debug!(
                line = step.line(),
                directive = step.name(),
                records = batch.len(),
                "executing step"
            );

            let step_start = Instant::now();
            let context = &mut self.context;
            batch = match self.pool.install(|| step.execute(batch, context)) {
                Ok(out) => out,
                Err(source) => {
                    self.step_failed(step, &source.to_string());
                    self.context.take_error_records();
                    return Err(PipelineError::Step {
                        line: step.line(),
                        directive: step.name().to_string(),
                        source,
                    });
                }
            };

            self.metrics.on_step_executed();
            self.emit(PipelineEvent::StepFinished {
                line: step.line(),
                directive: step.name(),
                output_records: batch.len(),
                elapsed: step_start.elapsed(),
            });

            if let Some(first) = batch.first() {
                for column in first.column_names() {
                    if lineage.register(column) {
                        tracing::debug!(line = step.line(), column, "lineage: column discovered");
                    }
                }
            }
        }

        let errors = self.context.take_error_records();
        self.metrics.end_run(batch.len(), errors.len());
        self.emit(PipelineEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });
        tracing::info!(
            records = batch.len(),
            errors = errors.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline run finished"
        );

        let lineage = lineage.snapshot();
        if let Some(observer) = &self.lineage_observer {
            observer.on_lineage(&lineage);
        }

        Ok(PipelineRun {
            records: batch,
            errors,
            lineage,
        })
    }

    fn step_failed(&self, step: &Step, message: &str) {
        self.metrics.on_step_failed();
        tracing::warn!(
            line = step.line(),
            directive = step.name(),
            message,
            "pipeline step failed"
        );
        self.emit(PipelineEvent::StepFailed {
            line: step.line(),
            directive: step.name(),
            message: message.to_string(),
        });
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("steps", &self.steps)
            .field("context", &self.context)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}
