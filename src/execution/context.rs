use std::collections::HashMap;
use std::sync::Arc;

use crate::retry::RetryPolicy;
use crate::steps::{DecoderFactory, SchemaRegistry};
use crate::types::{Record, Value};

/// Default batch size from which steps process records on the thread pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1_024;

/// A record routed out of the pipeline by `send-to-error`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub record: Record,
    pub line: usize,
    pub message: String,
}

/// State shared by the steps of one pipeline.
///
/// Steps only mutate it between batches (variables, error records); per-record work reads it.
/// Variables and error records are per run: every run starts from the variables seeded with
/// [`PipelineContext::with_variable`] and no error records.
pub struct PipelineContext {
    seed: HashMap<String, Value>,
    variables: HashMap<String, Value>,
    error_records: Vec<ErrorRecord>,
    registry: Option<Arc<dyn SchemaRegistry>>,
    decoders: Option<Arc<dyn DecoderFactory>>,
    retry: RetryPolicy,
    parallel_threshold: usize,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self {
            seed: HashMap::new(),
            variables: HashMap::new(),
            error_records: Vec::new(),
            registry: None,
            decoders: None,
            retry: RetryPolicy::default(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_decoders(mut self, decoders: Arc<dyn DecoderFactory>) -> Self {
        self.decoders = Some(decoders);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Seed a variable that every run starts with.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.seed.insert(name.clone(), value.clone());
        self.variables.insert(name, value);
        self
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Set a variable for the current run only.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn error_records(&self) -> &[ErrorRecord] {
        &self.error_records
    }

    pub(crate) fn push_error_record(&mut self, error: ErrorRecord) {
        self.error_records.push(error);
    }

    pub fn take_error_records(&mut self) -> Vec<ErrorRecord> {
        std::mem::take(&mut self.error_records)
    }

    /// Drop the state of the previous run.
    pub(crate) fn begin_run(&mut self) {
        self.variables.clone_from(&self.seed);
        self.error_records.clear();
    }

    pub fn registry(&self) -> Option<&Arc<dyn SchemaRegistry>> {
        self.registry.as_ref()
    }

    pub fn decoders(&self) -> Option<&Arc<dyn DecoderFactory>> {
        self.decoders.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    pub(crate) fn set_parallel_threshold(&mut self, threshold: usize) {
        self.parallel_threshold = threshold.max(1);
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("variables", &self.variables)
            .field("error_records", &self.error_records.len())
            .field("registry", &self.registry.is_some())
            .field("decoders", &self.decoders.is_some())
            .field("retry", &self.retry)
            .field("parallel_threshold", &self.parallel_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorRecord, PipelineContext};
    use crate::types::{Record, Value};

    #[test]
    fn begin_run_restores_seeded_variables() {
        let mut ctx = PipelineContext::new().with_variable("limit", 3i64);
        ctx.set_variable("limit", Value::Int64(7));
        ctx.set_variable("seen", Value::Int64(2));
        ctx.push_error_record(ErrorRecord {
            record: Record::new(),
            line: 1,
            message: "routed".to_string(),
        });

        ctx.begin_run();
        assert_eq!(ctx.variable("limit"), Some(&Value::Int64(3)));
        assert_eq!(ctx.variable("seen"), None);
        assert!(ctx.error_records().is_empty());
    }
}
