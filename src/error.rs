use thiserror::Error;

/// Convenience result type for directive routing.
pub type DirectiveResult<T> = Result<T, DirectiveError>;

/// Convenience result type for step execution.
pub type StepResult<T> = Result<T, StepError>;

/// Convenience result type for pipeline configuration and execution.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Convenience result type for record sources.
pub type SourceResult<T> = Result<T, SourceError>;

/// Error returned while turning a parsed directive into a typed one.
#[derive(Debug, Error)]
pub enum DirectiveError {
    /// No directive with this name exists in the catalogue.
    #[error("line {line}: unsupported directive '{name}'")]
    Unsupported { line: usize, name: String },

    /// The directive exists but the directive configuration excludes it.
    #[error("line {line}: directive '{name}' is excluded by configuration")]
    Excluded { line: usize, name: String },

    /// A required positional argument is absent.
    #[error("line {line}: '{directive}' is missing required argument '{argument}'")]
    MissingArgument {
        line: usize,
        directive: &'static str,
        argument: &'static str,
    },

    /// A positional argument could not be routed into its typed form.
    #[error("line {line}: '{directive}' has invalid {argument} '{raw}': {message}")]
    InvalidArgument {
        line: usize,
        directive: &'static str,
        argument: &'static str,
        raw: String,
        message: String,
    },

    /// The script text could not be split into directives.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// Error raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("evaluation error: {message}")]
    Eval { message: String },
}

/// Failure reported by a schema registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// I/O or transport failure; worth retrying.
    #[error("transient registry failure: {message}")]
    Transient { message: String },

    /// Missing schema, malformed response, authorisation failure.
    #[error("permanent registry failure: {message}")]
    Permanent { message: String },
}

impl RegistryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Transient { .. })
    }
}

/// Failure reported by a schema-backed decoder.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised by a single step while processing its batch.
#[derive(Debug, Error)]
pub enum StepError {
    /// The column holds a value kind the step cannot process.
    #[error("column '{column}' should be of type {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column '{column}' does not exist")]
    MissingColumn { column: String },

    #[error("column '{column}' already exists")]
    ColumnExists { column: String },

    /// The value has the right kind but cannot be interpreted.
    #[error("invalid value in column '{column}': {message}")]
    InvalidValue { column: String, message: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// `fail <condition>` evaluated to true.
    #[error("condition '{condition}' evaluated to true")]
    ConditionTriggered { condition: String },

    /// The decoder's schema could not be resolved.
    #[error("unable to retrieve schema '{schema_id}' after {attempts} attempt(s): {source}")]
    SchemaResolution {
        schema_id: String,
        attempts: u32,
        #[source]
        source: RegistryError,
    },

    /// A collaborator the step needs was not supplied in the pipeline context.
    #[error("{what} is not configured in the pipeline context")]
    NotConfigured { what: &'static str },

    #[error("decode failed (schema version '{version}'): {source}")]
    Decode {
        version: String,
        #[source]
        source: DecodeError,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error raised by the lineage tracker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineageError {
    /// A directive referenced a column that is not live in the tracker.
    #[error("column '{column}' is not a live column")]
    UnknownColumn { column: String },

    /// A rename or relabel would land on a name that is already live.
    #[error("column '{column}' is already a live column")]
    ColumnExists { column: String },
}

/// Error surfaced to the pipeline caller.
///
/// Every variant raised during a run carries the originating directive line and name.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Directive(#[from] DirectiveError),

    #[error("line {line} ({directive}): {source}")]
    Step {
        line: usize,
        directive: String,
        #[source]
        source: StepError,
    },

    #[error("line {line} ({directive}): lineage: {source}")]
    Lineage {
        line: usize,
        directive: String,
        #[source]
        source: LineageError,
    },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    /// Line of the directive that caused the failure, if the error is tied to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            PipelineError::Step { line, .. } | PipelineError::Lineage { line, .. } => Some(*line),
            PipelineError::Directive(
                DirectiveError::Unsupported { line, .. }
                | DirectiveError::Excluded { line, .. }
                | DirectiveError::MissingArgument { line, .. }
                | DirectiveError::InvalidArgument { line, .. }
                | DirectiveError::Syntax { line, .. },
            ) => Some(*line),
            PipelineError::ThreadPool(_) => None,
        }
    }
}

/// Error type returned by record sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input parsed but does not have the shape of a record batch.
    #[error("unexpected input shape: {message}")]
    Shape { message: String },
}
