//! `record-wrangler` runs directive scripts over batches of in-memory records and tracks, per
//! column, which directives produced each value.
//!
//! A script is a list of directives, one per line (`uppercase name`, `drop tmp`,
//! `merge first last full ' '`). Each directive is routed into a typed [`directive::Directive`],
//! wrapped in an executable [`steps::Step`], and run by a [`execution::PipelineExecutor`].
//! Every run also produces a [`lineage::LineageSnapshot`]: the history of each live column,
//! with versioned branches for the inputs of multi-column directives.
//!
//! ## Quick example
//!
//! ```rust
//! use record_wrangler::directive::DirectiveConfig;
//! use record_wrangler::execution::{ExecutionOptions, PipelineContext, PipelineExecutor};
//! use record_wrangler::types::{Record, Value};
//!
//! # fn main() -> Result<(), record_wrangler::PipelineError> {
//! let script = "
//!     filter-row-if-false count > 0
//!     uppercase name
//! ";
//! let mut pipeline = PipelineExecutor::from_script(
//!     script,
//!     &DirectiveConfig::default(),
//!     PipelineContext::new(),
//!     ExecutionOptions::default(),
//! )?;
//!
//! let run = pipeline.run(vec![
//!     Record::new().with("count", 1i64).with("name", "x"),
//!     Record::new().with("count", 0i64).with("name", "y"),
//! ])?;
//!
//! assert_eq!(run.records.len(), 1);
//! assert_eq!(run.records[0].get("name"), Some(&Value::from("X")));
//! assert_eq!(run.lineage.column("name").map(|c| c.history().len()), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: [`types::Record`] and [`types::Value`]
//! - [`directive`]: script parsing, directive configuration and routing
//! - [`expression`]: the condition/expression language used by filters and `set-column`
//! - [`steps`]: step execution and the schema-registry decoder seam
//! - [`execution`]: the pipeline executor, its context, observers and metrics
//! - [`lineage`]: the column lineage tracker and its serialisable snapshot
//! - [`retry`]: backoff policy for schema registry access
//! - [`source`]: CSV and JSON record sources
//! - [`error`]: error types for every layer

pub mod directive;
pub mod error;
pub mod execution;
pub mod expression;
pub mod lineage;
pub mod retry;
pub mod source;
pub mod steps;
pub mod types;

pub use error::{
    DirectiveError, LineageError, PipelineError, PipelineResult, SourceError, SourceResult,
    StepError,
};
pub use execution::{ExecutionOptions, PipelineContext, PipelineExecutor, PipelineRun};
pub use types::{Record, Value};
