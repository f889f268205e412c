//! Schema-backed decoding (`parse-as-avro`, `parse-as-protobuf`).
//!
//! The wire formats themselves are not implemented here. A step resolves a schema through a
//! [`SchemaRegistry`] and asks a [`DecoderFactory`] for a [`RecordDecoder`]; both are supplied
//! by the caller through the [`PipelineContext`].

use std::sync::{Arc, OnceLock};

use crate::directive::AvroEncoding;
use crate::error::{DecodeError, RegistryError, StepError, StepResult};
use crate::execution::PipelineContext;
use crate::retry::with_retry;
use crate::types::{Record, Value};

/// Source of schema documents, typically a remote registry service.
pub trait SchemaRegistry: Send + Sync {
    /// Fetch the schema `schema_id`, at `version` or the latest when `None`.
    fn fetch(&self, schema_id: &str, version: Option<i64>) -> Result<Vec<u8>, RegistryError>;
}

/// Decodes one payload into zero or more records.
pub trait RecordDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Vec<Record>, DecodeError>;
}

/// What kind of decoder a step needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderKind {
    Avro { encoding: AvroEncoding },
    Protobuf { record_name: String },
}

/// Builds decoders from fetched schema documents.
pub trait DecoderFactory: Send + Sync {
    fn create(
        &self,
        kind: &DecoderKind,
        schema: &[u8],
    ) -> Result<Arc<dyn RecordDecoder>, DecodeError>;
}

/// Parameters of a schema-backed step.
pub(crate) struct DecodeTarget<'a> {
    pub column: &'a str,
    pub schema_id: &'a str,
    pub version: Option<i64>,
    pub kind: DecoderKind,
}

impl DecodeTarget<'_> {
    fn version_label(&self) -> String {
        self.version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "latest".to_string())
    }
}

/// Resolve the decoder once, retrying transient registry failures, and cache it in `slot`.
fn resolve_decoder(
    slot: &OnceLock<Arc<dyn RecordDecoder>>,
    target: &DecodeTarget<'_>,
    ctx: &PipelineContext,
) -> StepResult<Arc<dyn RecordDecoder>> {
    if let Some(decoder) = slot.get() {
        return Ok(Arc::clone(decoder));
    }

    let registry = ctx
        .registry()
        .ok_or(StepError::NotConfigured { what: "schema registry" })?;
    let factory = ctx
        .decoders()
        .ok_or(StepError::NotConfigured { what: "decoder factory" })?;

    let schema = with_retry(ctx.retry_policy(), RegistryError::is_transient, || {
        registry.fetch(target.schema_id, target.version)
    })
    .map_err(|failure| StepError::SchemaResolution {
        schema_id: target.schema_id.to_string(),
        attempts: failure.attempts,
        source: failure.error,
    })?;

    let decoder = factory
        .create(&target.kind, &schema)
        .map_err(|source| StepError::Decode {
            version: target.version_label(),
            source,
        })?;
    tracing::debug!(
        schema_id = target.schema_id,
        version = %target.version_label(),
        "decoder resolved"
    );

    Ok(Arc::clone(slot.get_or_init(|| decoder)))
}

/// Replace every record carrying `column` by the records decoded from its payload. Records
/// without the column produce no output.
pub(crate) fn decode_records(
    records: Vec<Record>,
    ctx: &PipelineContext,
    slot: &OnceLock<Arc<dyn RecordDecoder>>,
    target: &DecodeTarget<'_>,
) -> StepResult<Vec<Record>> {
    let decoder = resolve_decoder(slot, target, ctx)?;

    super::flat_map_records(records, ctx.parallel_threshold(), |record| {
        let payload = match record.get(target.column) {
            None => return Ok(Vec::new()),
            Some(Value::Bytes(bytes)) => bytes.as_slice(),
            Some(Value::Utf8(text)) => text.as_bytes(),
            Some(other) => {
                return Err(StepError::TypeMismatch {
                    column: target.column.to_string(),
                    expected: "string or bytes",
                    found: other.type_name(),
                });
            }
        };
        decoder.decode(payload).map_err(|source| StepError::Decode {
            version: target.version_label(),
            source,
        })
    })
}
