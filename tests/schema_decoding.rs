use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use record_wrangler::directive::DirectiveConfig;
use record_wrangler::error::{DecodeError, RegistryError};
use record_wrangler::execution::{ExecutionOptions, PipelineContext, PipelineExecutor};
use record_wrangler::retry::RetryPolicy;
use record_wrangler::source::records_from_json_str;
use record_wrangler::steps::{DecoderFactory, DecoderKind, RecordDecoder, SchemaRegistry};
use record_wrangler::{PipelineError, Record, StepError, Value};

/// Fails transiently `transient_failures` times, then serves a schema (or fails permanently).
struct FlakyRegistry {
    calls: AtomicU32,
    transient_failures: u32,
    permanent: bool,
}

impl FlakyRegistry {
    fn new(transient_failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            transient_failures,
            permanent: false,
        }
    }

    fn permanent() -> Self {
        Self {
            permanent: true,
            ..Self::new(0)
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchemaRegistry for FlakyRegistry {
    fn fetch(&self, schema_id: &str, _version: Option<i64>) -> Result<Vec<u8>, RegistryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.permanent {
            return Err(RegistryError::Permanent {
                message: format!("schema '{schema_id}' not found"),
            });
        }
        if call <= self.transient_failures {
            return Err(RegistryError::Transient {
                message: "connection reset".to_string(),
            });
        }
        Ok(schema_id.as_bytes().to_vec())
    }
}

/// Decodes payloads as JSON documents.
struct JsonDecoder;

impl RecordDecoder for JsonDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Vec<Record>, DecodeError> {
        let text = std::str::from_utf8(payload).map_err(|e| DecodeError::new(e.to_string()))?;
        records_from_json_str(text).map_err(|e| DecodeError::new(e.to_string()))
    }
}

#[derive(Default)]
struct JsonDecoders {
    created: AtomicU32,
}

impl DecoderFactory for JsonDecoders {
    fn create(
        &self,
        kind: &DecoderKind,
        _schema: &[u8],
    ) -> Result<Arc<dyn RecordDecoder>, DecodeError> {
        let _ = self.created.fetch_add(1, Ordering::SeqCst);
        match kind {
            DecoderKind::Avro { .. } => Ok(Arc::new(JsonDecoder)),
            DecoderKind::Protobuf { record_name } => {
                Err(DecodeError::new(format!("no descriptor for '{record_name}'")))
            }
        }
    }
}

fn executor(
    script: &str,
    registry: Arc<FlakyRegistry>,
    decoders: Arc<JsonDecoders>,
) -> PipelineExecutor {
    let context = PipelineContext::new()
        .with_registry(registry)
        .with_decoders(decoders)
        .with_retry_policy(RetryPolicy::immediate(5));
    PipelineExecutor::from_script(
        script,
        &DirectiveConfig::default(),
        context,
        ExecutionOptions::default(),
    )
    .unwrap()
}

fn payloads() -> Vec<Record> {
    vec![
        Record::new().with("body", r#"{"id": 1}"#),
        Record::new().with("other", "no body here"),
        Record::new().with("body", r#"[{"id": 2}, {"id": 3}]"#.as_bytes().to_vec()),
    ]
}

#[test]
fn transient_failures_are_retried() {
    let registry = Arc::new(FlakyRegistry::new(3));
    let decoders = Arc::new(JsonDecoders::default());
    let mut exec = executor("parse-as-avro body events json", Arc::clone(&registry), decoders);

    let out = exec.execute(payloads()).unwrap();
    assert_eq!(registry.calls(), 4);
    let ids: Vec<&Value> = out.iter().filter_map(|r| r.get("id")).collect();
    assert_eq!(ids, vec![&Value::Int64(1), &Value::Int64(2), &Value::Int64(3)]);
}

#[test]
fn retries_stop_at_the_ceiling() {
    let registry = Arc::new(FlakyRegistry::new(100));
    let decoders = Arc::new(JsonDecoders::default());
    let mut exec = executor("parse-as-avro body events json", Arc::clone(&registry), decoders);

    let err = exec.execute(payloads()).unwrap_err();
    assert_eq!(registry.calls(), 5);
    assert!(matches!(
        err,
        PipelineError::Step {
            line: 1,
            source: StepError::SchemaResolution { attempts: 5, .. },
            ..
        }
    ));
}

#[test]
fn permanent_failures_are_not_retried() {
    let registry = Arc::new(FlakyRegistry::permanent());
    let decoders = Arc::new(JsonDecoders::default());
    let mut exec = executor("parse-as-avro body events json", Arc::clone(&registry), decoders);

    let err = exec.execute(payloads()).unwrap_err();
    assert_eq!(registry.calls(), 1);
    assert!(err.to_string().contains("not found"));
}

#[test]
fn decoder_is_resolved_once_per_run() {
    let registry = Arc::new(FlakyRegistry::new(0));
    let decoders = Arc::new(JsonDecoders::default());
    let script = "parse-as-avro body events json 3";
    let mut exec = executor(script, Arc::clone(&registry), Arc::clone(&decoders));

    // Two records carry a payload; the schema is fetched once for both.
    exec.execute(payloads()).unwrap();
    assert_eq!(registry.calls(), 1);
    assert_eq!(decoders.created.load(Ordering::SeqCst), 1);

    for _ in 0..2 {
        exec.execute(payloads()).unwrap();
    }
    assert_eq!(registry.calls(), 3);
    assert_eq!(decoders.created.load(Ordering::SeqCst), 3);
}

#[test]
fn factory_errors_carry_the_schema_version() {
    let registry = Arc::new(FlakyRegistry::new(0));
    let decoders = Arc::new(JsonDecoders::default());
    let mut exec = executor("parse-as-protobuf body events Event 7", registry, decoders);

    let err = exec.execute(payloads()).unwrap_err();
    match err {
        PipelineError::Step {
            source: StepError::Decode { version, .. },
            ..
        } => assert_eq!(version, "7"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn non_text_payload_is_a_type_mismatch() {
    let registry = Arc::new(FlakyRegistry::new(0));
    let decoders = Arc::new(JsonDecoders::default());
    let mut exec = executor("parse-as-avro body events json", registry, decoders);

    let err = exec
        .execute(vec![Record::new().with("body", 42i64)])
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Step {
            source: StepError::TypeMismatch { .. },
            ..
        }
    ));
}

#[test]
fn missing_collaborators_are_reported() {
    let mut exec = PipelineExecutor::from_script(
        "parse-as-avro body events json",
        &DirectiveConfig::default(),
        PipelineContext::new(),
        ExecutionOptions::default(),
    )
    .unwrap();
    let err = exec.execute(payloads()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Step {
            source: StepError::NotConfigured { what: "schema registry" },
            ..
        }
    ));
}
