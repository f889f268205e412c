use record_wrangler::directive::{DirectiveConfig, ParsedDirective};
use record_wrangler::execution::{ExecutionOptions, PipelineContext, PipelineExecutor};
use record_wrangler::source::records_from_csv_path;
use record_wrangler::{PipelineError, Record, StepError, Value};

fn opts() -> ExecutionOptions {
    ExecutionOptions {
        num_threads: Some(2),
        ..ExecutionOptions::default()
    }
}

fn pipeline(script: &str) -> PipelineExecutor {
    PipelineExecutor::from_script(
        script,
        &DirectiveConfig::default(),
        PipelineContext::new(),
        opts(),
    )
    .unwrap()
}

fn counts() -> Vec<Record> {
    vec![
        Record::new().with("count", 1i64).with("name", "x"),
        Record::new().with("count", 0i64).with("name", "y"),
    ]
}

#[test]
fn filter_then_uppercase() {
    let out = pipeline("filter-row-if-false count > 0\nuppercase name")
        .execute(counts())
        .unwrap();
    assert_eq!(out, vec![Record::new().with("count", 1i64).with("name", "X")]);
}

#[test]
fn fail_aborts_only_when_condition_holds() {
    let err = pipeline("fail count > 0").execute(counts()).unwrap_err();
    match err {
        PipelineError::Step {
            line,
            directive,
            source: StepError::ConditionTriggered { condition },
        } => {
            assert_eq!(line, 1);
            assert_eq!(directive, "fail");
            assert_eq!(condition, "count > 0");
        }
        other => panic!("unexpected error: {other}"),
    }

    let out = pipeline("fail count > 10").execute(counts()).unwrap();
    assert_eq!(out, counts());
}

#[test]
fn generate_uuid_appends_a_column() {
    let records = vec![
        Record::new().with("value", "abc"),
        Record::new().with("value", "xyz"),
        Record::new().with("value", "Should be fine"),
    ];
    let out = pipeline("generate-uuid uuid").execute(records).unwrap();
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].len(), 2);
    assert_eq!(out[1].column_at(1), Some("uuid"));
    assert_eq!(out[2].get("value"), Some(&Value::from("Should be fine")));
}

#[test]
fn send_to_error_collects_routed_records() {
    let run = pipeline("send-to-error count == 0\nlowercase name")
        .run(counts())
        .unwrap();
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].line, 1);
    assert_eq!(run.errors[0].record.get("name"), Some(&Value::from("y")));
}

#[test]
fn step_output_feeds_the_next_step() {
    let script = r#"
        # split the full name and rebuild it
        parse-as-csv body ,
        rename body_1 first
        rename body_2 last
        drop body
        merge last first display ', '
        set-column shout concat(upper(first), '!')
    "#;
    let out = pipeline(script)
        .execute(vec![Record::new().with("body", "Ada,Lovelace")])
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("display"), Some(&Value::from("Lovelace, Ada")));
    assert_eq!(out[0].get("shout"), Some(&Value::from("ADA!")));
    assert_eq!(out[0].get("body"), None);
}

#[test]
fn csv_fixture_through_a_realistic_script() {
    let records = records_from_csv_path("tests/fixtures/people.csv").unwrap();
    let script = "
        set-type score double
        filter-row-if-true score < 80
        titlecase name
        fill-null-or-empty email unknown
        split-email email
        hash email SHA-256
    ";
    let run = pipeline(script).run(records).unwrap();
    assert_eq!(run.records.len(), 2);
    assert_eq!(run.records[1].get("name"), Some(&Value::from("Grace")));
    assert_eq!(run.records[1].get("email_domain"), Some(&Value::from("navy.mil")));
    assert!(matches!(run.records[0].get("email"), Some(Value::Utf8(h)) if h.len() == 64));

    let email = run.lineage.column("email").unwrap();
    assert_eq!(email.history().len(), 2);
    assert!(run.lineage.column("email_account").is_some());
}

#[test]
fn variables_are_shared_across_steps() {
    let script = "
        increment-variable seen 1 count >= 0
        set-column total seen
    ";
    let mut exec = pipeline(script);
    let out = exec.execute(counts()).unwrap();
    assert_eq!(out[0].get("total"), Some(&Value::Int64(2)));
    assert_eq!(exec.context().variable("seen"), Some(&Value::Int64(2)));
}

#[test]
fn unsupported_directive_is_rejected_at_configure_time() {
    let directives = vec![
        ParsedDirective::new(1, "uppercase", ["name"]),
        ParsedDirective::new(2, "no-such-directive", ["name"]),
    ];
    let err = PipelineExecutor::from_directives(
        &directives,
        &DirectiveConfig::default(),
        PipelineContext::new(),
        opts(),
    )
    .unwrap_err();
    assert_eq!(err.line(), Some(2));
    assert!(err.to_string().contains("no-such-directive"));
}

#[test]
fn empty_batch_still_tracks_lineage() {
    let run = pipeline("uppercase name\ndrop other").run(Vec::new());
    // With no input and no configured columns the tracker starts empty.
    assert!(matches!(run, Err(PipelineError::Lineage { line: 2, .. })));

    let mut exec = PipelineExecutor::from_script(
        "uppercase name\ndrop other",
        &DirectiveConfig::default(),
        PipelineContext::new(),
        ExecutionOptions {
            columns: Some(vec!["name".to_string(), "other".to_string()]),
            ..opts()
        },
    )
    .unwrap();
    let run = exec.run(Vec::new()).unwrap();
    assert!(run.records.is_empty());
    assert_eq!(run.lineage.columns.keys().collect::<Vec<_>>(), vec!["name"]);
}

#[test]
fn each_run_starts_from_a_clean_context() {
    let script = "
        send-to-error n == 0
        increment-variable hits 1 true
        fail n > 5
    ";
    let context = PipelineContext::new().with_variable("base", 10i64);
    let mut exec =
        PipelineExecutor::from_script(script, &DirectiveConfig::default(), context, opts())
            .unwrap();

    let failed = vec![
        Record::new().with("n", 0i64),
        Record::new().with("n", 6i64),
    ];
    let err = exec.run(failed).unwrap_err();
    assert!(matches!(err, PipelineError::Step { line: 4, .. }));
    assert!(exec.context().error_records().is_empty());

    let run = exec.run(vec![Record::new().with("n", 1i64)]).unwrap();
    assert!(run.errors.is_empty());
    assert_eq!(run.records.len(), 1);
    assert_eq!(exec.context().variable("hits"), Some(&Value::Int64(1)));
    assert_eq!(exec.context().variable("base"), Some(&Value::Int64(10)));
}
