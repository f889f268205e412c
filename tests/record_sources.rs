use record_wrangler::source::{
    records_from_csv_path, records_from_csv_reader, records_from_json_path, records_from_json_str,
};
use record_wrangler::{SourceError, Value};

#[test]
fn csv_path_reads_text_columns() {
    let records = records_from_csv_path("tests/fixtures/people.csv").unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0].column_names().collect::<Vec<_>>(),
        vec!["id", "name", "email", "score", "active"]
    );
    assert_eq!(records[0].get("score"), Some(&Value::from("98.5")));
    assert_eq!(records[2].get("email"), Some(&Value::Null));
}

#[test]
fn csv_reader_honours_custom_delimiter() {
    let input = "a;b\n1;2\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b';')
        .from_reader(input.as_bytes());
    let records = records_from_csv_reader(&mut rdr).unwrap();
    assert_eq!(records[0].get("b"), Some(&Value::from("2")));
}

#[test]
fn json_path_keeps_json_types() {
    let records = records_from_json_path("tests/fixtures/people.json").unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get("id"), Some(&Value::Int64(1)));
    assert_eq!(records[0].get("score"), Some(&Value::Float64(98.5)));
    assert_eq!(records[1].get("active"), Some(&Value::Bool(false)));
    assert_eq!(records[2].get("email"), Some(&Value::Null));
}

#[test]
fn json_nested_objects_become_records() {
    let records = records_from_json_str(r#"{"id": 1, "user": {"name": "Ada"}}"#).unwrap();
    let Some(Value::Record(user)) = records[0].get("user") else {
        panic!("expected nested record");
    };
    assert_eq!(user.get("name"), Some(&Value::from("Ada")));
}

#[test]
fn missing_file_is_io_error() {
    let err = records_from_json_path("tests/fixtures/does-not-exist.json").unwrap_err();
    assert!(matches!(err, SourceError::Io(_)));
}
