//! Record sources: turn CSV and JSON input into the `Vec<Record>` batches a pipeline runs on.
//!
//! Sources do no type inference beyond what the format itself carries. CSV cells are text
//! (empty cells become [`crate::types::Value::Null`]); JSON scalars keep their JSON type.

pub mod csv;
pub mod json;

pub use self::csv::{records_from_csv_path, records_from_csv_reader};
pub use self::json::{records_from_json_path, records_from_json_str};
