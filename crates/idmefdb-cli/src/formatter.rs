//! Output formatters for query results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use idmefdb_proto::Value;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Rows of decoded values under named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRows {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<Value>>>,
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format selected values.
    fn format_values(&self, values: &ValueRows) -> String;

    /// Format a list of message identifiers.
    fn format_idents(&self, idents: &[u64]) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_values(&self, values: &ValueRows) -> String {
        if values.rows.is_empty() {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(values.headers.iter().map(Cell::new));
        for row in &values.rows {
            table.add_row(row.iter().map(|v| Cell::new(format_value(v.as_ref()))));
        }

        format!("{}\n{} row(s)", table, values.rows.len())
    }

    fn format_idents(&self, idents: &[u64]) -> String {
        if idents.is_empty() {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["ident"]);
        for ident in idents {
            table.add_row(vec![ident.to_string()]);
        }

        format!("{}\n{} row(s)", table, idents.len())
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_values(&self, values: &ValueRows) -> String {
        let rows: Vec<serde_json::Value> = values
            .rows
            .iter()
            .map(|row| {
                let obj = values
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), value_to_json(value.as_ref())))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();

        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_idents(&self, idents: &[u64]) -> String {
        serde_json::to_string_pretty(idents).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({ "error": error }).to_string()
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_values(&self, values: &ValueRows) -> String {
        let mut output = values
            .headers
            .iter()
            .map(|h| csv_cell(h))
            .collect::<Vec<_>>()
            .join(",");
        output.push('\n');

        for row in &values.rows {
            let cells: Vec<String> = row.iter().map(|v| format_value_csv(v.as_ref())).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }

        output
    }

    fn format_idents(&self, idents: &[u64]) -> String {
        let mut output = String::from("ident\n");
        for ident in idents {
            output.push_str(&format!("{}\n", ident));
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("error\n\"{}\"", escape_csv(error))
    }
}

/// Format a value for display, `NULL` when absent.
fn format_value(value: Option<&Value>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(Value::Data(data)) => match std::str::from_utf8(data) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<{} bytes>", data.len()),
        },
        Some(other) => other.to_string(),
    }
}

/// Format a value for CSV output. Text is quoted, NULL is empty.
fn format_value_csv(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s) | Value::Enum(s)) => format!("\"{}\"", escape_csv(s)),
        Some(Value::Time(t)) => t.to_string(),
        Some(Value::Data(data)) => hex::encode(data),
        Some(other) => other.to_string(),
    }
}

/// Quote a header cell only when it needs it.
fn csv_cell(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", escape_csv(text))
    } else {
        text.to_string()
    }
}

/// Convert a value to JSON.
fn value_to_json(value: Option<&Value>) -> serde_json::Value {
    let Some(value) = value else {
        return serde_json::Value::Null;
    };

    match value {
        Value::Int8(v) => (*v).into(),
        Value::UInt8(v) => (*v).into(),
        Value::Int16(v) => (*v).into(),
        Value::UInt16(v) => (*v).into(),
        Value::Int32(v) => (*v).into(),
        Value::UInt32(v) => (*v).into(),
        Value::Int64(v) => (*v).into(),
        Value::UInt64(v) => (*v).into(),
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Double(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) | Value::Enum(s) => serde_json::Value::String(s.clone()),
        Value::Time(t) => serde_json::Value::String(t.to_string()),
        Value::Data(data) => serde_json::Value::String(hex::encode(data)),
    }
}

/// Escape a string for CSV.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use idmefdb_proto::Time;
    use pretty_assertions::assert_eq;

    fn sample() -> ValueRows {
        ValueRows {
            headers: vec!["alert.messageid".into(), "count(alert.create_time)".into()],
            rows: vec![
                vec![Some(Value::String("m1".into())), Some(Value::UInt64(2))],
                vec![None, Some(Value::UInt64(0))],
            ],
        }
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello, world"), "hello, world");
        assert_eq!(escape_csv("say \"hi\""), "say \"\"hi\"\"");
    }

    #[test]
    fn test_csv_values() {
        assert_eq!(
            CsvFormatter.format_values(&sample()),
            "alert.messageid,count(alert.create_time)\n\"m1\",2\n,0\n"
        );
    }

    #[test]
    fn test_csv_header_quoting() {
        assert_eq!(csv_cell("a,b"), "\"a,b\"");
        assert_eq!(csv_cell("alert.messageid"), "alert.messageid");
    }

    #[test]
    fn test_json_values() {
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_values(&sample())).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "alert.messageid": "m1", "count(alert.create_time)": 2 },
                { "alert.messageid": null, "count(alert.create_time)": 0 },
            ])
        );
    }

    #[test]
    fn test_json_special_values() {
        assert_eq!(
            value_to_json(Some(&Value::Data(vec![0xde, 0xad]))),
            serde_json::json!("dead")
        );
        assert_eq!(
            value_to_json(Some(&Value::Double(f64::NAN))),
            serde_json::Value::Null
        );
        assert_eq!(
            value_to_json(Some(&Value::Time(Time::from_secs(0)))),
            serde_json::json!("1970-01-01T00:00:00.000000+00:00")
        );
    }

    #[test]
    fn test_table_output() {
        let output = TableFormatter.format_values(&sample());
        assert!(output.contains("alert.messageid"));
        assert!(output.contains("NULL"));
        assert!(output.ends_with("2 row(s)"));

        assert_eq!(TableFormatter.format_values(&ValueRows::default()), "No results");
        assert!(TableFormatter.format_idents(&[4, 5]).ends_with("2 row(s)"));
    }

    #[test]
    fn test_idents() {
        assert_eq!(CsvFormatter.format_idents(&[1, 2]), "ident\n1\n2\n");
        assert_eq!(JsonFormatter.format_idents(&[]), "[]");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(None), "NULL");
        assert_eq!(format_value(Some(&Value::Data(b"hello".to_vec()))), "hello");
        assert_eq!(format_value(Some(&Value::Data(vec![0xff, 0xfe]))), "<2 bytes>");
    }
}
