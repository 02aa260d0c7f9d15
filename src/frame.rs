//! Tabular row frame.
//!
//! The thin in-memory table every connector produces before loading:
//! ordered columns and JSON-valued cells. Normalization string-casts
//! everything except declared timestamp columns, which are parsed and
//! re-emitted in RFC 3339 form (unparseable values coerce to null).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

/// An ordered-column table of JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Create an empty frame with the given column order.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a frame from keyed records.
    ///
    /// Column order is first-seen order across the records; missing keys
    /// become nulls.
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|column| record.remove(column).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. The row must match the frame's width.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Add a column holding the same value in every row.
    pub fn push_constant_column(&mut self, name: impl Into<String>, value: Value) {
        self.columns.push(name.into());
        for row in &mut self.rows {
            row.push(value.clone());
        }
    }

    /// Append all rows of `other`, matching columns by name.
    ///
    /// Columns new to `self` are added (nulls for existing rows).
    pub fn concat(&mut self, other: Frame) {
        for column in &other.columns {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
            }
        }

        for row in other.rows {
            let mut merged = vec![Value::Null; self.columns.len()];
            for (i, column) in other.columns.iter().enumerate() {
                let target = self
                    .columns
                    .iter()
                    .position(|c| c == column)
                    .expect("column was just ensured");
                merged[target] = row[i].clone();
            }
            self.rows.push(merged);
        }
    }

    /// Normalize cell values for loading.
    ///
    /// Cells in `timestamp_columns` are parsed and re-emitted as RFC 3339
    /// strings (null on parse failure); every other non-null cell is cast
    /// to its string form.
    pub fn normalize(mut self, timestamp_columns: &[&str]) -> Self {
        let timestamp_mask: Vec<bool> = self
            .columns
            .iter()
            .map(|c| timestamp_columns.contains(&c.as_str()))
            .collect();

        for row in &mut self.rows {
            for (i, cell) in row.iter_mut().enumerate() {
                *cell = if timestamp_mask[i] {
                    coerce_timestamp(cell)
                } else {
                    stringify(cell)
                };
            }
        }
        self
    }

    /// Render rows as JSON objects keyed by column name.
    pub fn to_json_rows(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Cast a JSON value to its string form; nulls stay null.
fn stringify(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Parse a timestamp-ish cell into RFC 3339, or null when unparseable.
fn coerce_timestamp(value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => return Value::Null,
        other => other.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Value::String(dt.with_timezone(&Utc).to_rfc3339());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Value::String(dt.and_utc().to_rfc3339());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f") {
        return Value::String(dt.and_utc().to_rfc3339());
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Value::String(
            date.and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .and_utc()
                .to_rfc3339(),
        );
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%d-%m-%Y") {
        return Value::String(
            date.and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .and_utc()
                .to_rfc3339(),
        );
    }

    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn from_records_preserves_first_seen_order() {
        let frame = Frame::from_records(vec![
            record(&[("b", json!(1)), ("a", json!(2))]),
            record(&[("c", json!(3)), ("a", json!(4))]),
        ]);
        assert_eq!(frame.columns(), &["b", "a", "c"]);
        assert_eq!(frame.rows()[0], vec![json!(1), json!(2), Value::Null]);
        assert_eq!(frame.rows()[1], vec![Value::Null, json!(4), json!(3)]);
    }

    #[test]
    fn normalize_string_casts_non_timestamp_columns() {
        let frame = Frame::from_records(vec![record(&[
            ("spend", json!(12.5)),
            ("clicks", json!(3)),
            ("active", json!(true)),
        ])])
        .normalize(&[]);
        assert_eq!(
            frame.rows()[0],
            vec![json!("12.5"), json!("3"), json!("true")]
        );
    }

    #[test]
    fn normalize_parses_declared_timestamp_columns() {
        let frame = Frame::from_records(vec![record(&[
            ("created_time", json!("2024-01-15")),
            ("name", json!("ad-1")),
        ])])
        .normalize(&["created_time"]);
        assert_eq!(
            frame.rows()[0][0],
            json!("2024-01-15T00:00:00+00:00")
        );
        assert_eq!(frame.rows()[0][1], json!("ad-1"));
    }

    #[test]
    fn normalize_coerces_bad_timestamps_to_null() {
        let frame = Frame::from_records(vec![record(&[(
            "created_time",
            json!("not a date"),
        )])])
        .normalize(&["created_time"]);
        assert_eq!(frame.rows()[0][0], Value::Null);
    }

    #[test]
    fn constant_column_fills_every_row() {
        let mut frame = Frame::from_records(vec![
            record(&[("x", json!(1))]),
            record(&[("x", json!(2))]),
        ]);
        frame.push_constant_column("account_id", json!("42"));
        assert_eq!(frame.columns(), &["x", "account_id"]);
        assert!(frame.rows().iter().all(|r| r[1] == json!("42")));
    }

    #[test]
    fn concat_aligns_columns_by_name() {
        let mut left = Frame::from_records(vec![record(&[("a", json!(1))])]);
        let right = Frame::from_records(vec![record(&[("b", json!(2)), ("a", json!(3))])]);
        left.concat(right);
        assert_eq!(left.columns(), &["a", "b"]);
        assert_eq!(left.rows()[0], vec![json!(1), Value::Null]);
        assert_eq!(left.rows()[1], vec![json!(3), json!(2)]);
    }

    #[test]
    fn json_rows_round_trip() {
        let frame = Frame::from_records(vec![record(&[("k", json!("v"))])]);
        let rows = frame.to_json_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["k"], json!("v"));
    }
}
