//! Tabular payload shared by every data source
//!
//! A [`Table`] is an ordered list of records. Records need not share a column
//! set: [`Table::columns`] is the union of keys in first-appearance order and a
//! missing cell reads as null.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// One row: column name to scalar value
pub type Record = Map<String, Value>;

/// Ordered sequence of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Record>,
}

impl Table {
    /// Empty table ("no data")
    pub fn new() -> Self {
        Self::default()
    }

    /// Table over the given rows, order preserved
    pub fn from_records(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    /// Coerce decoded JSON into rows
    ///
    /// An array yields one row per element (non-object elements land under
    /// column `"0"`), an object yields a single row, anything else yields
    /// `None`.
    pub fn from_json_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::from_records(
                items.into_iter().map(into_record).collect(),
            )),
            Value::Object(record) => Some(Self::from_records(vec![record])),
            _ => None,
        }
    }

    /// Rows as a JSON array of objects
    pub fn to_json_value(&self) -> Value {
        Value::Array(self.rows.iter().cloned().map(Value::Object).collect())
    }

    /// Borrow the rows
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Consume into the rows
    pub fn into_records(self) -> Vec<Record> {
        self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append one row
    pub fn push_row(&mut self, row: Record) {
        self.rows.push(row);
    }

    /// Union of column names in first-appearance order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// Row-wise concatenation, `self` first
    pub fn concat(mut self, other: Table) -> Table {
        self.rows.extend(other.rows);
        self
    }

    /// Keep the rows matching every `column -> value` condition
    ///
    /// An array value means membership, anything else equality. Numbers
    /// compare by value (`3` matches `3.0`). Conditions on columns the table
    /// does not have are ignored.
    pub fn filter(&self, conditions: &Map<String, Value>) -> Table {
        let columns = self.columns();
        let active: Vec<(&String, &Value)> = conditions
            .iter()
            .filter(|(column, _)| columns.contains(column))
            .collect();

        let rows = self
            .rows
            .iter()
            .filter(|row| {
                active.iter().all(|(column, expected)| {
                    let cell = row.get(column.as_str()).unwrap_or(&Value::Null);
                    match expected {
                        Value::Array(allowed) => allowed.iter().any(|v| values_match(cell, v)),
                        other => values_match(cell, other),
                    }
                })
            })
            .cloned()
            .collect();

        Table { rows }
    }

    /// Rows with every record stripped of null cells
    pub fn without_nulls(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|(_, value)| !value.is_null())
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }

    /// Encode as CSV text with a header row
    ///
    /// Missing and null cells are written empty, nested values as JSON text.
    pub fn to_csv(&self) -> Result<String> {
        let columns = self.columns();
        let mut writer = csv::Writer::from_writer(Vec::new());

        if !columns.is_empty() {
            writer.write_record(&columns)?;
        }
        for row in &self.rows {
            writer.write_record(columns.iter().map(|column| render_cell(row.get(column))))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Csv(e.error().to_string()))?;
        String::from_utf8(bytes).map_err(|e| Error::decode(e.to_string()))
    }

    /// Decode CSV text with a header row, inferring scalar cell types
    pub fn from_csv(text: &str) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: Record = headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let value = record.get(i).map(infer_cell).unwrap_or(Value::Null);
                    (header.to_string(), value)
                })
                .collect();
            rows.push(row);
        }

        Ok(Table { rows })
    }
}

impl From<Vec<Record>> for Table {
    fn from(rows: Vec<Record>) -> Self {
        Self::from_records(rows)
    }
}

impl FromIterator<Record> for Table {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::from_records(iter.into_iter().collect())
    }
}

fn into_record(item: Value) -> Record {
    match item {
        Value::Object(record) => record,
        other => {
            let mut record = Map::new();
            record.insert("0".to_string(), other);
            record
        }
    }
}

fn values_match(cell: &Value, expected: &Value) -> bool {
    match (cell, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => cell == expected,
    }
}

fn render_cell(value: Option<&Value>) -> String {
    value.map(value_text).unwrap_or_default()
}

/// Plain-text rendering of a value: strings unquoted, null empty, anything
/// else as JSON text
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Scalar inference for one CSV cell
pub(crate) fn infer_cell(raw: &str) -> Value {
    if raw.is_empty() || raw == "NaN" {
        return Value::Null;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match raw {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(value: Value) -> Table {
        Table::from_json_value(value).unwrap()
    }

    #[test]
    fn test_columns_union_in_first_appearance_order() {
        let t = table(json!([
            { "id": 1, "city": "Austin" },
            { "id": 2, "price": 250000 }
        ]));
        assert_eq!(t.columns(), vec!["id", "city", "price"]);
    }

    #[test]
    fn test_from_json_value_shapes() {
        assert_eq!(table(json!({ "id": 1 })).len(), 1);
        assert_eq!(table(json!([1, 2])).rows()[1], *json!({ "0": 2 }).as_object().unwrap());
        assert!(Table::from_json_value(json!("text")).is_none());
        assert!(table(json!([])).is_empty());
    }

    #[test]
    fn test_filter_equality_membership_and_unknown_columns() {
        let t = table(json!([
            { "city": "Austin", "beds": 3 },
            { "city": "Dallas", "beds": 4 },
            { "city": "Austin", "beds": 2 }
        ]));

        let by_city = t.filter(json!({ "city": "Austin" }).as_object().unwrap());
        assert_eq!(by_city.len(), 2);

        let combined = t.filter(json!({ "city": "Austin", "beds": [3.0, 4] }).as_object().unwrap());
        assert_eq!(combined.rows(), &t.rows()[..1]);

        let ignored = t.filter(json!({ "zip": "78701" }).as_object().unwrap());
        assert_eq!(ignored, t);
    }

    #[test]
    fn test_csv_round_trip_infers_scalars() {
        let t = table(json!([
            { "id": 1, "price": 199999.5, "active": true, "city": "Austin" },
            { "id": 2, "price": null, "active": false, "city": "Round Rock, TX" }
        ]));

        let text = t.to_csv().unwrap();
        assert!(text.starts_with("id,price,active,city\n"));
        assert_eq!(Table::from_csv(&text).unwrap(), t);
    }

    #[test]
    fn test_csv_missing_cells_become_null() {
        let t = table(json!([{ "a": 1 }, { "b": "x" }]));
        let restored = Table::from_csv(&t.to_csv().unwrap()).unwrap();

        assert_eq!(restored.rows()[0], *json!({ "a": 1, "b": null }).as_object().unwrap());
        assert_eq!(restored.rows()[1], *json!({ "a": null, "b": "x" }).as_object().unwrap());
    }

    #[test]
    fn test_infer_cell() {
        assert_eq!(infer_cell(""), Value::Null);
        assert_eq!(infer_cell("NaN"), Value::Null);
        assert_eq!(infer_cell("42"), json!(42));
        assert_eq!(infer_cell("2.5"), json!(2.5));
        assert_eq!(infer_cell("True"), json!(true));
        assert_eq!(infer_cell("78701-1234"), json!("78701-1234"));
    }

    #[test]
    fn test_concat_keeps_order() {
        let a = table(json!([{ "id": 1 }]));
        let b = table(json!([{ "id": 2 }, { "other": 3 }]));
        let joined = a.concat(b);

        assert_eq!(joined.len(), 3);
        assert_eq!(joined.columns(), vec!["id", "other"]);
        assert_eq!(joined.rows()[0]["id"], json!(1));
    }
}
