use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::time::{DATE_FORMAT, format_timestamp, parse_timestamp};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// Floating point value rendered with a fixed number of decimals.
    Decimal(f64, u8),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn decimal(value: f64, scale: u8) -> Self {
        Value::Decimal(value, scale)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn to_csv(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Decimal(value, scale) => {
                let scale = *scale as usize;
                format!("{value:.scale$}")
            }
            Value::Text(value) => value.clone(),
            Value::Date(value) => value.format(DATE_FORMAT).to_string(),
            Value::Timestamp(value) => format_timestamp(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Decimal(value, _) => Some(*value),
            Value::Text(value) => value.parse().ok(),
            _ => None,
        }
    }

    /// Timestamp view of the value; text cells read back from CSV are parsed.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(value) => Some(*value),
            Value::Text(value) => parse_timestamp(value),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One row keyed by column name. Missing columns render as empty cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Child column referencing a key column of a parent table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub column: String,
    pub parent_table: String,
    pub parent_column: String,
}

/// Timestamp column that must lie within the span of the parent row reached
/// through the foreign key on `via`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanCheck {
    pub column: String,
    pub via: String,
    pub start_column: String,
    pub end_column: String,
}

/// Declared shape of one output table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Option<String>,
    pub foreign_keys: Vec<ForeignKeyRef>,
    pub span_checks: Vec<SpanCheck>,
    /// Start/end columns of the row's own interval, required to be ordered.
    pub own_span: Option<(String, String)>,
}

impl TableSchema {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|column| column.to_string()).collect(),
            primary_key: None,
            foreign_keys: Vec::new(),
            span_checks: Vec::new(),
            own_span: None,
        }
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = Some(column.to_string());
        self
    }

    pub fn references(mut self, column: &str, parent_table: &str, parent_column: &str) -> Self {
        self.foreign_keys.push(ForeignKeyRef {
            column: column.to_string(),
            parent_table: parent_table.to_string(),
            parent_column: parent_column.to_string(),
        });
        self
    }

    pub fn within(mut self, column: &str, via: &str, start_column: &str, end_column: &str) -> Self {
        self.span_checks.push(SpanCheck {
            column: column.to_string(),
            via: via.to_string(),
            start_column: start_column.to_string(),
            end_column: end_column.to_string(),
        });
        self
    }

    pub fn spanning(mut self, start_column: &str, end_column: &str) -> Self {
        self.own_span = Some((start_column.to_string(), end_column.to_string()));
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|name| name == column)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyRef> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }
}

/// Materialized table: schema plus rows in generation order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: TableSchema,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row cells in schema column order.
    pub fn csv_rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            self.schema
                .columns
                .iter()
                .map(|column| row.get(column).map(Value::to_csv).unwrap_or_default())
                .collect()
        })
    }
}

/// All tables of one variant, in dependency order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub tables: Vec<Table>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: Table) {
        self.tables.push(table);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name() == name)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_values_for_csv() {
        assert_eq!(Value::Null.to_csv(), "");
        assert_eq!(Value::decimal(1.0 / 3.0, 2).to_csv(), "0.33");
        assert_eq!(Value::Int(-4).to_csv(), "-4");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
        assert_eq!(Value::from(date).to_csv(), "2024-03-01");
        let none: Option<&str> = None;
        assert!(Value::from(none).is_null());
    }

    #[test]
    fn csv_rows_follow_schema_order() {
        let mut table = Table::new(TableSchema::new("t", &["b", "a", "c"]));
        table.push(Record::new().with("a", "x").with("b", 2_i64));
        let rows: Vec<Vec<String>> = table.csv_rows().collect();
        assert_eq!(rows, vec![vec!["2".to_string(), "x".to_string(), String::new()]]);
    }

    #[test]
    fn text_timestamps_parse_back() {
        let value = Value::from("2024-01-01 06:00:00+00:00");
        assert!(value.as_timestamp().is_some());
        assert_eq!(Value::from("12.5").as_f64(), Some(12.5));
    }
}
