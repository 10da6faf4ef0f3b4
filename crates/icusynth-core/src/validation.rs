use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;

use crate::error::{Error, Result};
use crate::model::{Dataset, Table, Value};

/// What went wrong with a child row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Foreign key value absent from the parent's key set.
    MissingParent,
    /// Timestamp outside the parent row's span.
    OutsideSpan,
    /// Row's own end precedes its start.
    NegativeSpan,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::MissingParent => "missing parent",
            ViolationKind::OutsideSpan => "outside parent span",
            ViolationKind::NegativeSpan => "negative span",
        };
        f.write_str(label)
    }
}

/// Post-generation integrity failure naming the offending table and row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("referential integrity violated in {table} row {row_index} ({kind}): {detail}")]
pub struct ReferentialIntegrityError {
    pub table: String,
    pub row_index: usize,
    pub kind: ViolationKind,
    pub detail: String,
}

/// Validate a dataset, failing on the first violation.
///
/// This checks:
/// - every record column is declared by its table schema
/// - every foreign key resolves to a row of its parent table
/// - every span-checked timestamp lies within the parent row's span
/// - every row's own span is ordered
pub fn validate_dataset(dataset: &Dataset) -> Result<()> {
    let mut violations = collect_violations(dataset)?;
    if violations.is_empty() {
        return Ok(());
    }
    Err(Error::ReferentialIntegrity(violations.swap_remove(0)))
}

/// Collect every integrity violation in table order.
///
/// Schema mistakes (unknown tables or columns) are returned as errors
/// because they make the remaining checks meaningless.
pub fn collect_violations(dataset: &Dataset) -> Result<Vec<ReferentialIntegrityError>> {
    let mut index = KeyIndex::default();
    let mut violations = Vec::new();

    for table in &dataset.tables {
        check_columns(table)?;
        for fk in &table.schema.foreign_keys {
            let parent = dataset.table(&fk.parent_table).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "{}.{} references unknown table {}",
                    table.name(),
                    fk.column,
                    fk.parent_table
                ))
            })?;
            if !parent.schema.has_column(&fk.parent_column) {
                return Err(Error::InvalidSchema(format!(
                    "{}.{} references unknown column {}.{}",
                    table.name(),
                    fk.column,
                    fk.parent_table,
                    fk.parent_column
                )));
            }
            index.ensure(parent, &fk.parent_column);
        }
    }

    for table in &dataset.tables {
        check_own_spans(table, &mut violations);
        check_foreign_keys(dataset, table, &index, &mut violations)?;
    }

    Ok(violations)
}

fn check_columns(table: &Table) -> Result<()> {
    for (row_index, row) in table.rows.iter().enumerate() {
        for column in row.columns() {
            if !table.schema.has_column(column) {
                return Err(Error::InvalidSchema(format!(
                    "{} row {} sets undeclared column {}",
                    table.name(),
                    row_index,
                    column
                )));
            }
        }
    }
    for check in &table.schema.span_checks {
        if table.schema.foreign_key(&check.via).is_none() {
            return Err(Error::InvalidSchema(format!(
                "{}.{} span check goes through {} which is not a foreign key",
                table.name(),
                check.column,
                check.via
            )));
        }
    }
    Ok(())
}

fn check_own_spans(table: &Table, violations: &mut Vec<ReferentialIntegrityError>) {
    let Some((start_column, end_column)) = table.schema.own_span.as_ref() else {
        return;
    };
    for (row_index, row) in table.rows.iter().enumerate() {
        let start = row.get(start_column).and_then(Value::as_timestamp);
        let end = row.get(end_column).and_then(Value::as_timestamp);
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                violations.push(ReferentialIntegrityError {
                    table: table.name().to_string(),
                    row_index,
                    kind: ViolationKind::NegativeSpan,
                    detail: format!("{end_column} precedes {start_column}"),
                });
            }
        }
    }
}

fn check_foreign_keys(
    dataset: &Dataset,
    table: &Table,
    index: &KeyIndex,
    violations: &mut Vec<ReferentialIntegrityError>,
) -> Result<()> {
    for (row_index, row) in table.rows.iter().enumerate() {
        for fk in &table.schema.foreign_keys {
            let key = row.get(&fk.column).map(Value::to_csv).unwrap_or_default();
            let parent_row = index.lookup(&fk.parent_table, &fk.parent_column, &key);
            let Some(parent_row) = parent_row else {
                violations.push(ReferentialIntegrityError {
                    table: table.name().to_string(),
                    row_index,
                    kind: ViolationKind::MissingParent,
                    detail: format!(
                        "{}='{}' not found in {}.{}",
                        fk.column, key, fk.parent_table, fk.parent_column
                    ),
                });
                continue;
            };

            for check in table.schema.span_checks.iter().filter(|c| c.via == fk.column) {
                let Some(value) = row.get(&check.column).and_then(Value::as_timestamp) else {
                    continue;
                };
                let parent = dataset.table(&fk.parent_table).ok_or_else(|| {
                    Error::InvalidSchema(format!("unknown table {}", fk.parent_table))
                })?;
                let parent_record = &parent.rows[parent_row];
                let start = parent_record
                    .get(&check.start_column)
                    .and_then(Value::as_timestamp);
                let end = parent_record
                    .get(&check.end_column)
                    .and_then(Value::as_timestamp);
                let before = start.is_some_and(|start| value < start);
                let after = end.is_some_and(|end| value > end);
                if before || after {
                    violations.push(ReferentialIntegrityError {
                        table: table.name().to_string(),
                        row_index,
                        kind: ViolationKind::OutsideSpan,
                        detail: format!(
                            "{}='{}' outside {}[{}..{}] of {}",
                            check.column,
                            Value::Timestamp(value).to_csv(),
                            fk.parent_table,
                            check.start_column,
                            check.end_column,
                            key
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Lookup from (table, column, rendered key) to the parent row index.
#[derive(Debug, Default)]
struct KeyIndex {
    keys: BTreeMap<(String, String), HashMap<String, usize>>,
}

impl KeyIndex {
    fn ensure(&mut self, table: &Table, column: &str) {
        let slot = (table.name().to_string(), column.to_string());
        if self.keys.contains_key(&slot) {
            return;
        }
        let mut keys = HashMap::with_capacity(table.len());
        for (row_index, row) in table.rows.iter().enumerate() {
            if let Some(value) = row.get(column).filter(|value| !value.is_null()) {
                keys.entry(value.to_csv()).or_insert(row_index);
            }
        }
        self.keys.insert(slot, keys);
    }

    fn lookup(&self, table: &str, column: &str, key: &str) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        self.keys
            .get(&(table.to_string(), column.to_string()))
            .and_then(|keys| keys.get(key))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::model::{Record, TableSchema};

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    fn dataset(event_hour: u32, parent_id: &str) -> Dataset {
        let mut stays = Table::new(
            TableSchema::new("stay", &["stay_id", "start", "end"])
                .primary_key("stay_id")
                .spanning("start", "end"),
        );
        stays.push(
            Record::new()
                .with("stay_id", "S1")
                .with("start", ts(2))
                .with("end", ts(10)),
        );
        let mut events = Table::new(
            TableSchema::new("event", &["stay_id", "at"])
                .references("stay_id", "stay", "stay_id")
                .within("at", "stay_id", "start", "end"),
        );
        events.push(Record::new().with("stay_id", parent_id).with("at", ts(event_hour)));

        let mut dataset = Dataset::new();
        dataset.push(stays);
        dataset.push(events);
        dataset
    }

    #[test]
    fn accepts_consistent_rows() {
        assert!(validate_dataset(&dataset(2, "S1")).is_ok());
        assert!(validate_dataset(&dataset(10, "S1")).is_ok());
    }

    #[test]
    fn reports_orphans_with_row_index() {
        let err = validate_dataset(&dataset(4, "S9")).expect_err("orphan");
        match err {
            Error::ReferentialIntegrity(violation) => {
                assert_eq!(violation.table, "event");
                assert_eq!(violation.row_index, 0);
                assert_eq!(violation.kind, ViolationKind::MissingParent);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn reports_events_outside_span() {
        let violations = collect_violations(&dataset(11, "S1")).expect("schema ok");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::OutsideSpan);
    }

    #[test]
    fn undeclared_columns_are_schema_errors() {
        let mut data = dataset(3, "S1");
        data.tables[1].rows[0].set("bogus", 1_i64);
        assert!(matches!(
            collect_violations(&data),
            Err(Error::InvalidSchema(_))
        ));
    }
}
