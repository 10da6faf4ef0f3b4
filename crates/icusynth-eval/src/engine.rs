use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use icusynth_core::{Dataset, Record, Table, TableSchema, Value, ViolationKind, collect_violations};
use icusynth_generate::{DatasetSummary, SUMMARY_FILE, Variant};

use crate::errors::EvalError;
use crate::metrics::{
    IntegritySummary, PerformanceMetrics, REPORT_VERSION, TableMetrics, VerificationReport,
    WarningItem,
};
use crate::model::{
    REPORT_JSON, REPORT_MARKDOWN, VIOLATIONS_JSON, VerificationResult, VerifyOptions, Violation,
};
use crate::report::render_report;

/// Re-reads a published variant directory and checks it against the
/// variant's schemas and its own summary.
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    options: VerifyOptions,
}

/// Verify with default options; reports land next to the CSV files.
pub fn verify_output_dir(
    variant: Variant,
    dataset_dir: &Path,
) -> Result<VerificationResult, EvalError> {
    VerificationEngine::new(VerifyOptions::default()).run(variant, dataset_dir)
}

impl VerificationEngine {
    pub fn new(options: VerifyOptions) -> Self {
        Self { options }
    }

    pub fn run(
        &self,
        variant: Variant,
        dataset_dir: &Path,
    ) -> Result<VerificationResult, EvalError> {
        let total_start = Instant::now();
        if !dataset_dir.is_dir() {
            return Err(EvalError::InvalidDataset(format!(
                "{} is not a directory",
                dataset_dir.display()
            )));
        }
        info!(
            variant = variant.name(),
            dir = %dataset_dir.display(),
            "verification started"
        );

        let mut warnings = Vec::new();
        let mut violations = Vec::new();
        let mut integrity = IntegritySummary::default();

        let summary = load_summary(variant, dataset_dir, &mut warnings)?;
        let loaded = load_tables(variant, dataset_dir, &mut warnings, &mut violations)?;
        let load_ms = total_start.elapsed().as_millis();
        let validate_start = Instant::now();

        let table_metrics = compare_fingerprints(
            &loaded,
            summary.as_ref(),
            &mut integrity,
            &mut warnings,
            &mut violations,
        );

        let mut dataset = Dataset::new();
        for entry in loaded {
            dataset.push(entry.table);
        }
        for table in &dataset.tables {
            check_primary_key(table, &mut integrity, &mut violations);
            check_timestamps(table, &mut integrity, &mut violations);
        }
        check_references(&dataset, &mut integrity, &mut violations)?;

        sort_warnings(&mut warnings);
        sort_violations(&mut violations);
        let validate_ms = validate_start.elapsed().as_millis();

        let report = VerificationReport {
            report_version: REPORT_VERSION.to_string(),
            variant: variant.name().to_string(),
            directory: variant.dir_name().to_string(),
            seed: summary.as_ref().map(|summary| summary.seed),
            tables: table_metrics,
            integrity,
            statistics: summary
                .map(|summary| summary.statistics)
                .unwrap_or_default(),
            warnings,
            performance: PerformanceMetrics {
                load_ms,
                validate_ms,
                total_ms: total_start.elapsed().as_millis(),
            },
        };

        let markdown = render_report(&report, &violations, self.options.max_examples);
        let report_dir = self
            .options
            .out_dir
            .clone()
            .unwrap_or_else(|| dataset_dir.to_path_buf());
        std::fs::create_dir_all(&report_dir)?;

        let report_path = report_dir.join(REPORT_JSON);
        std::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)?;
        let markdown_path = report_dir.join(REPORT_MARKDOWN);
        std::fs::write(&markdown_path, markdown.as_bytes())?;

        let violations_path = if self.options.write_violations {
            let path = report_dir.join(VIOLATIONS_JSON);
            std::fs::write(&path, serde_json::to_vec_pretty(&violations)?)?;
            Some(path)
        } else {
            None
        };

        if violations.is_empty() {
            info!(
                variant = variant.name(),
                tables = report.tables.len(),
                duration_ms = report.performance.total_ms as u64,
                "verification passed"
            );
        } else {
            warn!(
                variant = variant.name(),
                violations = violations.len(),
                "verification failed"
            );
        }

        if self.options.strict && !violations.is_empty() {
            return Err(EvalError::Violations(violations.len() as u64));
        }

        Ok(VerificationResult {
            report_dir,
            report_path,
            markdown_path,
            violations_path,
            report,
            markdown,
            violations,
        })
    }
}

/// Table read back from disk plus the fingerprint of its file.
#[derive(Debug)]
struct LoadedTable {
    table: Table,
    sha256: Option<String>,
}

fn load_summary(
    variant: Variant,
    dataset_dir: &Path,
    warnings: &mut Vec<WarningItem>,
) -> Result<Option<DatasetSummary>, EvalError> {
    let path = dataset_dir.join(SUMMARY_FILE);
    if !path.exists() {
        warnings.push(WarningItem {
            code: "missing_summary".to_string(),
            path: SUMMARY_FILE.to_string(),
            message: format!("summary not found: {}", path.display()),
            hint: Some("row counts and fingerprints were not compared".to_string()),
        });
        return Ok(None);
    }
    let summary: DatasetSummary = serde_json::from_slice(&std::fs::read(&path)?)?;
    if summary.variant != variant.name() {
        return Err(EvalError::InvalidDataset(format!(
            "{} describes {}, not {}",
            path.display(),
            summary.variant,
            variant.name()
        )));
    }
    Ok(Some(summary))
}

fn load_tables(
    variant: Variant,
    dataset_dir: &Path,
    warnings: &mut Vec<WarningItem>,
    violations: &mut Vec<Violation>,
) -> Result<Vec<LoadedTable>, EvalError> {
    let mut tables = Vec::new();
    for schema in variant.schemas() {
        let csv_path = dataset_dir.join(format!("{}.csv", schema.name));
        if !csv_path.exists() {
            warnings.push(WarningItem {
                code: "missing_table".to_string(),
                path: schema.name.clone(),
                message: format!("dataset file not found: {}", csv_path.display()),
                hint: Some("regenerate the variant".to_string()),
            });
            tables.push(LoadedTable {
                table: Table::new(schema),
                sha256: None,
            });
            continue;
        }

        let bytes = std::fs::read(&csv_path)?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let table = load_table_csv(schema, &bytes, warnings, violations)?;
        tables.push(LoadedTable {
            table,
            sha256: Some(sha256),
        });
    }
    Ok(tables)
}

/// Parse CSV bytes against a schema. Empty cells are left unset, every
/// other cell becomes text.
fn load_table_csv(
    schema: TableSchema,
    bytes: &[u8],
    warnings: &mut Vec<WarningItem>,
    violations: &mut Vec<Violation>,
) -> Result<Table, EvalError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers = reader
        .headers()?
        .iter()
        .map(|header| header.to_string())
        .collect::<Vec<_>>();

    if headers != schema.columns {
        violations.push(Violation::table(
            "header_mismatch",
            &schema.name,
            format!(
                "expected columns [{}], found [{}]",
                schema.columns.join(","),
                headers.join(",")
            ),
        ));
    }
    for header in headers.iter().filter(|header| !schema.has_column(header)) {
        warnings.push(WarningItem {
            code: "unknown_column".to_string(),
            path: format!("{}.{}", schema.name, header),
            message: "column is not part of the table schema and was ignored".to_string(),
            hint: None,
        });
    }

    let header_map = headers
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect::<HashMap<_, _>>();
    let positions = schema
        .columns
        .iter()
        .filter_map(|column| {
            header_map
                .get(column.as_str())
                .map(|position| (column.clone(), *position))
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(schema);
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (column, position) in &positions {
            if let Some(cell) = row.get(*position).filter(|cell| !cell.is_empty()) {
                record.set(column, cell);
            }
        }
        table.push(record);
    }
    Ok(table)
}

fn compare_fingerprints(
    loaded: &[LoadedTable],
    summary: Option<&DatasetSummary>,
    integrity: &mut IntegritySummary,
    warnings: &mut Vec<WarningItem>,
    violations: &mut Vec<Violation>,
) -> Vec<TableMetrics> {
    let mut metrics = Vec::with_capacity(loaded.len());
    for entry in loaded {
        let name = entry.table.name();
        let expected = summary.and_then(|summary| summary.table(name));
        let rows_found = entry.table.len() as u64;

        if let Some(expected) = expected {
            integrity.fingerprints.checked += 1;
            match &entry.sha256 {
                None => {
                    integrity.fingerprints.violations += 1;
                    violations.push(Violation::table(
                        "missing_table",
                        name,
                        format!("{} is listed in the summary but absent", expected.file),
                    ));
                }
                Some(found) if *found != expected.sha256 => {
                    integrity.fingerprints.violations += 1;
                    violations.push(Violation::table(
                        "checksum_mismatch",
                        name,
                        format!("sha256 {found} differs from recorded {}", expected.sha256),
                    ));
                }
                Some(_) => {}
            }
            if entry.sha256.is_some() && rows_found != expected.rows {
                integrity.fingerprints.violations += 1;
                violations.push(Violation::table(
                    "row_count_mismatch",
                    name,
                    format!("found {rows_found} rows, summary records {}", expected.rows),
                ));
            }
        }

        metrics.push(TableMetrics {
            table: name.to_string(),
            rows_found,
            rows_expected: expected.map(|expected| expected.rows),
            sha256_found: entry.sha256.clone(),
            sha256_expected: expected.map(|expected| expected.sha256.clone()),
        });
    }

    if let Some(summary) = summary {
        for recorded in &summary.tables {
            if !loaded.iter().any(|entry| entry.table.name() == recorded.table) {
                warnings.push(WarningItem {
                    code: "unexpected_table".to_string(),
                    path: recorded.table.clone(),
                    message: "summary lists a table the variant does not define".to_string(),
                    hint: None,
                });
            }
        }
    }
    metrics
}

fn check_primary_key(
    table: &Table,
    integrity: &mut IntegritySummary,
    violations: &mut Vec<Violation>,
) {
    let Some(column) = table.schema.primary_key.as_deref() else {
        return;
    };
    let path = format!("{}.{}", table.name(), column);
    let mut seen = HashSet::with_capacity(table.len());
    for (row_index, row) in table.rows.iter().enumerate() {
        integrity.primary_keys.checked += 1;
        let Some(key) = row.get(column).and_then(Value::as_str) else {
            integrity.primary_keys.violations += 1;
            violations.push(Violation::row("missing_key", path.clone(), row_index, "empty key"));
            continue;
        };
        if !seen.insert(key) {
            integrity.primary_keys.violations += 1;
            violations.push(Violation::row(
                "duplicate_key",
                path.clone(),
                row_index,
                format!("'{key}' appears more than once"),
            ));
        }
    }
}

/// Every span-checked or span-defining cell must use the timestamp layout.
fn check_timestamps(
    table: &Table,
    integrity: &mut IntegritySummary,
    violations: &mut Vec<Violation>,
) {
    let mut columns = BTreeSet::new();
    for check in &table.schema.span_checks {
        columns.insert(check.column.as_str());
    }
    if let Some((start, end)) = &table.schema.own_span {
        columns.insert(start.as_str());
        columns.insert(end.as_str());
    }

    for (row_index, row) in table.rows.iter().enumerate() {
        for column in &columns {
            let Some(value) = row.get(column) else {
                continue;
            };
            integrity.timestamps.checked += 1;
            if value.as_timestamp().is_none() {
                integrity.timestamps.violations += 1;
                violations.push(Violation::row(
                    "bad_timestamp",
                    format!("{}.{}", table.name(), column),
                    row_index,
                    format!("'{}' is not YYYY-MM-DD HH:MM:SS+00:00", value.to_csv()),
                ));
            }
        }
    }
}

fn check_references(
    dataset: &Dataset,
    integrity: &mut IntegritySummary,
    violations: &mut Vec<Violation>,
) -> Result<(), EvalError> {
    for table in &dataset.tables {
        let rows = table.len() as u64;
        let own_span = u64::from(table.schema.own_span.is_some());
        integrity.foreign_keys.checked += rows * table.schema.foreign_keys.len() as u64;
        integrity.spans.checked += rows * (table.schema.span_checks.len() as u64 + own_span);
    }

    for found in collect_violations(dataset)? {
        let code = match found.kind {
            ViolationKind::MissingParent => {
                integrity.foreign_keys.violations += 1;
                "missing_parent"
            }
            ViolationKind::OutsideSpan => {
                integrity.spans.violations += 1;
                "outside_span"
            }
            ViolationKind::NegativeSpan => {
                integrity.spans.violations += 1;
                "negative_span"
            }
        };
        violations.push(Violation::row(code, found.table, found.row_index, found.detail));
    }
    Ok(())
}

fn sort_warnings(warnings: &mut [WarningItem]) {
    warnings.sort_by(|a, b| (&a.path, &a.code).cmp(&(&b.path, &b.code)));
}

fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        (&a.path, a.row_index, &a.code).cmp(&(&b.path, b.row_index, &b.code))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new("stay", &["stay_id", "start", "end"])
            .primary_key("stay_id")
            .spanning("start", "end")
    }

    #[test]
    fn empty_cells_stay_unset() {
        let mut warnings = Vec::new();
        let mut violations = Vec::new();
        let bytes = b"stay_id,start,end\nS1,2024-01-01 00:00:00+00:00,\n";
        let table = load_table_csv(schema(), bytes, &mut warnings, &mut violations)
            .expect("parse csv");
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].get("stay_id").and_then(Value::as_str), Some("S1"));
        assert!(table.rows[0].get("end").is_none());
        assert!(violations.is_empty());
    }

    #[test]
    fn header_drift_is_a_violation_and_extra_columns_warn() {
        let mut warnings = Vec::new();
        let mut violations = Vec::new();
        let bytes = b"stay_id,start,end,note\nS1,,,x\n";
        let table = load_table_csv(schema(), bytes, &mut warnings, &mut violations)
            .expect("parse csv");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, "header_mismatch");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "stay.note");
        assert!(table.rows[0].get("note").is_none());
    }

    #[test]
    fn duplicate_keys_and_bad_timestamps_are_reported() {
        let mut warnings = Vec::new();
        let mut violations = Vec::new();
        let bytes = b"stay_id,start,end\n\
            S1,2024-01-01 00:00:00+00:00,2024-01-02 00:00:00+00:00\n\
            S1,2024-01-01,2024-01-02 00:00:00+00:00\n";
        let table = load_table_csv(schema(), bytes, &mut warnings, &mut violations)
            .expect("parse csv");

        let mut integrity = IntegritySummary::default();
        check_primary_key(&table, &mut integrity, &mut violations);
        check_timestamps(&table, &mut integrity, &mut violations);

        assert_eq!(integrity.primary_keys.checked, 2);
        assert_eq!(integrity.primary_keys.violations, 1);
        assert_eq!(integrity.timestamps.checked, 4);
        assert_eq!(integrity.timestamps.violations, 1);
        let codes: Vec<&str> = violations.iter().map(|v| v.code.as_str()).collect();
        assert_eq!(codes, vec!["duplicate_key", "bad_timestamp"]);
        assert_eq!(violations[1].path, "stay.start");
        assert_eq!(violations[1].row_index, Some(1));
    }
}
