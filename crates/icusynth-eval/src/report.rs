use crate::metrics::{ConstraintStats, VerificationReport};
use crate::model::Violation;

/// Render a deterministic markdown report from a verification run.
pub fn render_report(
    report: &VerificationReport,
    violations: &[Violation],
    max_examples: usize,
) -> String {
    let mut lines = Vec::new();

    lines.push("# icusynth Verification Report".to_string());
    lines.push(String::new());
    lines.push("## Run summary".to_string());
    lines.push(format!("- variant: {}", report.variant));
    lines.push(format!("- directory: {}", report.directory));
    let seed = report
        .seed
        .map(|seed| seed.to_string())
        .unwrap_or_else(|| "-".to_string());
    lines.push(format!("- seed: {seed}"));
    let status = if violations.is_empty() { "clean" } else { "FAILED" };
    lines.push(format!("- status: {status}"));
    lines.push(String::new());

    lines.push("## Tables".to_string());
    lines.push("| table | rows_expected | rows_found | checksum |".to_string());
    lines.push("| --- | --- | --- | --- |".to_string());
    for table in &report.tables {
        let expected = table
            .rows_expected
            .map(|value| value.to_string())
            .unwrap_or_else(|| "-".to_string());
        let checksum = match table.checksum_matches() {
            Some(true) => "ok",
            Some(false) => "mismatch",
            None => "-",
        };
        lines.push(format!(
            "| {} | {} | {} | {} |",
            table.table, expected, table.rows_found, checksum
        ));
    }
    lines.push(String::new());

    lines.push("## Integrity summary".to_string());
    lines.push("| check | checked | violations |".to_string());
    lines.push("| --- | --- | --- |".to_string());
    push_check_row(&mut lines, "primary_key", report.integrity.primary_keys);
    push_check_row(&mut lines, "foreign_key", report.integrity.foreign_keys);
    push_check_row(&mut lines, "span", report.integrity.spans);
    push_check_row(&mut lines, "timestamp", report.integrity.timestamps);
    push_check_row(&mut lines, "fingerprint", report.integrity.fingerprints);
    lines.push(String::new());

    if !report.statistics.is_empty() {
        lines.push("## Recorded statistics".to_string());
        for stat in &report.statistics {
            let target = stat
                .target
                .map(|target| format!(" (target {target})"))
                .unwrap_or_default();
            lines.push(format!("- {}: {}{}", stat.name, stat.achieved, target));
        }
        lines.push(String::new());
    }

    if !report.warnings.is_empty() {
        lines.push("## Warnings".to_string());
        for warning in &report.warnings {
            let hint = warning
                .hint
                .as_ref()
                .map(|hint| format!(" (hint: {hint})"))
                .unwrap_or_default();
            lines.push(format!("- {}: {}{}", warning.path, warning.message, hint));
        }
        lines.push(String::new());
    }

    if !violations.is_empty() {
        lines.push("## Top violations".to_string());
        for violation in violations.iter().take(max_examples) {
            let row = violation
                .row_index
                .map(|row| format!(" row {row}"))
                .unwrap_or_default();
            lines.push(format!(
                "- [{}] {}{}: {}",
                violation.code, violation.path, row, violation.message
            ));
        }
        if violations.len() > max_examples {
            lines.push(format!("- ... {} more", violations.len() - max_examples));
        }
        lines.push(String::new());
    }

    lines.push("## Recommendations".to_string());
    lines.extend(recommendations(report, violations));
    lines.push(String::new());
    lines.join("\n")
}

fn push_check_row(lines: &mut Vec<String>, name: &str, stats: ConstraintStats) {
    lines.push(format!(
        "| {} | {} | {} |",
        name, stats.checked, stats.violations
    ));
}

fn recommendations(report: &VerificationReport, violations: &[Violation]) -> Vec<String> {
    let integrity = &report.integrity;
    let mut lines = Vec::new();
    if integrity.fingerprints.violations > 0 {
        lines.push("- files changed after publishing; regenerate the variant.".to_string());
    }
    if integrity.foreign_keys.violations > 0 || integrity.primary_keys.violations > 0 {
        lines.push("- child rows reference missing parents; check table edits.".to_string());
    }
    if integrity.spans.violations > 0 {
        lines.push("- events fall outside their encounter; check timestamp edits.".to_string());
    }
    if integrity.timestamps.violations > 0 {
        lines.push("- timestamps must use YYYY-MM-DD HH:MM:SS+00:00.".to_string());
    }
    if violations.is_empty() {
        lines.push("- no violations detected.".to_string());
    }
    lines
}
