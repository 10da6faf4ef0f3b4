use icusynth_core::{Dataset, TIMESTAMP_FORMAT};

use crate::model::DatasetSummary;

/// Render the narrative `README.md` published next to the CSV files.
pub fn render_readme(title: &str, summary: &DatasetSummary, dataset: &Dataset) -> String {
    let mut lines = Vec::new();

    lines.push(format!("# {title}"));
    lines.push(String::new());
    lines.push("Synthetic ICU data for testing and development only. All identifiers are fictional and every clinical value is randomly generated.".to_string());
    lines.push(String::new());

    lines.push("## Run summary".to_string());
    lines.push(format!("- variant: {}", summary.variant));
    lines.push(format!("- seed: {}", summary.seed));
    lines.push(format!("- patients: {}", summary.n_patients));
    lines.push(format!("- tables: {}", summary.tables.len()));
    lines.push(format!("- total rows: {}", summary.total_rows));
    lines.push(String::new());

    lines.push("## Tables".to_string());
    lines.push("| table | rows | references |".to_string());
    lines.push("| --- | --- | --- |".to_string());
    for report in &summary.tables {
        let references = dataset
            .table(&report.table)
            .map(|table| {
                table
                    .schema
                    .foreign_keys
                    .iter()
                    .map(|fk| format!("{} -> {}.{}", fk.column, fk.parent_table, fk.parent_column))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!("| {} | {} | {} |", report.file, report.rows, references));
    }
    lines.push(String::new());

    if !summary.statistics.is_empty() {
        lines.push("## Population statistics".to_string());
        lines.push("| statistic | target | achieved |".to_string());
        lines.push("| --- | --- | --- |".to_string());
        for stat in &summary.statistics {
            let target = stat
                .target
                .map(|value| format!("{value}"))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!("| {} | {} | {} |", stat.name, target, stat.achieved));
        }
        lines.push(String::new());
    }

    lines.push("## Conventions".to_string());
    lines.push(format!(
        "- Timestamps are UTC and rendered as `{TIMESTAMP_FORMAT}`."
    ));
    lines.push("- Identifiers are opaque strings; do not parse their numeric part.".to_string());
    lines.push("- Every foreign key resolves to a row of its parent table, and child timestamps fall within the parent's span.".to_string());
    lines.push("- `dataset_summary.json` lists row counts and a SHA-256 fingerprint per file.".to_string());

    lines.join("\n") + "\n"
}
