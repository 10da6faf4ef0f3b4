use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use icusynth_core::GeneratorConfig;

/// Options for the generation engine.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Root directory; each variant is published into its own subdirectory.
    pub out_dir: PathBuf,
    pub config: GeneratorConfig,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("output"),
            config: GeneratorConfig::default(),
        }
    }
}

/// Summary of one written CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub file: String,
    pub rows: u64,
    pub bytes: u64,
    /// Hex SHA-256 of the file contents.
    pub sha256: String,
}

/// Achieved population statistic, optionally paired with its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticCheck {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    pub achieved: f64,
}

impl StatisticCheck {
    pub fn new(name: &str, target: Option<f64>, achieved: f64) -> Self {
        Self {
            name: name.to_string(),
            target,
            achieved: (achieved * 10_000.0).round() / 10_000.0,
        }
    }

    pub fn observed(name: &str, achieved: f64) -> Self {
        Self::new(name, None, achieved)
    }
}

/// Contents of `dataset_summary.json`.
///
/// Nothing here depends on wall-clock time, so two runs with the same seed
/// and configuration serialize to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub summary_version: String,
    pub variant: String,
    pub directory: String,
    pub seed: u64,
    pub n_patients: usize,
    pub total_rows: u64,
    pub tables: Vec<TableReport>,
    pub statistics: Vec<StatisticCheck>,
}

impl DatasetSummary {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|table| table.table == name)
    }

    pub fn statistic(&self, name: &str) -> Option<&StatisticCheck> {
        self.statistics.iter().find(|stat| stat.name == name)
    }
}
