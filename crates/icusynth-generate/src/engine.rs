use std::path::PathBuf;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use icusynth_core::{Dataset, SUMMARY_VERSION};

use crate::errors::GenerationError;
use crate::model::{DatasetSummary, GenerateOptions, TableReport};
use crate::output::atomic::StagingDir;
use crate::output::csv::write_table_csv;
use crate::report::render_readme;
use crate::variants::{Variant, VariantOutput};

pub const SUMMARY_FILE: &str = "dataset_summary.json";
pub const README_FILE: &str = "README.md";

/// Result of one published variant.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub output_dir: PathBuf,
    pub summary: DatasetSummary,
    pub duration_ms: u64,
}

/// Entry point for building and publishing variant datasets.
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    options: GenerateOptions,
}

impl GenerationEngine {
    pub fn new(options: GenerateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Build one variant from a freshly seeded random source and publish it
    /// under `out_dir/<variant directory>`.
    pub fn run(&self, variant: Variant) -> Result<GenerationResult, GenerationError> {
        let start = Instant::now();
        let config = &self.options.config;
        config.validate()?;

        info!(
            variant = variant.name(),
            seed = config.seed,
            n_patients = config.n_patients,
            "generation started"
        );

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let outcome = variant
            .build(config, &mut rng)
            .and_then(|output| self.publish(variant, output));

        match outcome {
            Ok((output_dir, summary)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    variant = variant.name(),
                    dir = %output_dir.display(),
                    tables = summary.tables.len(),
                    rows = summary.total_rows,
                    duration_ms,
                    "dataset published"
                );
                Ok(GenerationResult {
                    output_dir,
                    summary,
                    duration_ms,
                })
            }
            Err(err) => {
                warn!(variant = variant.name(), error = %err, "generation failed");
                Err(err)
            }
        }
    }

    /// Run several variants in order, stopping at the first failure.
    pub fn run_all(&self, variants: &[Variant]) -> Result<Vec<GenerationResult>, GenerationError> {
        variants.iter().map(|variant| self.run(*variant)).collect()
    }

    fn publish(
        &self,
        variant: Variant,
        output: VariantOutput,
    ) -> Result<(PathBuf, DatasetSummary), GenerationError> {
        let VariantOutput {
            dataset,
            statistics,
        } = output;
        for stat in &statistics {
            match stat.target {
                Some(target) => info!(
                    variant = variant.name(),
                    statistic = %stat.name,
                    target,
                    achieved = stat.achieved,
                    "statistic check"
                ),
                None => info!(
                    variant = variant.name(),
                    statistic = %stat.name,
                    achieved = stat.achieved,
                    "statistic check"
                ),
            }
        }

        let target = self.options.out_dir.join(variant.dir_name());
        let staging = StagingDir::create(&target)?;
        let tables = write_tables(&staging, &dataset)?;

        let summary = DatasetSummary {
            summary_version: SUMMARY_VERSION.to_string(),
            variant: variant.name().to_string(),
            directory: variant.dir_name().to_string(),
            seed: self.options.config.seed,
            n_patients: self.options.config.n_patients,
            total_rows: tables.iter().map(|table| table.rows).sum(),
            tables,
            statistics,
        };
        let mut json = serde_json::to_vec_pretty(&summary)?;
        json.push(b'\n');
        staging.write_bytes(SUMMARY_FILE, &json)?;
        let readme = render_readme(variant.title(), &summary, &dataset);
        staging.write_bytes(README_FILE, readme.as_bytes())?;

        let output_dir = staging.publish()?;
        Ok((output_dir, summary))
    }
}

fn write_tables(staging: &StagingDir, dataset: &Dataset) -> Result<Vec<TableReport>, GenerationError> {
    let mut reports = Vec::with_capacity(dataset.tables.len());
    for table in &dataset.tables {
        let file = format!("{}.csv", table.name());
        let written = write_table_csv(&staging.path().join(&file), table)?;
        reports.push(TableReport {
            table: table.name().to_string(),
            file,
            rows: table.len() as u64,
            bytes: written.bytes,
            sha256: written.sha256,
        });
    }
    Ok(reports)
}
