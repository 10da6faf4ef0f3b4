use std::path::Path;

use icusynth_core::GeneratorConfig;

use crate::CliError;

/// Defaults, then the TOML file, then command-line overrides.
pub fn resolve_config(
    path: Option<&Path>,
    seed: Option<u64>,
    patients: Option<usize>,
) -> Result<GeneratorConfig, CliError> {
    let mut config = match path {
        Some(path) => parse_config(&std::fs::read_to_string(path)?)?,
        None => GeneratorConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(patients) = patients {
        config.n_patients = patients;
    }
    config.validate()?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<GeneratorConfig, CliError> {
    Ok(toml::from_str(content)?)
}
