use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Label with a relative sampling weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeightedLabel {
    pub label: String,
    pub weight: f64,
}

impl WeightedLabel {
    pub fn new(label: &str, weight: f64) -> Self {
        Self {
            label: label.to_string(),
            weight,
        }
    }
}

/// Primary admission condition for the hospital-admission cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConditionSpec {
    /// Snake-case key, also used to match medications and procedures.
    pub key: String,
    pub icd10: String,
    /// Relative frequency as a primary diagnosis.
    pub frequency: f64,
    /// In-hospital mortality when this is the primary diagnosis.
    pub mortality: f64,
}

impl ConditionSpec {
    fn new(key: &str, icd10: &str, frequency: f64, mortality: f64) -> Self {
        Self {
            key: key.to_string(),
            icd10: icd10.to_string(),
            frequency,
            mortality,
        }
    }
}

/// Complete generator configuration.
///
/// Every field has a default, so a TOML file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Seed of the single random source used for a variant run.
    pub seed: u64,
    /// Number of subjects in the population.
    pub n_patients: usize,
    /// Study start; every generated timestamp falls after it.
    #[schemars(with = "String")]
    pub base_date: NaiveDate,
    pub format_a: FormatAConfig,
    pub format_b: FormatBConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_patients: 500,
            base_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            format_a: FormatAConfig::default(),
            format_b: FormatBConfig::default(),
        }
    }
}

/// Targets and vocabularies of the longitudinal ICU schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct FormatAConfig {
    pub mortality_rate: f64,
    pub mortality_rate_over_70: f64,
    pub mortality_rate_over_80: f64,
    pub female_rate: f64,
    pub hispanic_rate: f64,
    pub race_weights: Vec<WeightedLabel>,
    pub language_weights: Vec<WeightedLabel>,
    /// Weights for 1, 2, 3, ... hospitalizations per patient.
    pub encounter_count_weights: Vec<f64>,
    /// Log-normal length of stay parameters, in days.
    pub los_log_mean: f64,
    pub los_log_sd: f64,
    pub imv_rate: f64,
    pub vasopressor_rate: f64,
    pub crrt_rate: f64,
    pub ecmo_rate: f64,
    pub position_rate: f64,
    pub culture_rate: f64,
    pub non_culture_rate: f64,
    pub code_status_rate: f64,
    pub therapy_rate: f64,
    pub target_median_los_days: f64,
    pub target_median_sofa: f64,
    pub provider_pool_size: usize,
}

impl Default for FormatAConfig {
    fn default() -> Self {
        Self {
            mortality_rate: 0.139,
            mortality_rate_over_70: 0.18,
            mortality_rate_over_80: 0.25,
            female_rate: 0.45,
            hispanic_rate: 0.06,
            race_weights: vec![
                WeightedLabel::new("White", 0.634),
                WeightedLabel::new("Black or African American", 0.15),
                WeightedLabel::new("Asian", 0.08),
                WeightedLabel::new("American Indian or Alaska Native", 0.02),
                WeightedLabel::new("Native Hawaiian or Other Pacific Islander", 0.01),
                WeightedLabel::new("Other", 0.106),
            ],
            language_weights: vec![
                WeightedLabel::new("English", 0.75),
                WeightedLabel::new("Spanish", 0.12),
                WeightedLabel::new("Chinese", 0.05),
                WeightedLabel::new("Other", 0.08),
            ],
            encounter_count_weights: vec![0.7, 0.25, 0.05],
            los_log_mean: 1.93,
            los_log_sd: 0.8,
            imv_rate: 0.356,
            vasopressor_rate: 0.368,
            crrt_rate: 0.10,
            ecmo_rate: 0.02,
            position_rate: 0.30,
            culture_rate: 0.60,
            non_culture_rate: 0.40,
            code_status_rate: 0.30,
            therapy_rate: 0.40,
            target_median_los_days: 6.9,
            target_median_sofa: 4.0,
            provider_pool_size: 50,
        }
    }
}

/// Targets and vocabularies of the hospital-admission schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct FormatBConfig {
    /// Weights for 1, 2, 3, ... admissions per subject.
    pub encounter_count_weights: Vec<f64>,
    /// Fraction of admissions with an ICU stay.
    pub icu_stay_rate: f64,
    pub conditions: Vec<ConditionSpec>,
}

impl Default for FormatBConfig {
    fn default() -> Self {
        Self {
            encounter_count_weights: vec![0.7, 0.25, 0.05],
            icu_stay_rate: 0.9,
            conditions: vec![
                ConditionSpec::new("sepsis", "A41.9", 0.3, 0.25),
                ConditionSpec::new("pneumonia", "J18.9", 0.25, 0.15),
                ConditionSpec::new("acute_kidney_injury", "N17.9", 0.2, 0.3),
                ConditionSpec::new("heart_failure", "I50.9", 0.15, 0.2),
                ConditionSpec::new("ards", "J80", 0.1, 0.4),
                ConditionSpec::new("stroke", "I63.9", 0.1, 0.25),
                ConditionSpec::new("copd_exacerbation", "J44.1", 0.1, 0.1),
                ConditionSpec::new("gi_bleed", "K92.2", 0.05, 0.15),
            ],
        }
    }
}

impl GeneratorConfig {
    /// Check rates, weights and sizes before any sampling happens.
    pub fn validate(&self) -> Result<()> {
        if self.n_patients == 0 {
            return Err(Error::InvalidConfig("n_patients must be > 0".to_string()));
        }
        self.format_a.validate()?;
        self.format_b.validate()
    }
}

impl FormatAConfig {
    fn validate(&self) -> Result<()> {
        let rates = [
            ("format_a.mortality_rate", self.mortality_rate),
            ("format_a.mortality_rate_over_70", self.mortality_rate_over_70),
            ("format_a.mortality_rate_over_80", self.mortality_rate_over_80),
            ("format_a.female_rate", self.female_rate),
            ("format_a.hispanic_rate", self.hispanic_rate),
            ("format_a.imv_rate", self.imv_rate),
            ("format_a.vasopressor_rate", self.vasopressor_rate),
            ("format_a.crrt_rate", self.crrt_rate),
            ("format_a.ecmo_rate", self.ecmo_rate),
            ("format_a.position_rate", self.position_rate),
            ("format_a.culture_rate", self.culture_rate),
            ("format_a.non_culture_rate", self.non_culture_rate),
            ("format_a.code_status_rate", self.code_status_rate),
            ("format_a.therapy_rate", self.therapy_rate),
        ];
        for (name, rate) in rates {
            check_rate(name, rate)?;
        }
        check_labels("format_a.race_weights", &self.race_weights)?;
        check_labels("format_a.language_weights", &self.language_weights)?;
        check_weights("format_a.encounter_count_weights", &self.encounter_count_weights)?;
        if !(self.los_log_sd.is_finite() && self.los_log_sd > 0.0) || !self.los_log_mean.is_finite()
        {
            return Err(Error::InvalidConfig(
                "format_a.los_log_sd must be finite and > 0".to_string(),
            ));
        }
        if self.provider_pool_size < 4 {
            return Err(Error::InvalidConfig(
                "format_a.provider_pool_size must be >= 4".to_string(),
            ));
        }
        Ok(())
    }
}

impl FormatBConfig {
    fn validate(&self) -> Result<()> {
        check_rate("format_b.icu_stay_rate", self.icu_stay_rate)?;
        check_weights("format_b.encounter_count_weights", &self.encounter_count_weights)?;
        if self.conditions.is_empty() {
            return Err(Error::InvalidConfig(
                "format_b.conditions must not be empty".to_string(),
            ));
        }
        let frequencies: Vec<f64> = self.conditions.iter().map(|c| c.frequency).collect();
        check_weights("format_b.conditions.frequency", &frequencies)?;
        for condition in &self.conditions {
            check_rate(
                &format!("format_b.conditions.{}.mortality", condition.key),
                condition.mortality,
            )?;
        }
        Ok(())
    }
}

fn check_rate(name: &str, rate: f64) -> Result<()> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be within [0, 1], got {rate}"
        )))
    }
}

fn check_weights(name: &str, weights: &[f64]) -> Result<()> {
    if weights.is_empty() {
        return Err(Error::InvalidConfig(format!("{name} must not be empty")));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be finite and non-negative"
        )));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(Error::InvalidConfig(format!("{name} must not sum to zero")));
    }
    Ok(())
}

fn check_labels(name: &str, labels: &[WeightedLabel]) -> Result<()> {
    let weights: Vec<f64> = labels.iter().map(|label| label.weight).collect();
    check_weights(name, &weights)
}
