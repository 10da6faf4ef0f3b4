//! Variant builders.
//!
//! Each variant turns a [`GeneratorConfig`] and one seeded random source into
//! a validated [`Dataset`] plus the population statistics reported in its
//! summary.

pub mod format_a;
pub mod format_b;
pub mod format_c;

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use icusynth_core::{Dataset, GeneratorConfig, TableSchema};

use crate::errors::GenerationError;
use crate::model::StatisticCheck;

/// Output schema convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Longitudinal ICU schema, 23 tables.
    FormatA,
    /// Hospital-admission schema, 8 tables.
    FormatB,
    /// Standardized clinical data model, 6 tables.
    FormatC,
}

/// Built dataset of one variant.
#[derive(Debug, Clone)]
pub struct VariantOutput {
    pub dataset: Dataset,
    pub statistics: Vec<StatisticCheck>,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::FormatA, Variant::FormatB, Variant::FormatC];

    pub fn name(self) -> &'static str {
        match self {
            Variant::FormatA => "format_a",
            Variant::FormatB => "format_b",
            Variant::FormatC => "format_c",
        }
    }

    /// Directory the variant is published into under the output root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Variant::FormatA => "clif_format",
            Variant::FormatB => "mimic_format",
            Variant::FormatC => "omop_format",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Variant::FormatA => "Synthetic ICU dataset (CLIF-style)",
            Variant::FormatB => "Synthetic ICU dataset (MIMIC-style)",
            Variant::FormatC => "Synthetic ICU dataset (OMOP-style)",
        }
    }

    /// Table schemas in dependency order.
    pub fn schemas(self) -> Vec<TableSchema> {
        match self {
            Variant::FormatA => format_a::schema::all(),
            Variant::FormatB => format_b::schema::all(),
            Variant::FormatC => format_c::schemas(),
        }
    }

    pub fn build<R: Rng + ?Sized>(
        self,
        config: &GeneratorConfig,
        rng: &mut R,
    ) -> Result<VariantOutput, GenerationError> {
        match self {
            Variant::FormatA => format_a::build(config, rng),
            Variant::FormatB => format_b::build(config, rng),
            Variant::FormatC => format_c::build(config, rng),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "a" | "format_a" | "clif" | "clif_format" => Ok(Variant::FormatA),
            "b" | "format_b" | "mimic" | "mimic_format" => Ok(Variant::FormatB),
            "c" | "format_c" | "omop" | "omop_format" => Ok(Variant::FormatC),
            other => Err(format!("unknown format '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_directory_names() {
        assert_eq!("a".parse::<Variant>(), Ok(Variant::FormatA));
        assert_eq!("MIMIC_FORMAT".parse::<Variant>(), Ok(Variant::FormatB));
        assert_eq!("omop".parse::<Variant>(), Ok(Variant::FormatC));
        assert!("d".parse::<Variant>().is_err());
    }

    #[test]
    fn table_counts_per_variant() {
        assert_eq!(Variant::FormatA.schemas().len(), 23);
        assert_eq!(Variant::FormatB.schemas().len(), 8);
        assert_eq!(Variant::FormatC.schemas().len(), 6);
    }
}
