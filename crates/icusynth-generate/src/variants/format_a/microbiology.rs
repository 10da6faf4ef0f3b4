//! Cultures, susceptibility panels and rapid non-culture tests.

use chrono::Duration;
use rand::Rng;
use rand::seq::IndexedRandom;

use icusynth_core::{IdFormat, IdSequence, Record, Span};

use super::Hospitalization;
use super::schema::{self, MICROBIOLOGY_NON_CULTURE, SENSITIVITY};
use crate::assembler::{Parent, TableBuilder};
use crate::errors::{GenerationError, Site};
use crate::sampler::Categorical;

pub const CULTURE_ID: IdFormat = IdFormat::new("C", 8);

const SPECIMENS: [&str; 6] = ["Blood", "Urine", "Sputum", "Wound", "CSF", "Stool"];
const NO_GROWTH: &str = "No growth";
const ORGANISMS: [&str; 8] = [
    "Staphylococcus aureus",
    "Escherichia coli",
    "Klebsiella pneumoniae",
    "Pseudomonas aeruginosa",
    "Enterococcus faecalis",
    "Streptococcus pneumoniae",
    "Candida albicans",
    NO_GROWTH,
];

const GRAM_NEGATIVES: [&str; 3] = [
    "Escherichia coli",
    "Klebsiella pneumoniae",
    "Pseudomonas aeruginosa",
];

/// Antibiotics and the organisms each is tested against.
const PANEL: [(&str, &[&str]); 7] = [
    (
        "Vancomycin",
        &[
            "Staphylococcus aureus",
            "Enterococcus faecalis",
            "Streptococcus pneumoniae",
        ],
    ),
    (
        "Ceftriaxone",
        &[
            "Escherichia coli",
            "Klebsiella pneumoniae",
            "Streptococcus pneumoniae",
        ],
    ),
    ("Ciprofloxacin", &GRAM_NEGATIVES),
    ("Piperacillin-Tazobactam", &GRAM_NEGATIVES),
    ("Meropenem", &GRAM_NEGATIVES),
    (
        "Gentamicin",
        &[
            "Escherichia coli",
            "Klebsiella pneumoniae",
            "Pseudomonas aeruginosa",
            "Enterococcus faecalis",
        ],
    ),
    ("Fluconazole", &["Candida albicans"]),
];

const MIC_VALUES: [&str; 6] = ["<=0.5", "1", "2", "4", "8", ">16"];

/// A culture; parent of its susceptibility rows.
#[derive(Debug, Clone)]
pub(crate) struct Culture {
    pub id: String,
    pub hospitalization_id: String,
    pub organism: &'static str,
    pub span: Span,
}

impl Culture {
    pub fn is_positive(&self) -> bool {
        self.organism != NO_GROWTH
    }
}

impl Parent for Culture {
    fn key_column(&self) -> &'static str {
        "culture_id"
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn span(&self) -> Span {
        self.span
    }

    fn child(&self) -> Record {
        Record::new()
            .with("culture_id", &self.id)
            .with("hospitalization_id", &self.hospitalization_id)
    }
}

pub fn cultures<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<(TableBuilder, Vec<Culture>), GenerationError> {
    let mut ids = IdSequence::new(CULTURE_ID, 1);
    let mut table = TableBuilder::new(schema::microbiology_culture());
    let mut cultures = Vec::new();

    for stay in stays.iter().filter(|stay| stay.care.culture) {
        let stay_minutes = stay.span.duration().num_minutes().max(0);
        for _ in 0..rng.random_range(1..=4) {
            let order = stay.span.at(Duration::minutes(rng.random_range(0..=stay_minutes)));
            let collect = stay.clamp(order + Duration::minutes(30));
            let result = stay.clamp(collect + Duration::hours(rng.random_range(24..=71)));
            let specimen = SPECIMENS[rng.random_range(0..SPECIMENS.len())];
            let organism = ORGANISMS[rng.random_range(0..ORGANISMS.len())];
            let culture = Culture {
                id: ids.next_id(),
                hospitalization_id: stay.id.clone(),
                organism,
                span: Span::new(order, result),
            };
            let growth = if culture.is_positive() { "Positive" } else { "Negative" };
            table.push(
                stay.child()
                    .with("culture_id", &culture.id)
                    .with("order_dttm", order)
                    .with("collect_dttm", collect)
                    .with("result_dttm", result)
                    .with("specimen_type", specimen)
                    .with("organism", organism)
                    .with("growth", growth),
            );
            cultures.push(culture);
        }
    }
    Ok((table, cultures))
}

/// One row per relevant antibiotic for every positive culture.
pub fn sensitivity<R: Rng + ?Sized>(
    cultures: &[Culture],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let results = Categorical::new(
        Site::new(SENSITIVITY, "sensitivity"),
        vec![
            (("S", "Susceptible"), 0.7),
            (("I", "Intermediate"), 0.2),
            (("R", "Resistant"), 0.1),
        ],
    )?;
    let mut table = TableBuilder::new(schema::sensitivity());
    for culture in cultures.iter().filter(|culture| culture.is_positive()) {
        for (antibiotic, organisms) in PANEL {
            if !organisms.contains(&culture.organism) {
                continue;
            }
            let (code, interpretation) = results.pick_copied(rng);
            let mic = MIC_VALUES.choose(rng).copied().unwrap_or(MIC_VALUES[0]);
            table.push(
                culture
                    .child()
                    .with("antibiotic", antibiotic)
                    .with("sensitivity", code)
                    .with("mic", mic)
                    .with("interpretation", interpretation),
            );
        }
    }
    Ok(table)
}

struct RapidTest {
    component: &'static str,
    specimen: &'static str,
}

const RAPID_TESTS: [RapidTest; 6] = [
    RapidTest {
        component: "SARS-CoV-2 RNA",
        specimen: "Nasopharyngeal swab",
    },
    RapidTest {
        component: "Influenza A/B RNA",
        specimen: "Nasopharyngeal swab",
    },
    RapidTest {
        component: "C. difficile toxin",
        specimen: "Stool",
    },
    RapidTest {
        component: "Multiple pathogens",
        specimen: "Nasopharyngeal swab",
    },
    RapidTest {
        component: "Legionella antigen",
        specimen: "Urine",
    },
    RapidTest {
        component: "S. pneumoniae antigen",
        specimen: "Urine",
    },
];

pub fn non_culture<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let outcomes = Categorical::new(
        Site::new(MICROBIOLOGY_NON_CULTURE, "result_category"),
        vec![
            ("Positive", 0.1),
            ("Negative", 0.7),
            ("Detected", 0.1),
            ("Not Detected", 0.1),
        ],
    )?;
    let mut table = TableBuilder::new(schema::microbiology_non_culture());
    for stay in stays.iter().filter(|stay| stay.care.non_culture) {
        let count = rng.random_range(1..=3);
        for test in RAPID_TESTS.choose_multiple(rng, count) {
            let order = stay.span.at(Duration::hours(rng.random_range(0..=23)));
            let collect = stay.clamp(order + Duration::minutes(15));
            let result = stay.clamp(collect + Duration::hours(rng.random_range(1..=5)));
            table.push(
                stay.child()
                    .with("order_dttm", order)
                    .with("collect_dttm", collect)
                    .with("result_dttm", result)
                    .with("fluid_name", test.specimen)
                    .with("component_category", test.component)
                    .with("result_unit_category", "Qualitative")
                    .with("result_category", outcomes.pick_copied(rng)),
            );
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::super::CarePlan;
    use super::*;

    fn culture(organism: &'static str) -> Culture {
        let at = NaiveDate::from_ymd_opt(2024, 2, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid timestamp");
        Culture {
            id: CULTURE_ID.format(1),
            hospitalization_id: "H00001000".to_string(),
            organism,
            span: Span::new(at, at + Duration::hours(30)),
        }
    }

    #[test]
    fn panels_follow_the_organism() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let table = sensitivity(&[culture("Candida albicans")], &mut rng).expect("panel");
        assert_eq!(table.len(), 1);
        let table = sensitivity(&[culture("Escherichia coli")], &mut rng).expect("panel");
        assert_eq!(table.len(), 5);
        let table = sensitivity(&[culture(NO_GROWTH)], &mut rng).expect("panel");
        assert!(table.is_empty());
    }

    #[test]
    fn culture_times_stay_in_the_hospitalization() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let start = NaiveDate::from_ymd_opt(2024, 2, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid timestamp");
        let stay = Hospitalization {
            id: "H00001000".to_string(),
            patient_id: "P000001".to_string(),
            span: Span::new(start, start + Duration::hours(40)),
            expired: false,
            age: 70,
            care: CarePlan {
                culture: true,
                ..CarePlan::default()
            },
        };
        let (_, cultures) = cultures(std::slice::from_ref(&stay), &mut rng).expect("cultures");
        assert!((1..=4).contains(&cultures.len()));
        for culture in &cultures {
            assert!(stay.span.contains(culture.span.start));
            assert!(stay.span.contains(culture.span.end));
        }
    }
}
