//! Longitudinal ICU schema: 23 tables keyed by patient and hospitalization.
//!
//! Generation runs top-down. Patients come first, then their sequential
//! hospitalizations, then every encounter-level table. Whole-population
//! rates (ventilation, vasopressors, renal replacement and the other care
//! modalities) are assigned up front with quota trackers so the achieved
//! fractions match the configured targets exactly.

pub mod schema;

mod care;
mod medications;
mod microbiology;
mod observations;
mod population;
mod support;

use rand::Rng;

use icusynth_core::{FormatAConfig, GeneratorConfig, Span};

use crate::assembler::{Parent, RecordAssembler};
use crate::errors::GenerationError;
use crate::model::StatisticCheck;
use crate::quota::QuotaTracker;
use crate::stats::{median, rate};
use crate::variants::VariantOutput;

pub use population::{EXPIRED, HOSPITALIZATION_ID, PATIENT_ID};

/// One hospital stay; parent of every encounter-level row.
#[derive(Debug, Clone)]
pub(crate) struct Hospitalization {
    pub id: String,
    pub patient_id: String,
    pub span: Span,
    pub expired: bool,
    pub age: i64,
    pub care: CarePlan,
}

impl Parent for Hospitalization {
    fn key_column(&self) -> &'static str {
        "hospitalization_id"
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn span(&self) -> Span {
        self.span
    }
}

/// Care modalities a stay receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CarePlan {
    pub imv: bool,
    pub vasopressor: bool,
    pub crrt: bool,
    pub ecmo: bool,
    pub position: bool,
    pub culture: bool,
    pub non_culture: bool,
    pub code_status: bool,
    pub therapy: bool,
}

struct AchievedRates {
    imv: f64,
    vasopressor: f64,
}

fn assign_care<R: Rng + ?Sized>(
    settings: &FormatAConfig,
    stays: &mut [Hospitalization],
    rng: &mut R,
) -> Result<AchievedRates, GenerationError> {
    let total = stays.len();
    let mut imv = QuotaTracker::new("imv", total, settings.imv_rate)?;
    let mut vasopressor = QuotaTracker::new("vasopressor", total, settings.vasopressor_rate)?;
    let flags = [
        imv.assign_all(rng),
        vasopressor.assign_all(rng),
        QuotaTracker::new("crrt", total, settings.crrt_rate)?.assign_all(rng),
        QuotaTracker::new("ecmo", total, settings.ecmo_rate)?.assign_all(rng),
        QuotaTracker::new("position", total, settings.position_rate)?.assign_all(rng),
        QuotaTracker::new("culture", total, settings.culture_rate)?.assign_all(rng),
        QuotaTracker::new("non_culture", total, settings.non_culture_rate)?.assign_all(rng),
        QuotaTracker::new("code_status", total, settings.code_status_rate)?.assign_all(rng),
        QuotaTracker::new("therapy", total, settings.therapy_rate)?.assign_all(rng),
    ];
    for (index, stay) in stays.iter_mut().enumerate() {
        stay.care = CarePlan {
            imv: flags[0][index],
            vasopressor: flags[1][index],
            crrt: flags[2][index],
            ecmo: flags[3][index],
            position: flags[4][index],
            culture: flags[5][index],
            non_culture: flags[6][index],
            code_status: flags[7][index],
            therapy: flags[8][index],
        };
    }
    Ok(AchievedRates {
        imv: imv.achieved_rate(),
        vasopressor: vasopressor.achieved_rate(),
    })
}

pub fn build<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<VariantOutput, GenerationError> {
    let settings = &config.format_a;
    let mut assembler = RecordAssembler::new("format_a");

    let (patient_table, patients) = population::patients(config, rng)?;
    let (stay_table, mut stays) = population::hospitalizations(config, &patients, rng)?;
    let achieved = assign_care(settings, &mut stays, rng)?;
    assembler.commit(patient_table);
    assembler.commit(stay_table);

    assembler.commit(observations::adt(&stays, rng)?);
    assembler.commit(observations::vitals(&stays, rng)?);
    assembler.commit(observations::labs(&stays, rng)?);
    let (assessments, admission_sofa) = observations::patient_assessments(&stays, rng)?;
    assembler.commit(assessments);
    assembler.commit(support::respiratory_support(&stays, rng)?);

    let (order_table, orders) = medications::orders(&stays, rng)?;
    assembler.commit(order_table);
    assembler.commit(medications::continuous(&orders, rng)?);
    assembler.commit(medications::intermittent(&orders, rng)?);

    assembler.commit(support::crrt_therapy(&stays, rng)?);
    assembler.commit(support::ecmo_mcs(&stays, rng)?);
    assembler.commit(support::position(&stays, rng)?);
    assembler.commit(support::procedures(&stays, rng)?);
    assembler.commit(support::intake_output(&stays, rng)?);

    let (culture_table, cultures) = microbiology::cultures(&stays, rng)?;
    assembler.commit(culture_table);
    assembler.commit(microbiology::sensitivity(&cultures, rng)?);
    assembler.commit(microbiology::non_culture(&stays, rng)?);

    assembler.commit(care::admission_diagnosis(&stays, rng)?);
    assembler.commit(care::code_status(&stays, rng)?);
    assembler.commit(care::provider(settings, &stays, rng)?);
    let (session_table, sessions) = care::therapy_sessions(&stays, rng)?;
    assembler.commit(session_table);
    assembler.commit(care::therapy_details(&sessions, rng)?);

    let dataset = assembler.finish()?;

    let deaths = patients.iter().filter(|p| p.death.is_some()).count();
    let female = patients.iter().filter(|p| p.female).count();
    let white = patients.iter().filter(|p| p.race == "White").count();
    let hispanic = patients.iter().filter(|p| p.hispanic).count();
    let expired = stays.iter().filter(|stay| stay.expired).count();
    let los: Vec<f64> = stays.iter().map(|stay| stay.span.days()).collect();
    let ages: Vec<f64> = patients.iter().map(|p| p.age as f64).collect();

    let statistics = vec![
        StatisticCheck::new(
            "mortality_rate",
            Some(settings.mortality_rate),
            rate(deaths, patients.len()),
        ),
        StatisticCheck::new(
            "female_rate",
            Some(settings.female_rate),
            rate(female, patients.len()),
        ),
        StatisticCheck::new(
            "white_rate",
            label_share(settings, "White"),
            rate(white, patients.len()),
        ),
        StatisticCheck::new(
            "hispanic_rate",
            Some(settings.hispanic_rate),
            rate(hispanic, patients.len()),
        ),
        StatisticCheck::new("imv_rate", Some(settings.imv_rate), achieved.imv),
        StatisticCheck::new(
            "vasopressor_rate",
            Some(settings.vasopressor_rate),
            achieved.vasopressor,
        ),
        StatisticCheck::new(
            "median_los_days",
            Some(settings.target_median_los_days),
            median(&los).unwrap_or_default(),
        ),
        StatisticCheck::new(
            "median_sofa",
            Some(settings.target_median_sofa),
            median(&admission_sofa).unwrap_or_default(),
        ),
        StatisticCheck::observed("median_age", median(&ages).unwrap_or_default()),
        StatisticCheck::observed("in_hospital_mortality", rate(expired, stays.len())),
    ];

    Ok(VariantOutput {
        dataset,
        statistics,
    })
}

/// Normalized weight of one race label, if configured.
fn label_share(settings: &FormatAConfig, label: &str) -> Option<f64> {
    let total: f64 = settings.race_weights.iter().map(|w| w.weight).sum();
    settings
        .race_weights
        .iter()
        .find(|w| w.label == label)
        .map(|w| w.weight / total)
}
