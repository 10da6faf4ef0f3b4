//! Hospital-admission cohort.
//!
//! The cohort is generated as typed rows first so the admission layout and
//! the clinical data model layout can render the same population. Every
//! admission draws a primary condition; the condition drives mortality,
//! lab severity, medications and procedures.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use rand::Rng;
use rand::seq::IndexedRandom;

use icusynth_core::{ConditionSpec, GeneratorConfig, IdFormat, Span};

use super::schema::{ADMISSIONS, DIAGNOSES, ICUSTAYS, LABS, MEDICATIONS, PATIENTS, VITALS};
use crate::assembler::Parent;
use crate::errors::{GenerationError, Site};
use crate::quota::QuotaTracker;
use crate::sampler::{BoundedSampler, Categorical, Severity};
use crate::sequencer::{IntervalPolicy, event_times};

pub const SUBJECT_ID: IdFormat = IdFormat::new("S", 6);
pub const HADM_ID: IdFormat = IdFormat::new("HADM", 8);
pub const ICUSTAY_ID: IdFormat = IdFormat::new("ICU", 9);

pub const DIED: &str = "DIED";
pub const SEPSIS: &str = "sepsis";

const AGE: BoundedSampler =
    BoundedSampler::normal(Site::new(PATIENTS, "age"), 65.0, 15.0, 18.0, 95.0);
const LOS_DAYS: BoundedSampler =
    BoundedSampler::gamma(Site::new(ADMISSIONS, "dischtime"), 3.0, 2.0, 1.0, 30.0);
const ICU_DAYS: BoundedSampler =
    BoundedSampler::gamma(Site::new(ICUSTAYS, "los"), 2.0, 1.5, 0.0, 30.0);
const COMORBIDITIES: BoundedSampler =
    BoundedSampler::poisson(Site::new(DIAGNOSES, "seq_num"), 2.0, 0.0, 20.0);
const FEVER: BoundedSampler =
    BoundedSampler::normal(Site::new(VITALS, "temperature"), 38.5, 0.5, 34.0, 42.0);

const FEVER_RATE: f64 = 0.3;
const LAB_ORDER_RATE: f64 = 0.7;
const GENERAL_DRUG_RATE: f64 = 0.3;
const MIN_ICU_DAYS: f64 = 0.5;

const GENDERS: [(&str, f64); 2] = [("M", 0.55), ("F", 0.45)];
const ETHNICITIES: [(&str, f64); 5] = [
    ("WHITE", 0.6),
    ("BLACK", 0.15),
    ("HISPANIC", 0.15),
    ("ASIAN", 0.05),
    ("OTHER", 0.05),
];
const ADMISSION_TYPES: [(&str, f64); 3] = [("EMERGENCY", 0.7), ("ELECTIVE", 0.2), ("URGENT", 0.1)];
const ADMISSION_LOCATIONS: [(&str, f64); 4] = [
    ("EMERGENCY ROOM", 0.6),
    ("TRANSFER FROM HOSPITAL", 0.2),
    ("CLINIC REFERRAL", 0.1),
    ("PHYSICIAN REFERRAL", 0.1),
];
const DISCHARGE_LOCATIONS: [(&str, f64); 3] = [("HOME", 0.6), ("SNF", 0.3), ("REHAB", 0.1)];
const INSURANCE: [(&str, f64); 4] = [
    ("Medicare", 0.5),
    ("Private", 0.3),
    ("Medicaid", 0.15),
    ("Self Pay", 0.05),
];
const MARITAL_STATUS: [(&str, f64); 4] = [
    ("MARRIED", 0.5),
    ("SINGLE", 0.2),
    ("WIDOWED", 0.2),
    ("DIVORCED", 0.1),
];
const CARE_UNITS: [(&str, f64); 4] = [("MICU", 0.4), ("SICU", 0.3), ("CCU", 0.2), ("CSRU", 0.1)];

#[derive(Debug, Clone)]
pub struct Subject {
    pub number: u64,
    pub id: String,
    pub gender: &'static str,
    pub age: i64,
    pub ethnicity: &'static str,
    pub weight: f64,
    pub height: f64,
    pub death: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct Admission {
    pub number: u64,
    pub id: String,
    pub subject_id: String,
    pub span: Span,
    /// Index of the primary condition in the configured condition table.
    pub condition: usize,
    pub diagnosis: String,
    pub died: bool,
    pub admission_type: &'static str,
    pub admission_location: &'static str,
    pub discharge_location: &'static str,
    pub insurance: &'static str,
    pub marital_status: &'static str,
    pub ethnicity: &'static str,
}

impl Parent for Admission {
    fn key_column(&self) -> &'static str {
        "hadm_id"
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone)]
pub struct IcuStay {
    pub id: String,
    pub subject_id: String,
    pub hadm_id: String,
    pub first_careunit: &'static str,
    pub last_careunit: &'static str,
    pub span: Span,
}

impl Parent for IcuStay {
    fn key_column(&self) -> &'static str {
        "icustay_id"
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub subject_id: String,
    pub hadm_id: String,
    pub seq_num: i64,
    pub condition: usize,
    pub icd10: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct VitalReading {
    pub subject_id: String,
    pub hadm_id: String,
    pub icustay_id: String,
    pub charttime: NaiveDateTime,
    pub sign: &'static VitalSign,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct LabResult {
    pub subject_id: String,
    pub hadm_id: String,
    pub charttime: NaiveDateTime,
    pub test: &'static LabTest,
    pub value: f64,
}

impl LabResult {
    pub fn is_abnormal(&self) -> bool {
        (self.value - self.test.mean).abs() > 2.0 * self.test.std_dev
    }
}

#[derive(Debug, Clone)]
pub struct Prescription {
    pub subject_id: String,
    pub hadm_id: String,
    pub span: Span,
    pub drug: &'static Drug,
    pub dose: f64,
}

#[derive(Debug, Clone)]
pub struct ProcedureEvent {
    pub subject_id: String,
    pub hadm_id: String,
    pub charttime: NaiveDateTime,
    pub procedure: &'static ProcedureType,
}

/// How a vital sign value is obtained each charting cycle.
#[derive(Debug, Clone, Copy)]
pub enum Reading {
    /// Sampled around a per-stay baseline shifted by `N(0, drift)`.
    Measured {
        sampler: BoundedSampler,
        drift: f64,
    },
    /// Derived from the same cycle's systolic and diastolic pressures.
    MeanArterial,
}

#[derive(Debug, Clone, Copy)]
pub struct VitalSign {
    pub label: &'static str,
    pub itemid: i64,
    pub unit: &'static str,
    pub reading: Reading,
}

const fn measured(
    label: &'static str,
    itemid: i64,
    unit: &'static str,
    mean: f64,
    std_dev: f64,
    bounds: (f64, f64),
) -> VitalSign {
    VitalSign {
        label,
        itemid,
        unit,
        reading: Reading::Measured {
            sampler: BoundedSampler::normal(
                Site::new(VITALS, label),
                mean,
                std_dev * 0.5,
                bounds.0,
                bounds.1,
            ),
            drift: std_dev * 0.3,
        },
    }
}

const SYSTOLIC: &str = "sbp";
const DIASTOLIC: &str = "dbp";
const TEMPERATURE: &str = "temperature";

/// Charted every hour of an ICU stay, in this order.
pub static VITAL_SIGNS: [VitalSign; 7] = [
    measured("heart_rate", 220045, "bpm", 80.0, 15.0, (40.0, 180.0)),
    measured(SYSTOLIC, 220179, "mmHg", 120.0, 20.0, (60.0, 220.0)),
    measured(DIASTOLIC, 220180, "mmHg", 70.0, 10.0, (30.0, 130.0)),
    VitalSign {
        label: "map",
        itemid: 220052,
        unit: "mmHg",
        reading: Reading::MeanArterial,
    },
    measured("respiratory_rate", 220210, "breaths/min", 18.0, 4.0, (6.0, 45.0)),
    measured(TEMPERATURE, 223761, "C", 37.0, 0.8, (34.0, 42.0)),
    measured("spo2", 220277, "%", 96.0, 3.0, (85.0, 100.0)),
];

#[derive(Debug, Clone, Copy)]
pub struct LabTest {
    pub label: &'static str,
    pub itemid: i64,
    pub unit: &'static str,
    pub loinc: &'static str,
    pub mean: f64,
    pub std_dev: f64,
    pub lo: f64,
    pub hi: f64,
    /// Shift applied when the admission's primary condition is sepsis.
    pub sepsis: Option<Severity>,
}

const fn lab(
    label: &'static str,
    itemid: i64,
    unit: &'static str,
    loinc: &'static str,
    moments: (f64, f64),
    bounds: (f64, f64),
) -> LabTest {
    LabTest {
        label,
        itemid,
        unit,
        loinc,
        mean: moments.0,
        std_dev: moments.1,
        lo: bounds.0,
        hi: bounds.1,
        sepsis: None,
    }
}

const fn septic(test: LabTest, severity: Severity) -> LabTest {
    LabTest {
        sepsis: Some(severity),
        ..test
    }
}

pub static LAB_TESTS: [LabTest; 9] = [
    lab("hemoglobin", 51222, "g/dL", "718-7", (12.0, 2.0), (3.0, 20.0)),
    septic(
        lab("wbc", 51301, "K/uL", "6690-2", (10.0, 5.0), (0.1, 60.0)),
        Severity::shift(5.0),
    ),
    lab("platelet", 51265, "K/uL", "777-3", (250.0, 100.0), (5.0, 900.0)),
    septic(
        lab("creatinine", 50912, "mg/dL", "2160-0", (1.0, 0.5), (0.1, 12.0)),
        Severity::shift(0.5),
    ),
    lab("bun", 51006, "mg/dL", "3094-0", (20.0, 10.0), (2.0, 150.0)),
    lab("sodium", 50983, "mEq/L", "2951-2", (140.0, 5.0), (110.0, 170.0)),
    lab("potassium", 50971, "mEq/L", "2823-3", (4.0, 0.5), (2.0, 8.0)),
    septic(
        lab("lactate", 50813, "mmol/L", "2524-7", (2.0, 1.5), (0.3, 20.0)),
        Severity::new(2.0, 4.0 / 3.0),
    ),
    lab("glucose", 50931, "mg/dL", "2345-7", (120.0, 40.0), (20.0, 600.0)),
];

#[derive(Debug, Clone, Copy)]
pub struct Drug {
    pub name: &'static str,
    pub rxnorm: &'static str,
    pub unit: &'static str,
    pub route: &'static str,
    /// Condition keys that trigger the drug; empty for general ICU drugs.
    pub indications: &'static [&'static str],
    pub dose: (f64, f64),
}

pub const ROUTE_IV: &str = "IV";
const ROUTE_PO: &str = "PO";

pub static DRUGS: [Drug; 8] = [
    Drug {
        name: "Vancomycin",
        rxnorm: "11124",
        unit: "mg/kg",
        route: ROUTE_IV,
        indications: &["sepsis", "pneumonia"],
        dose: (15.0, 20.0),
    },
    Drug {
        name: "Norepinephrine",
        rxnorm: "7512",
        unit: "mcg/kg/min",
        route: ROUTE_IV,
        indications: &["sepsis", "heart_failure"],
        dose: (0.01, 0.5),
    },
    Drug {
        name: "Piperacillin Tazobactam",
        rxnorm: "33533",
        unit: "g",
        route: ROUTE_IV,
        indications: &["sepsis", "pneumonia"],
        dose: (3.375, 4.5),
    },
    Drug {
        name: "Propofol",
        rxnorm: "8782",
        unit: "mcg/kg/min",
        route: ROUTE_PO,
        indications: &[],
        dose: (5.0, 50.0),
    },
    Drug {
        name: "Fentanyl",
        rxnorm: "4337",
        unit: "mcg/hr",
        route: ROUTE_PO,
        indications: &[],
        dose: (25.0, 200.0),
    },
    Drug {
        name: "Heparin",
        rxnorm: "5224",
        unit: "units",
        route: ROUTE_PO,
        indications: &[],
        dose: (5000.0, 10000.0),
    },
    Drug {
        name: "Insulin",
        rxnorm: "5856",
        unit: "units/hr",
        route: ROUTE_PO,
        indications: &[],
        dose: (0.5, 10.0),
    },
    Drug {
        name: "Furosemide",
        rxnorm: "4603",
        unit: "mg",
        route: ROUTE_PO,
        indications: &["heart_failure", "acute_kidney_injury"],
        dose: (20.0, 80.0),
    },
];

#[derive(Debug, Clone, Copy)]
pub struct ProcedureType {
    pub description: &'static str,
    pub icd10: &'static str,
    /// Primary condition keys the procedure is considered for.
    pub indications: &'static [&'static str],
    pub probability: f64,
}

pub static PROCEDURE_TYPES: [ProcedureType; 5] = [
    ProcedureType {
        description: "Mechanical Ventilation",
        icd10: "5A1935Z",
        indications: &["ards", "pneumonia"],
        probability: 0.3,
    },
    ProcedureType {
        description: "Central Line",
        icd10: "02HV33Z",
        indications: &["sepsis"],
        probability: 0.5,
    },
    ProcedureType {
        description: "Arterial Line",
        icd10: "02HW33Z",
        indications: &["sepsis", "heart_failure"],
        probability: 0.4,
    },
    ProcedureType {
        description: "Dialysis",
        icd10: "5A1D70Z",
        indications: &["acute_kidney_injury"],
        probability: 0.3,
    },
    ProcedureType {
        description: "Bronchoscopy",
        icd10: "0BJ08ZZ",
        indications: &["pneumonia", "ards"],
        probability: 0.2,
    },
];

/// Typed rows of one generated cohort.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    pub subjects: Vec<Subject>,
    pub admissions: Vec<Admission>,
    pub icustays: Vec<IcuStay>,
    pub diagnoses: Vec<Diagnosis>,
    pub vitals: Vec<VitalReading>,
    pub labs: Vec<LabResult>,
    pub prescriptions: Vec<Prescription>,
    pub procedures: Vec<ProcedureEvent>,
    /// Fraction of admissions that received an ICU stay.
    pub icu_stay_rate: f64,
}

impl Cohort {
    pub fn deaths(&self) -> usize {
        self.admissions.iter().filter(|a| a.died).count()
    }
}

/// Generates the whole cohort in dependency order from one random source.
pub fn build_cohort<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<Cohort, GenerationError> {
    let conditions = &config.format_b.conditions;
    let mut subjects = subjects(config, rng)?;
    let admissions = admissions(config, &mut subjects, rng)?;
    let (icustays, icu_stay_rate) = icu_stays(config, &admissions, rng)?;
    let diagnoses = diagnoses(conditions, &admissions, rng)?;
    let vitals = vitals(&icustays, rng)?;
    let labs = labs(conditions, &admissions, rng)?;
    let prescriptions = prescriptions(conditions, &admissions, &diagnoses, rng)?;
    let procedures = procedures(conditions, &admissions, rng);
    Ok(Cohort {
        subjects,
        admissions,
        icustays,
        diagnoses,
        vitals,
        labs,
        prescriptions,
        procedures,
        icu_stay_rate,
    })
}

/// Frequency-weighted in-hospital mortality the condition table implies.
pub fn expected_mortality(conditions: &[ConditionSpec]) -> Option<f64> {
    let total: f64 = conditions.iter().map(|c| c.frequency).sum();
    (total > 0.0).then(|| {
        conditions
            .iter()
            .map(|c| c.frequency * c.mortality)
            .sum::<f64>()
            / total
    })
}

/// `acute_kidney_injury` -> `Acute Kidney Injury`.
pub fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn weighted(
    site: Site,
    options: &[(&'static str, f64)],
) -> Result<Categorical<&'static str>, GenerationError> {
    Ok(Categorical::new(site, options.to_vec())?)
}

fn time_of_day<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    Duration::hours(rng.random_range(0..=23)) + Duration::minutes(rng.random_range(0..=59))
}

fn subjects<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<Vec<Subject>, GenerationError> {
    const WEIGHT: Site = Site::new(PATIENTS, "weight");
    const HEIGHT: Site = Site::new(PATIENTS, "height");
    let genders = weighted(Site::new(PATIENTS, "gender"), &GENDERS)?;
    let ethnicities = weighted(Site::new(PATIENTS, "ethnicity"), &ETHNICITIES)?;
    let mut subjects = Vec::with_capacity(config.n_patients);
    for number in 1..=config.n_patients as u64 {
        let age = AGE.sample_whole(rng)?;
        let gender = genders.pick_copied(rng);
        let ethnicity = ethnicities.pick_copied(rng);
        let weight_mean = if age < 65 { 80.0 } else { 75.0 };
        let weight = BoundedSampler::normal(WEIGHT, weight_mean, 20.0, 35.0, 200.0)
            .sample_rounded(rng, 1, None)?;
        let height_mean = if rng.random::<f64>() > 0.45 { 170.0 } else { 160.0 };
        let height = BoundedSampler::normal(HEIGHT, height_mean, 10.0, 140.0, 210.0)
            .sample_rounded(rng, 1, None)?;
        subjects.push(Subject {
            number,
            id: SUBJECT_ID.format(number),
            gender,
            age,
            ethnicity,
            weight,
            height,
            death: None,
        });
    }
    Ok(subjects)
}

/// Sequential admissions per subject. An admission ending in death is the
/// subject's last and its discharge time becomes the subject's death time.
fn admissions<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    subjects: &mut [Subject],
    rng: &mut R,
) -> Result<Vec<Admission>, GenerationError> {
    let settings = &config.format_b;
    let base = config.base_date.and_time(NaiveTime::MIN);
    let counts = Categorical::new(
        Site::new(ADMISSIONS, "hadm_id"),
        settings
            .encounter_count_weights
            .iter()
            .enumerate()
            .map(|(index, weight)| (index as u64 + 1, *weight))
            .collect(),
    )?;
    let primaries = Categorical::new(
        Site::new(ADMISSIONS, "diagnosis"),
        settings
            .conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| (index, condition.frequency))
            .collect(),
    )?;
    let types = weighted(Site::new(ADMISSIONS, "admission_type"), &ADMISSION_TYPES)?;
    let locations = weighted(Site::new(ADMISSIONS, "admission_location"), &ADMISSION_LOCATIONS)?;
    let discharges = weighted(Site::new(ADMISSIONS, "discharge_location"), &DISCHARGE_LOCATIONS)?;
    let insurance = weighted(Site::new(ADMISSIONS, "insurance"), &INSURANCE)?;
    let marital = weighted(Site::new(ADMISSIONS, "marital_status"), &MARITAL_STATUS)?;

    let mut admissions = Vec::new();
    for subject in subjects.iter_mut() {
        let mut previous_end: Option<NaiveDateTime> = None;
        for sequence in 1..=counts.pick_copied(rng) {
            let day = match previous_end {
                None => base + Duration::days(rng.random_range(0..=365)),
                Some(end) => end + Duration::days(rng.random_range(30..=180)),
            };
            let admit = day + time_of_day(rng);
            let discharge = admit + Duration::days(LOS_DAYS.sample_whole(rng)?);
            let condition = primaries.pick_copied(rng);
            let died = rng.random_bool(settings.conditions[condition].mortality);
            let number = subject.number * 1000 + sequence;

            let admission = Admission {
                number,
                id: HADM_ID.format(number),
                subject_id: subject.id.clone(),
                span: Span::new(admit, discharge),
                condition,
                diagnosis: title_case(&settings.conditions[condition].key),
                died,
                admission_type: types.pick_copied(rng),
                admission_location: locations.pick_copied(rng),
                discharge_location: if died { DIED } else { discharges.pick_copied(rng) },
                insurance: insurance.pick_copied(rng),
                marital_status: marital.pick_copied(rng),
                ethnicity: subject.ethnicity,
            };
            admissions.push(admission);
            previous_end = Some(discharge);
            if died {
                subject.death = Some(discharge);
                break;
            }
        }
    }
    Ok(admissions)
}

/// ICU stays for a quota-matched share of admissions, starting within a
/// day of admission and never outlasting it.
fn icu_stays<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    admissions: &[Admission],
    rng: &mut R,
) -> Result<(Vec<IcuStay>, f64), GenerationError> {
    let mut quota = QuotaTracker::new("icu_stay", admissions.len(), config.format_b.icu_stay_rate)?;
    let flags = quota.assign_all(rng);
    let units = weighted(Site::new(ICUSTAYS, "first_careunit"), &CARE_UNITS)?;

    let mut stays = Vec::new();
    for (admission, _) in admissions.iter().zip(flags).filter(|(_, icu)| *icu) {
        let offset = Duration::hours(rng.random_range(0..=24));
        let intime = admission.clamp(admission.span.start + offset);
        let remaining = (admission.span.end - intime).num_minutes() as f64 / 1440.0;
        let days = ICU_DAYS.sample(rng)?.min(remaining).max(MIN_ICU_DAYS);
        let outtime = admission.clamp(intime + Duration::minutes((days * 1440.0).round() as i64));
        stays.push(IcuStay {
            id: ICUSTAY_ID.format(admission.number * 10 + 1),
            subject_id: admission.subject_id.clone(),
            hadm_id: admission.id.clone(),
            first_careunit: units.pick_copied(rng),
            last_careunit: units.pick_copied(rng),
            span: Span::new(intime, outtime),
        });
    }
    Ok((stays, quota.achieved_rate()))
}

/// Primary diagnosis as sequence 1, then Poisson(2) distinct comorbidities.
fn diagnoses<R: Rng + ?Sized>(
    conditions: &[ConditionSpec],
    admissions: &[Admission],
    rng: &mut R,
) -> Result<Vec<Diagnosis>, GenerationError> {
    let mut diagnoses = Vec::new();
    for admission in admissions {
        let diagnosis = |seq_num: i64, condition: usize| Diagnosis {
            subject_id: admission.subject_id.clone(),
            hadm_id: admission.id.clone(),
            seq_num,
            condition,
            icd10: conditions[condition].icd10.clone(),
            description: title_case(&conditions[condition].key),
        };
        diagnoses.push(diagnosis(1, admission.condition));

        let others: Vec<usize> = (0..conditions.len())
            .filter(|index| *index != admission.condition)
            .collect();
        let count = (COMORBIDITIES.sample_whole(rng)? as usize).min(others.len());
        for (offset, condition) in others.choose_multiple(rng, count).enumerate() {
            diagnoses.push(diagnosis(offset as i64 + 2, *condition));
        }
    }
    Ok(diagnoses)
}

/// Hourly charting over every ICU stay.
fn vitals<R: Rng + ?Sized>(
    stays: &[IcuStay],
    rng: &mut R,
) -> Result<Vec<VitalReading>, GenerationError> {
    let mut readings = Vec::new();
    for stay in stays {
        let mut baselines = Vec::with_capacity(VITAL_SIGNS.len());
        for sign in &VITAL_SIGNS {
            let shift = match sign.reading {
                Reading::Measured { sampler, drift } => {
                    BoundedSampler::normal(sampler.site, 0.0, drift, -3.0 * drift, 3.0 * drift)
                        .sample(rng)?
                }
                Reading::MeanArterial => 0.0,
            };
            baselines.push(Severity::shift(shift));
        }

        let times = event_times(
            Site::new(VITALS, "charttime"),
            stay.span,
            &IntervalPolicy::hours(1),
            rng,
        )?;
        for charttime in times {
            let mut cycle: Vec<(&str, f64)> = Vec::with_capacity(VITAL_SIGNS.len());
            for (sign, baseline) in VITAL_SIGNS.iter().zip(&baselines) {
                let value = match sign.reading {
                    Reading::Measured { .. }
                        if sign.label == TEMPERATURE && rng.random_bool(FEVER_RATE) =>
                    {
                        FEVER.sample_rounded(rng, 1, None)?
                    }
                    Reading::Measured { sampler, .. } => {
                        sampler.sample_rounded(rng, 1, Some(*baseline))?
                    }
                    Reading::MeanArterial => mean_arterial(&cycle),
                };
                cycle.push((sign.label, value));
                readings.push(VitalReading {
                    subject_id: stay.subject_id.clone(),
                    hadm_id: stay.hadm_id.clone(),
                    icustay_id: stay.id.clone(),
                    charttime,
                    sign,
                    value,
                });
            }
        }
    }
    Ok(readings)
}

fn mean_arterial(cycle: &[(&str, f64)]) -> f64 {
    let pressure = |label: &str| {
        cycle
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, value)| *value)
            .unwrap_or_default()
    };
    let map = (pressure(SYSTOLIC) + 2.0 * pressure(DIASTOLIC)) / 3.0;
    (map * 10.0).round() / 10.0
}

/// Lab panels every 6, 8 or 12 hours; each test is ordered 70 % of the time.
fn labs<R: Rng + ?Sized>(
    conditions: &[ConditionSpec],
    admissions: &[Admission],
    rng: &mut R,
) -> Result<Vec<LabResult>, GenerationError> {
    let policy = IntervalPolicy::Weighted(vec![
        (Duration::hours(6), 1.0),
        (Duration::hours(8), 1.0),
        (Duration::hours(12), 1.0),
    ]);
    let mut results = Vec::new();
    for admission in admissions {
        let septic = conditions[admission.condition].key == SEPSIS;
        let times = event_times(Site::new(LABS, "charttime"), admission.span, &policy, rng)?;
        for charttime in times {
            for test in &LAB_TESTS {
                if !rng.random_bool(LAB_ORDER_RATE) {
                    continue;
                }
                let sampler = BoundedSampler::normal(
                    Site::new(LABS, test.label),
                    test.mean,
                    test.std_dev,
                    test.lo,
                    test.hi,
                );
                let severity = if septic { test.sepsis } else { None };
                results.push(LabResult {
                    subject_id: admission.subject_id.clone(),
                    hadm_id: admission.id.clone(),
                    charttime,
                    test,
                    value: sampler.sample_rounded(rng, 2, severity)?,
                });
            }
        }
    }
    Ok(results)
}

/// Condition drugs for every matching diagnosis, general drugs at 30 %.
fn prescriptions<R: Rng + ?Sized>(
    conditions: &[ConditionSpec],
    admissions: &[Admission],
    diagnoses: &[Diagnosis],
    rng: &mut R,
) -> Result<Vec<Prescription>, GenerationError> {
    let mut keys: HashMap<&str, Vec<&str>> = HashMap::new();
    for diagnosis in diagnoses {
        keys.entry(diagnosis.hadm_id.as_str())
            .or_default()
            .push(conditions[diagnosis.condition].key.as_str());
    }

    let mut prescriptions = Vec::new();
    for admission in admissions {
        let diagnosed = keys.get(admission.id.as_str()).map(Vec::as_slice).unwrap_or_default();
        for drug in &DRUGS {
            let give = if drug.indications.is_empty() {
                rng.random_bool(GENERAL_DRUG_RATE)
            } else {
                drug.indications.iter().any(|key| diagnosed.contains(key))
            };
            if !give {
                continue;
            }
            let (low, high) = drug.dose;
            let dose = BoundedSampler::uniform(Site::new(MEDICATIONS, "dose_val_rx"), low, high)
                .sample_rounded(rng, 2, None)?;
            let admit = admission.span.start;
            let start = admission.clamp(admit + Duration::hours(rng.random_range(0..=23)));
            let longest = admission.span.duration().num_days().clamp(2, 7);
            let end = admission
                .clamp(admit + Duration::days(rng.random_range(1..longest)))
                .max(start);
            prescriptions.push(Prescription {
                subject_id: admission.subject_id.clone(),
                hadm_id: admission.id.clone(),
                span: Span::new(start, end),
                drug,
                dose,
            });
        }
    }
    Ok(prescriptions)
}

/// Procedures indicated by the primary condition, charted within 48 hours.
fn procedures<R: Rng + ?Sized>(
    conditions: &[ConditionSpec],
    admissions: &[Admission],
    rng: &mut R,
) -> Vec<ProcedureEvent> {
    let mut events = Vec::new();
    for admission in admissions {
        let primary = conditions[admission.condition].key.as_str();
        for procedure in &PROCEDURE_TYPES {
            if !procedure.indications.contains(&primary) {
                continue;
            }
            if !rng.random_bool(procedure.probability) {
                continue;
            }
            let offset = Duration::hours(rng.random_range(0..=47));
            events.push(ProcedureEvent {
                subject_id: admission.subject_id.clone(),
                hadm_id: admission.id.clone(),
                charttime: admission.clamp(admission.span.start + offset),
                procedure,
            });
        }
    }
    events
}
