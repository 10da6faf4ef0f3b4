//! Location history, bedside measurements, labs and nursing assessments.

use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rand::seq::IndexedRandom;

use icusynth_core::{Record, Value};

use super::Hospitalization;
use super::schema::{self, ADT, LABS, PATIENT_ASSESSMENTS, VITALS};
use crate::assembler::{Parent, TableBuilder};
use crate::errors::{GenerationError, SamplingError, Site};
use crate::progression::{Dwell, Stage, StateProgression};
use crate::sampler::{BoundedSampler, Categorical, Severity, round_to};
use crate::sequencer::{IntervalPolicy, event_times};

const ICU_TYPES: [&str; 4] = ["MICU", "SICU", "CCU", "CSRU"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Ed,
    Icu,
    Stepdown,
    Ward,
}

pub fn adt<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let site = Site::new(ADT, "location_category");
    let mut table = TableBuilder::new(schema::adt());
    for stay in stays {
        let mut stages = Vec::with_capacity(4);
        if rng.random_bool(0.7) {
            stages.push(Stage::new(Location::Ed, Dwell::UniformHours { min: 2, max: 11 }));
        }
        stages.push(Stage::new(Location::Icu, Dwell::UniformDays { min: 1, max: 13 }));
        if rng.random_bool(0.3) {
            stages.push(Stage::new(Location::Stepdown, Dwell::UniformDays { min: 1, max: 2 }));
        }
        stages.push(Stage::new(Location::Ward, Dwell::UntilEnd));

        for interval in StateProgression::new(site, stages)?.run(stay.span, rng)? {
            let (name, category, location_type) = match interval.state {
                Location::Ed => (format!("ED-{}", rng.random_range(1..=19)), "ed", None),
                Location::Icu => {
                    let icu = ICU_TYPES[rng.random_range(0..ICU_TYPES.len())];
                    (format!("{icu}-{}", rng.random_range(1..=29)), "icu", Some(icu))
                }
                Location::Stepdown => {
                    (format!("Stepdown-{}", rng.random_range(1..=9)), "stepdown", None)
                }
                Location::Ward => (format!("Ward-{}", rng.random_range(1..=9)), "ward", None),
            };
            table.push(
                stay.child()
                    .with("hospital_id", "MAIN")
                    .with("hospital_type", "academic")
                    .with("in_dttm", interval.span.start)
                    .with("out_dttm", interval.span.end)
                    .with("location_name", name)
                    .with("location_category", category)
                    .with("location_type", location_type),
            );
        }
    }
    Ok(table)
}

struct VitalSign {
    name: &'static str,
    category: &'static str,
    sampler: BoundedSampler,
    /// Mean shift during a severe cycle.
    severe_shift: f64,
    decimals: u32,
}

impl VitalSign {
    const fn new(
        name: &'static str,
        category: &'static str,
        sampler: BoundedSampler,
        severe_shift: f64,
        decimals: u32,
    ) -> Self {
        Self {
            name,
            category,
            sampler,
            severe_shift,
            decimals,
        }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R, severe: bool) -> Result<f64, SamplingError> {
        let severity = severe.then_some(Severity::shift(self.severe_shift));
        let value = self.sampler.sample_with(rng, severity)?;
        let value = if self.decimals == 0 {
            value.trunc()
        } else {
            round_to(value, self.decimals)
        };
        Ok(value.clamp(self.sampler.lo, self.sampler.hi))
    }
}

const VALUE: Site = Site::new(VITALS, "vital_value");

const HEIGHT: VitalSign = VitalSign::new(
    "HEIGHT CM",
    "height_cm",
    BoundedSampler::normal(VALUE, 170.0, 10.0, 140.0, 210.0),
    0.0,
    1,
);
const WEIGHT: VitalSign = VitalSign::new(
    "WEIGHT KG",
    "weight_kg",
    BoundedSampler::normal(VALUE, 80.0, 20.0, 40.0, 150.0),
    0.0,
    1,
);
const HEART_RATE: VitalSign = VitalSign::new(
    "HEART RATE",
    "heart_rate",
    BoundedSampler::normal(VALUE, 75.0, 15.0, 40.0, 180.0),
    15.0,
    0,
);
const SBP: VitalSign = VitalSign::new(
    "SBP",
    "sbp",
    BoundedSampler::normal(VALUE, 120.0, 20.0, 70.0, 200.0),
    -10.0,
    0,
);
const DBP: VitalSign = VitalSign::new(
    "DBP",
    "dbp",
    BoundedSampler::normal(VALUE, 75.0, 15.0, 40.0, 120.0),
    -10.0,
    0,
);
const CYCLE: [VitalSign; 4] = [
    VitalSign::new(
        "TEMP C",
        "temp_c",
        BoundedSampler::normal(VALUE, 37.0, 0.5, 35.0, 40.0),
        0.5,
        1,
    ),
    VitalSign::new(
        "RESPIRATORY RATE",
        "respiratory_rate",
        BoundedSampler::normal(VALUE, 16.0, 4.0, 8.0, 40.0),
        6.0,
        0,
    ),
    VitalSign::new(
        "SPO2",
        "spo2",
        BoundedSampler::normal(VALUE, 97.0, 3.0, 85.0, 100.0),
        -4.0,
        0,
    ),
    HEART_RATE,
];

/// Hourly for the first day, then every 1, 2 or 4 hours.
fn vitals_schedule() -> IntervalPolicy {
    IntervalPolicy::Phased {
        until: Duration::hours(24),
        early: Box::new(IntervalPolicy::hours(1)),
        late: Box::new(IntervalPolicy::Weighted(vec![
            (Duration::hours(1), 0.3),
            (Duration::hours(2), 0.5),
            (Duration::hours(4), 0.2),
        ])),
    }
}

pub fn vitals<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let schedule = vitals_schedule();
    let mut table = TableBuilder::new(schema::vitals());
    for stay in stays {
        for vital in [&HEIGHT, &WEIGHT] {
            let value = vital.draw(rng, false)?;
            table.push(vital_row(stay, stay.span.start, vital, value));
        }

        for recorded in event_times(Site::new(VITALS, "recorded_dttm"), stay.span, &schedule, rng)? {
            let severe = rng.random_bool(0.3);
            for vital in &CYCLE {
                let value = vital.draw(rng, severe)?;
                table.push(vital_row(stay, recorded, vital, value));
            }
            let sbp = SBP.draw(rng, severe)?;
            let dbp = DBP.draw(rng, severe)?;
            table.push(vital_row(stay, recorded, &SBP, sbp));
            table.push(vital_row(stay, recorded, &DBP, dbp));
            let map = round_to((sbp + 2.0 * dbp) / 3.0, 1);
            table.push(
                stay.child()
                    .with("recorded_dttm", recorded)
                    .with("vital_name", "MEAN ARTERIAL PRESSURE")
                    .with("vital_category", "map")
                    .with("vital_value", Value::decimal(map, 1))
                    .with("meas_site_name", "arterial"),
            );
        }
    }
    Ok(table)
}

fn vital_row(
    stay: &Hospitalization,
    recorded: NaiveDateTime,
    vital: &VitalSign,
    value: f64,
) -> Record {
    stay.child()
        .with("recorded_dttm", recorded)
        .with("vital_name", vital.name)
        .with("vital_category", vital.category)
        .with("vital_value", Value::decimal(value, vital.decimals as u8))
        .with("meas_site_name", "unspecified")
}

struct LabTest {
    name: &'static str,
    unit: &'static str,
    loinc: &'static str,
    sampler: BoundedSampler,
}

impl LabTest {
    const fn new(
        name: &'static str,
        unit: &'static str,
        loinc: &'static str,
        mean: f64,
        std_dev: f64,
        lo: f64,
        hi: f64,
    ) -> Self {
        Self {
            name,
            unit,
            loinc,
            sampler: BoundedSampler::normal(Site::new(LABS, "lab_value_numeric"), mean, std_dev, lo, hi),
        }
    }
}

const LAB_TESTS: [LabTest; 11] = [
    LabTest::new("hemoglobin", "g/dL", "718-7", 12.0, 2.0, 3.0, 25.0),
    LabTest::new("wbc", "10^3/uL", "6690-2", 10.0, 5.0, 0.1, 100.0),
    LabTest::new("platelet", "10^3/uL", "777-3", 250.0, 100.0, 5.0, 1500.0),
    LabTest::new("sodium", "mmol/L", "2951-2", 140.0, 5.0, 110.0, 170.0),
    LabTest::new("potassium", "mmol/L", "2823-3", 4.0, 0.5, 1.5, 9.0),
    LabTest::new("creatinine", "mg/dL", "2160-0", 1.0, 0.5, 0.1, 20.0),
    LabTest::new("lactate", "mmol/L", "2524-7", 2.0, 1.5, 0.1, 30.0),
    LabTest::new("ph", "", "2744-1", 7.4, 0.05, 6.8, 7.8),
    LabTest::new("pco2", "mmHg", "2019-8", 40.0, 5.0, 10.0, 150.0),
    LabTest::new("po2", "mmHg", "2703-7", 90.0, 10.0, 20.0, 600.0),
    LabTest::new("bicarbonate", "mmol/L", "2028-3", 24.0, 3.0, 5.0, 50.0),
];

const BLOOD: &str = "blood/plasma/serum";

pub fn labs<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let schedule = IntervalPolicy::UniformHours { min: 6, max: 11 };
    let mut table = TableBuilder::new(schema::labs());
    for stay in stays {
        for collect in event_times(Site::new(LABS, "lab_collect_dttm"), stay.span, &schedule, rng)? {
            let order = (collect - Duration::minutes(30)).max(stay.span.start);
            let result =
                (collect + Duration::minutes(rng.random_range(30..=119))).min(stay.span.end);
            let count = rng.random_range(4..=7);
            for test in LAB_TESTS.choose_multiple(rng, count) {
                let value = test.sampler.sample_rounded(rng, 2, None)?;
                let (specimen, specimen_category) = match test.name {
                    "ph" | "pco2" | "po2" | "bicarbonate" => ("arterial blood", BLOOD),
                    "creatinine" if rng.random_bool(0.3) => ("urine", "urine"),
                    _ => ("venous blood", BLOOD),
                };
                let upper = test.name.to_uppercase();
                table.push(
                    stay.child()
                        .with("lab_order_dttm", order)
                        .with("lab_collect_dttm", collect)
                        .with("lab_result_dttm", result)
                        .with("lab_order_name", format!("{upper} Panel"))
                        .with("lab_name", upper)
                        .with("lab_category", test.name)
                        .with("lab_value", format!("{value:.2}"))
                        .with("lab_value_numeric", Value::decimal(value, 2))
                        .with("reference_unit", test.unit)
                        .with("lab_loinc_code", test.loinc)
                        .with("lab_specimen_name", specimen)
                        .with("lab_specimen_category", specimen_category),
                );
            }
        }
    }
    Ok(table)
}

struct Scale {
    name: &'static str,
    category: &'static str,
    group: &'static str,
    min: i64,
    max: i64,
}

const GCS_EYE: Scale = Scale {
    name: "GCS Eye Opening",
    category: "gcs_eye",
    group: "Neurological",
    min: 1,
    max: 4,
};
const GCS_VERBAL: Scale = Scale {
    name: "GCS Verbal Response",
    category: "gcs_verbal",
    group: "Neurological",
    min: 1,
    max: 5,
};
const GCS_MOTOR: Scale = Scale {
    name: "GCS Motor Response",
    category: "gcs_motor",
    group: "Neurological",
    min: 1,
    max: 6,
};
const GCS_TOTAL: Scale = Scale {
    name: "GCS Total",
    category: "gcs_total",
    group: "Neurological",
    min: 3,
    max: 15,
};
const OPTIONAL_SCALES: [Scale; 3] = [
    Scale {
        name: "Richmond Agitation-Sedation Scale",
        category: "rass",
        group: "Sedation",
        min: -5,
        max: 4,
    },
    Scale {
        name: "Braden Scale",
        category: "braden_total",
        group: "Nursing Risk",
        min: 6,
        max: 23,
    },
    Scale {
        name: "Numeric Pain Scale",
        category: "pain_numeric",
        group: "Pain",
        min: 0,
        max: 10,
    },
];
const SOFA: Scale = Scale {
    name: "SOFA Score",
    category: "sofa_total",
    group: "Severity",
    min: 0,
    max: 24,
};

fn score_row(stay: &Hospitalization, at: NaiveDateTime, scale: &Scale, value: i64) -> Record {
    stay.child()
        .with("recorded_dttm", at)
        .with("assessment_name", scale.name)
        .with("assessment_category", scale.category)
        .with("assessment_group", scale.group)
        .with("numerical_value", Value::decimal(value as f64, 1))
}

/// Six organ scores of 0-4; implausible totals above 8 are redrawn in 3-6.
fn sofa_total<R: Rng + ?Sized>(organ: &Categorical<i64>, rng: &mut R) -> i64 {
    let total: i64 = (0..6).map(|_| organ.pick_copied(rng)).sum();
    if total > 8 {
        rng.random_range(3..=6)
    } else {
        total
    }
}

/// Assessments plus the first SOFA total of every stay that has one.
pub fn patient_assessments<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<(TableBuilder, Vec<f64>), GenerationError> {
    let site = Site::new(PATIENT_ASSESSMENTS, "recorded_dttm");
    let organ = Categorical::new(
        Site::new(PATIENT_ASSESSMENTS, "numerical_value"),
        vec![(0, 0.3), (1, 0.35), (2, 0.2), (3, 0.1), (4, 0.05)],
    )?;
    let mut table = TableBuilder::new(schema::patient_assessments());
    let mut admission_sofa = Vec::new();

    for stay in stays {
        for at in event_times(site, stay.span, &IntervalPolicy::hours(8), rng)? {
            let eye = rng.random_range(GCS_EYE.min..=GCS_EYE.max);
            let verbal = rng.random_range(GCS_VERBAL.min..=GCS_VERBAL.max);
            let motor = rng.random_range(GCS_MOTOR.min..=GCS_MOTOR.max);
            for (scale, value) in [
                (&GCS_EYE, eye),
                (&GCS_VERBAL, verbal),
                (&GCS_MOTOR, motor),
                (&GCS_TOTAL, eye + verbal + motor),
            ] {
                table.push(score_row(stay, at, scale, value));
            }
            for scale in &OPTIONAL_SCALES {
                if rng.random_bool(0.7) {
                    let value = rng.random_range(scale.min..=scale.max);
                    table.push(score_row(stay, at, scale, value));
                }
            }
            if rng.random_bool(0.5) {
                let outcome = if rng.random_bool(0.5) { "Pass" } else { "Fail" };
                table.push(
                    stay.child()
                        .with("recorded_dttm", at)
                        .with("assessment_name", "SAT Screen")
                        .with("assessment_category", "sat_delivery_pass_fail")
                        .with("assessment_group", "Sedation")
                        .with("categorical_value", outcome),
                );
            }
        }

        for (day, at) in event_times(site, stay.span, &IntervalPolicy::hours(24), rng)?
            .into_iter()
            .enumerate()
        {
            let total = sofa_total(&organ, rng);
            if day == 0 {
                admission_sofa.push(total as f64);
            }
            table.push(score_row(stay, at, &SOFA, total));
        }
    }
    Ok((table, admission_sofa))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn sofa_totals_stay_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let organ = Categorical::new(
            Site::new(PATIENT_ASSESSMENTS, "numerical_value"),
            vec![(0, 0.3), (1, 0.35), (2, 0.2), (3, 0.1), (4, 0.05)],
        )
        .expect("weights");
        for _ in 0..2_000 {
            let total = sofa_total(&organ, &mut rng);
            assert!((0..=8).contains(&total));
        }
    }

    #[test]
    fn severe_cycles_shift_heart_rate_up() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let trials = 5_000;
        let mut calm = 0.0;
        let mut severe = 0.0;
        for _ in 0..trials {
            calm += HEART_RATE.draw(&mut rng, false).expect("draw");
            severe += HEART_RATE.draw(&mut rng, true).expect("draw");
        }
        assert!(severe / trials as f64 > calm / trials as f64 + 10.0);
    }
}
