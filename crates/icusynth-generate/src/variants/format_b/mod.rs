//! Hospital-admission schema: 8 tables keyed by subject and admission.

pub mod cohort;
pub mod schema;

use rand::Rng;

use icusynth_core::{GeneratorConfig, Record, Value};

use crate::assembler::{RecordAssembler, TableBuilder};
use crate::errors::GenerationError;
use crate::model::StatisticCheck;
use crate::stats::rate;
use crate::variants::VariantOutput;

pub use cohort::{Cohort, build_cohort, expected_mortality};

pub fn build<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<VariantOutput, GenerationError> {
    let cohort = build_cohort(config, rng)?;
    let mut assembler = RecordAssembler::new("format_b");
    assembler.commit(patients(&cohort));
    assembler.commit(admissions(&cohort));
    assembler.commit(icustays(&cohort));
    assembler.commit(diagnoses(&cohort));
    assembler.commit(vitals(&cohort));
    assembler.commit(labs(&cohort));
    assembler.commit(medications(&cohort));
    assembler.commit(procedures(&cohort));
    let dataset = assembler.finish()?;

    let septic = cohort
        .admissions
        .iter()
        .filter(|admission| {
            cohort.diagnoses.iter().any(|diagnosis| {
                diagnosis.hadm_id == admission.id
                    && config.format_b.conditions[diagnosis.condition].key == cohort::SEPSIS
            })
        })
        .count();
    let statistics = vec![
        StatisticCheck::new(
            "mortality_rate",
            expected_mortality(&config.format_b.conditions),
            rate(cohort.deaths(), cohort.admissions.len()),
        ),
        StatisticCheck::observed("sepsis_admissions", septic as f64),
        StatisticCheck::new(
            "icu_stay_rate",
            Some(config.format_b.icu_stay_rate),
            cohort.icu_stay_rate,
        ),
    ];
    Ok(VariantOutput {
        dataset,
        statistics,
    })
}

fn patients(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::patients());
    for subject in &cohort.subjects {
        table.push(
            Record::new()
                .with("subject_id", &subject.id)
                .with("gender", subject.gender)
                .with("age", subject.age)
                .with("ethnicity", subject.ethnicity)
                .with("weight", Value::decimal(subject.weight, 1))
                .with("height", Value::decimal(subject.height, 1))
                .with("dod", subject.death),
        );
    }
    table
}

fn admissions(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::admissions());
    for admission in &cohort.admissions {
        table.push(
            Record::new()
                .with("subject_id", &admission.subject_id)
                .with("hadm_id", &admission.id)
                .with("admittime", admission.span.start)
                .with("dischtime", admission.span.end)
                .with("deathtime", admission.died.then_some(admission.span.end))
                .with("admission_type", admission.admission_type)
                .with("admission_location", admission.admission_location)
                .with("discharge_location", admission.discharge_location)
                .with("insurance", admission.insurance)
                .with("language", "ENGLISH")
                .with("marital_status", admission.marital_status)
                .with("ethnicity", admission.ethnicity)
                .with("diagnosis", &admission.diagnosis)
                .with("hospital_expire_flag", i64::from(admission.died)),
        );
    }
    table
}

fn icustays(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::icustays());
    for stay in &cohort.icustays {
        table.push(
            Record::new()
                .with("subject_id", &stay.subject_id)
                .with("hadm_id", &stay.hadm_id)
                .with("icustay_id", &stay.id)
                .with("first_careunit", stay.first_careunit)
                .with("last_careunit", stay.last_careunit)
                .with("intime", stay.span.start)
                .with("outtime", stay.span.end)
                .with("los", Value::decimal(stay.span.days(), 2)),
        );
    }
    table
}

fn diagnoses(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::diagnoses());
    for diagnosis in &cohort.diagnoses {
        table.push(
            Record::new()
                .with("subject_id", &diagnosis.subject_id)
                .with("hadm_id", &diagnosis.hadm_id)
                .with("seq_num", diagnosis.seq_num)
                .with("icd10_code", &diagnosis.icd10)
                .with("description", &diagnosis.description),
        );
    }
    table
}

fn vitals(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::vitals());
    for reading in &cohort.vitals {
        table.push(
            Record::new()
                .with("subject_id", &reading.subject_id)
                .with("hadm_id", &reading.hadm_id)
                .with("icustay_id", &reading.icustay_id)
                .with("charttime", reading.charttime)
                .with("itemid", reading.sign.itemid)
                .with("label", reading.sign.label)
                .with("value", Value::decimal(reading.value, 1))
                .with("valuenum", Value::decimal(reading.value, 1))
                .with("valueuom", reading.sign.unit),
        );
    }
    table
}

fn labs(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::labs());
    for result in &cohort.labs {
        let flag = if result.is_abnormal() { "abnormal" } else { "normal" };
        table.push(
            Record::new()
                .with("subject_id", &result.subject_id)
                .with("hadm_id", &result.hadm_id)
                .with("charttime", result.charttime)
                .with("itemid", result.test.itemid)
                .with("label", result.test.label)
                .with("value", Value::decimal(result.value, 2))
                .with("valuenum", Value::decimal(result.value, 2))
                .with("valueuom", result.test.unit)
                .with("flag", flag)
                .with("loinc_code", result.test.loinc),
        );
    }
    table
}

fn medications(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::medications());
    for prescription in &cohort.prescriptions {
        let drug = prescription.drug;
        table.push(
            Record::new()
                .with("subject_id", &prescription.subject_id)
                .with("hadm_id", &prescription.hadm_id)
                .with("startdate", prescription.span.start)
                .with("enddate", prescription.span.end)
                .with("drug", drug.name)
                .with("drug_name_generic", drug.name)
                .with("rxnorm_code", drug.rxnorm)
                .with("dose_val_rx", Value::decimal(prescription.dose, 2))
                .with("dose_unit_rx", drug.unit)
                .with("route", drug.route),
        );
    }
    table
}

fn procedures(cohort: &Cohort) -> TableBuilder {
    let mut table = TableBuilder::new(schema::procedures());
    for event in &cohort.procedures {
        table.push(
            Record::new()
                .with("subject_id", &event.subject_id)
                .with("hadm_id", &event.hadm_id)
                .with("chartdate", event.charttime)
                .with("icd10_code", event.procedure.icd10)
                .with("description", event.procedure.description),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn builds_eight_clean_tables() {
        let config = GeneratorConfig {
            n_patients: 12,
            ..GeneratorConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let output = build(&config, &mut rng).expect("format b");
        assert_eq!(output.dataset.tables.len(), 8);
        assert_eq!(
            output.dataset.table(schema::PATIENTS).map(|t| t.len()),
            Some(12)
        );
        let icu = output
            .statistics
            .iter()
            .find(|s| s.name == "icu_stay_rate")
            .expect("icu statistic");
        assert_eq!(icu.target, Some(0.9));
    }

    #[test]
    fn deaths_are_flagged_on_the_admission() {
        let config = GeneratorConfig {
            n_patients: 30,
            ..GeneratorConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let output = build(&config, &mut rng).expect("format b");
        let admissions = output
            .dataset
            .table(schema::ADMISSIONS)
            .expect("admissions");
        for row in &admissions.rows {
            let died = row.get("hospital_expire_flag") == Some(&Value::Int(1));
            let deathtime = row.get("deathtime").and_then(Value::as_timestamp);
            if died {
                assert_eq!(deathtime, row.get("dischtime").and_then(Value::as_timestamp));
                assert_eq!(
                    row.get("discharge_location").and_then(Value::as_str),
                    Some(cohort::DIED)
                );
            } else {
                assert!(deathtime.is_none());
            }
        }
    }
}
