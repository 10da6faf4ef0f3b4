//! Standardized clinical data model layout.
//!
//! Rendered from the hospital-admission cohort: with the same seed both
//! layouts describe the same people, visits and events. Vocabulary
//! concepts that would need a full terminology service are written as `0`
//! next to their source values.

use std::collections::HashMap;

use chrono::Datelike;
use rand::Rng;

use icusynth_core::{GeneratorConfig, IdFormat, IdSequence, Record, TableSchema, Value};

use super::format_b::cohort::{self, Cohort, ROUTE_IV};
use crate::assembler::{RecordAssembler, TableBuilder};
use crate::errors::GenerationError;
use crate::model::StatisticCheck;
use crate::stats::rate;
use crate::variants::VariantOutput;

pub const PERSON: &str = "person";
pub const VISIT_OCCURRENCE: &str = "visit_occurrence";
pub const CONDITION_OCCURRENCE: &str = "condition_occurrence";
pub const MEASUREMENT: &str = "measurement";
pub const DRUG_EXPOSURE: &str = "drug_exposure";
pub const PROCEDURE_OCCURRENCE: &str = "procedure_occurrence";

pub const PERSON_ID: IdFormat = IdFormat::new("PER", 7);
pub const VISIT_ID: IdFormat = IdFormat::new("VO", 9);
const CONDITION_ID: IdFormat = IdFormat::new("CO", 9);
const MEASUREMENT_ID: IdFormat = IdFormat::new("ME", 9);
const DRUG_EXPOSURE_ID: IdFormat = IdFormat::new("DE", 9);
const PROCEDURE_ID: IdFormat = IdFormat::new("PO", 9);

const INPATIENT_VISIT: i64 = 9201;
const VISIT_FROM_EHR: i64 = 44818517;
const EHR_DIAGNOSIS: i64 = 32817;
const LAB_RESULT: i64 = 44818702;
const PRESCRIPTION_WRITTEN: i64 = 38000177;
const PROCEDURE_FROM_EHR: i64 = 38000275;
const UNMAPPED: i64 = 0;

const DIED_CONCEPT: i64 = 4216643;

fn gender_concept(gender: &str) -> i64 {
    match gender {
        "M" => 8507,
        "F" => 8532,
        _ => UNMAPPED,
    }
}

/// Hispanic is an ethnicity, not a race; it carries no race concept.
fn race_concept(ethnicity: &str) -> i64 {
    match ethnicity {
        "WHITE" => 8527,
        "BLACK" => 8516,
        "ASIAN" => 8515,
        _ => UNMAPPED,
    }
}

fn ethnicity_concept(ethnicity: &str) -> i64 {
    match ethnicity {
        "HISPANIC" => 38003563,
        "OTHER" => UNMAPPED,
        _ => 38003564,
    }
}

fn discharge_concept(location: &str) -> i64 {
    match location {
        "HOME" => 8536,
        cohort::DIED => DIED_CONCEPT,
        "SNF" => 8863,
        "REHAB" => 8920,
        _ => UNMAPPED,
    }
}

fn route_concept(route: &str) -> i64 {
    if route == ROUTE_IV { 4132161 } else { 4132636 }
}

const PERSON_KEY: &str = "person_id";
const VISIT_KEY: &str = "visit_occurrence_id";
const VISIT_START: &str = "visit_start_datetime";
const VISIT_END: &str = "visit_end_datetime";

/// Event table owned by a person and a visit.
fn visit_child(name: &str, columns: &[&str], timestamps: &[&str]) -> TableSchema {
    timestamps.iter().fold(
        TableSchema::new(name, columns)
            .references(PERSON_KEY, PERSON, PERSON_KEY)
            .references(VISIT_KEY, VISIT_OCCURRENCE, VISIT_KEY),
        |schema, column| schema.within(column, VISIT_KEY, VISIT_START, VISIT_END),
    )
}

pub fn person() -> TableSchema {
    TableSchema::new(
        PERSON,
        &[
            PERSON_KEY,
            "gender_concept_id",
            "year_of_birth",
            "race_concept_id",
            "ethnicity_concept_id",
            "person_source_value",
            "gender_source_value",
            "race_source_value",
        ],
    )
    .primary_key(PERSON_KEY)
}

pub fn visit_occurrence() -> TableSchema {
    TableSchema::new(
        VISIT_OCCURRENCE,
        &[
            VISIT_KEY,
            PERSON_KEY,
            "visit_concept_id",
            "visit_start_date",
            VISIT_START,
            "visit_end_date",
            VISIT_END,
            "visit_type_concept_id",
            "discharge_to_concept_id",
            "visit_source_value",
        ],
    )
    .primary_key(VISIT_KEY)
    .references(PERSON_KEY, PERSON, PERSON_KEY)
    .spanning(VISIT_START, VISIT_END)
}

pub fn condition_occurrence() -> TableSchema {
    visit_child(
        CONDITION_OCCURRENCE,
        &[
            "condition_occurrence_id",
            PERSON_KEY,
            "condition_concept_id",
            "condition_start_date",
            "condition_start_datetime",
            "condition_type_concept_id",
            "condition_source_value",
            VISIT_KEY,
        ],
        &["condition_start_datetime"],
    )
    .primary_key("condition_occurrence_id")
}

pub fn measurement() -> TableSchema {
    visit_child(
        MEASUREMENT,
        &[
            "measurement_id",
            PERSON_KEY,
            "measurement_concept_id",
            "measurement_date",
            "measurement_datetime",
            "measurement_type_concept_id",
            "value_as_number",
            "unit_concept_id",
            "unit_source_value",
            "measurement_source_value",
            VISIT_KEY,
        ],
        &["measurement_datetime"],
    )
    .primary_key("measurement_id")
}

pub fn drug_exposure() -> TableSchema {
    visit_child(
        DRUG_EXPOSURE,
        &[
            "drug_exposure_id",
            PERSON_KEY,
            "drug_concept_id",
            "drug_exposure_start_date",
            "drug_exposure_start_datetime",
            "drug_exposure_end_date",
            "drug_exposure_end_datetime",
            "drug_type_concept_id",
            "quantity",
            "route_concept_id",
            "drug_source_value",
            "route_source_value",
            VISIT_KEY,
        ],
        &["drug_exposure_start_datetime", "drug_exposure_end_datetime"],
    )
    .primary_key("drug_exposure_id")
    .spanning("drug_exposure_start_datetime", "drug_exposure_end_datetime")
}

pub fn procedure_occurrence() -> TableSchema {
    visit_child(
        PROCEDURE_OCCURRENCE,
        &[
            "procedure_occurrence_id",
            PERSON_KEY,
            "procedure_concept_id",
            "procedure_date",
            "procedure_datetime",
            "procedure_type_concept_id",
            "procedure_source_value",
            VISIT_KEY,
        ],
        &["procedure_datetime"],
    )
    .primary_key("procedure_occurrence_id")
}

/// Every table, parents first.
pub fn schemas() -> Vec<TableSchema> {
    vec![
        person(),
        visit_occurrence(),
        condition_occurrence(),
        measurement(),
        drug_exposure(),
        procedure_occurrence(),
    ]
}

/// Source identifiers of the cohort mapped to person and visit keys.
struct Keys {
    persons: HashMap<String, String>,
    visits: HashMap<String, String>,
}

impl Keys {
    fn new(cohort: &Cohort) -> Self {
        Self {
            persons: cohort
                .subjects
                .iter()
                .map(|subject| (subject.id.clone(), PERSON_ID.format(subject.number)))
                .collect(),
            visits: cohort
                .admissions
                .iter()
                .map(|admission| (admission.id.clone(), VISIT_ID.format(admission.number)))
                .collect(),
        }
    }

    /// Person and visit columns for an event of `subject_id` during `hadm_id`.
    /// Unknown sources render empty and fail the integrity check.
    fn event(&self, subject_id: &str, hadm_id: &str) -> Record {
        Record::new()
            .with(PERSON_KEY, self.persons.get(subject_id))
            .with(VISIT_KEY, self.visits.get(hadm_id))
    }
}

pub fn build<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<VariantOutput, GenerationError> {
    let cohort = cohort::build_cohort(config, rng)?;
    let keys = Keys::new(&cohort);
    let mut assembler = RecordAssembler::new("format_c");
    assembler.commit(persons(config, &cohort, &keys));
    assembler.commit(visits(&cohort, &keys));
    assembler.commit(conditions(&cohort, &keys));
    assembler.commit(measurements(&cohort, &keys));
    assembler.commit(drug_exposures(&cohort, &keys));
    assembler.commit(procedure_occurrences(&cohort, &keys));
    let dataset = assembler.finish()?;

    let died = cohort
        .admissions
        .iter()
        .filter(|admission| discharge_concept(admission.discharge_location) == DIED_CONCEPT)
        .count();
    let statistics = vec![StatisticCheck::new(
        "mortality_rate",
        cohort::expected_mortality(&config.format_b.conditions),
        rate(died, cohort.admissions.len()),
    )];
    Ok(VariantOutput {
        dataset,
        statistics,
    })
}

fn persons(config: &GeneratorConfig, cohort: &Cohort, keys: &Keys) -> TableBuilder {
    let mut table = TableBuilder::new(person());
    for subject in &cohort.subjects {
        table.push(
            Record::new()
                .with(PERSON_KEY, keys.persons.get(&subject.id))
                .with("gender_concept_id", gender_concept(subject.gender))
                .with(
                    "year_of_birth",
                    i64::from(config.base_date.year()) - subject.age,
                )
                .with("race_concept_id", race_concept(subject.ethnicity))
                .with("ethnicity_concept_id", ethnicity_concept(subject.ethnicity))
                .with("person_source_value", &subject.id)
                .with("gender_source_value", subject.gender)
                .with("race_source_value", subject.ethnicity),
        );
    }
    table
}

fn visits(cohort: &Cohort, keys: &Keys) -> TableBuilder {
    let mut table = TableBuilder::new(visit_occurrence());
    for admission in &cohort.admissions {
        table.push(
            keys.event(&admission.subject_id, &admission.id)
                .with("visit_concept_id", INPATIENT_VISIT)
                .with("visit_start_date", admission.span.start.date())
                .with(VISIT_START, admission.span.start)
                .with("visit_end_date", admission.span.end.date())
                .with(VISIT_END, admission.span.end)
                .with("visit_type_concept_id", VISIT_FROM_EHR)
                .with(
                    "discharge_to_concept_id",
                    discharge_concept(admission.discharge_location),
                )
                .with("visit_source_value", &admission.id),
        );
    }
    table
}

/// Conditions are dated at the start of the visit they were coded in.
fn conditions(cohort: &Cohort, keys: &Keys) -> TableBuilder {
    let starts: HashMap<&str, _> = cohort
        .admissions
        .iter()
        .map(|admission| (admission.id.as_str(), admission.span.start))
        .collect();
    let mut ids = IdSequence::new(CONDITION_ID, 1);
    let mut table = TableBuilder::new(condition_occurrence());
    for diagnosis in &cohort.diagnoses {
        let start = starts.get(diagnosis.hadm_id.as_str()).copied();
        table.push(
            keys.event(&diagnosis.subject_id, &diagnosis.hadm_id)
                .with("condition_occurrence_id", ids.next_id())
                .with("condition_concept_id", UNMAPPED)
                .with("condition_start_date", start.map(|at| at.date()))
                .with("condition_start_datetime", start)
                .with("condition_type_concept_id", EHR_DIAGNOSIS)
                .with("condition_source_value", &diagnosis.icd10),
        );
    }
    table
}

fn measurements(cohort: &Cohort, keys: &Keys) -> TableBuilder {
    let mut ids = IdSequence::new(MEASUREMENT_ID, 1);
    let mut table = TableBuilder::new(measurement());
    for result in &cohort.labs {
        table.push(
            keys.event(&result.subject_id, &result.hadm_id)
                .with("measurement_id", ids.next_id())
                .with("measurement_concept_id", UNMAPPED)
                .with("measurement_date", result.charttime.date())
                .with("measurement_datetime", result.charttime)
                .with("measurement_type_concept_id", LAB_RESULT)
                .with("value_as_number", Value::decimal(result.value, 2))
                .with("unit_concept_id", UNMAPPED)
                .with("unit_source_value", result.test.unit)
                .with("measurement_source_value", result.test.loinc),
        );
    }
    table
}

fn drug_exposures(cohort: &Cohort, keys: &Keys) -> TableBuilder {
    let mut ids = IdSequence::new(DRUG_EXPOSURE_ID, 1);
    let mut table = TableBuilder::new(drug_exposure());
    for prescription in &cohort.prescriptions {
        let span = prescription.span;
        table.push(
            keys.event(&prescription.subject_id, &prescription.hadm_id)
                .with("drug_exposure_id", ids.next_id())
                .with("drug_concept_id", UNMAPPED)
                .with("drug_exposure_start_date", span.start.date())
                .with("drug_exposure_start_datetime", span.start)
                .with("drug_exposure_end_date", span.end.date())
                .with("drug_exposure_end_datetime", span.end)
                .with("drug_type_concept_id", PRESCRIPTION_WRITTEN)
                .with("quantity", Value::decimal(prescription.dose, 2))
                .with("route_concept_id", route_concept(prescription.drug.route))
                .with("drug_source_value", prescription.drug.rxnorm)
                .with("route_source_value", prescription.drug.route),
        );
    }
    table
}

fn procedure_occurrences(cohort: &Cohort, keys: &Keys) -> TableBuilder {
    let mut ids = IdSequence::new(PROCEDURE_ID, 1);
    let mut table = TableBuilder::new(procedure_occurrence());
    for event in &cohort.procedures {
        table.push(
            keys.event(&event.subject_id, &event.hadm_id)
                .with("procedure_occurrence_id", ids.next_id())
                .with("procedure_concept_id", UNMAPPED)
                .with("procedure_date", event.charttime.date())
                .with("procedure_datetime", event.charttime)
                .with("procedure_type_concept_id", PROCEDURE_FROM_EHR)
                .with("procedure_source_value", event.procedure.icd10),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::variants::format_b;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            n_patients: 20,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn mirrors_the_admission_cohort() {
        let config = config();
        let admissions = format_b::build(&config, &mut ChaCha8Rng::seed_from_u64(3))
            .expect("format b")
            .dataset
            .table(format_b::schema::ADMISSIONS)
            .map(|t| t.len());
        let output = build(&config, &mut ChaCha8Rng::seed_from_u64(3)).expect("format c");
        assert_eq!(output.dataset.tables.len(), 6);
        assert_eq!(
            output.dataset.table(VISIT_OCCURRENCE).map(|t| t.len()),
            admissions
        );
        assert_eq!(output.dataset.table(PERSON).map(|t| t.len()), Some(20));
    }

    #[test]
    fn concept_lookups() {
        assert_eq!(race_concept("HISPANIC"), 0);
        assert_eq!(ethnicity_concept("HISPANIC"), 38003563);
        assert_eq!(ethnicity_concept("WHITE"), 38003564);
        assert_eq!(discharge_concept("DIED"), 4216643);
        assert_eq!(route_concept("IV"), 4132161);
        assert_eq!(route_concept("PO"), 4132636);
        assert_eq!(gender_concept("F"), 8532);
    }

    #[test]
    fn visit_keys_follow_admission_numbers() {
        let cohort = cohort::build_cohort(&config(), &mut ChaCha8Rng::seed_from_u64(1))
            .expect("cohort");
        let keys = Keys::new(&cohort);
        let first = &cohort.admissions[0];
        assert_eq!(
            keys.visits.get(&first.id),
            Some(&VISIT_ID.format(first.number))
        );
        assert!(keys.visits.values().all(|id| id.starts_with("VO")));
    }
}
