//! Table layouts of the hospital-admission schema.

use icusynth_core::TableSchema;

pub const PATIENTS: &str = "patients";
pub const ADMISSIONS: &str = "admissions";
pub const ICUSTAYS: &str = "icustays";
pub const DIAGNOSES: &str = "diagnoses";
pub const VITALS: &str = "vitals";
pub const LABS: &str = "labs";
pub const MEDICATIONS: &str = "medications";
pub const PROCEDURES: &str = "procedures";

const SUBJECT_ID: &str = "subject_id";
const HADM_ID: &str = "hadm_id";
const ICUSTAY_ID: &str = "icustay_id";

/// Child of `admissions` keyed by subject and admission.
fn admission_child(name: &str, columns: &[&str]) -> TableSchema {
    TableSchema::new(name, columns)
        .references(SUBJECT_ID, PATIENTS, SUBJECT_ID)
        .references(HADM_ID, ADMISSIONS, HADM_ID)
}

pub fn patients() -> TableSchema {
    TableSchema::new(
        PATIENTS,
        &[SUBJECT_ID, "gender", "age", "ethnicity", "weight", "height", "dod"],
    )
    .primary_key(SUBJECT_ID)
}

pub fn admissions() -> TableSchema {
    TableSchema::new(
        ADMISSIONS,
        &[
            SUBJECT_ID,
            HADM_ID,
            "admittime",
            "dischtime",
            "deathtime",
            "admission_type",
            "admission_location",
            "discharge_location",
            "insurance",
            "language",
            "marital_status",
            "ethnicity",
            "diagnosis",
            "hospital_expire_flag",
        ],
    )
    .primary_key(HADM_ID)
    .references(SUBJECT_ID, PATIENTS, SUBJECT_ID)
    .spanning("admittime", "dischtime")
}

pub fn icustays() -> TableSchema {
    admission_child(
        ICUSTAYS,
        &[
            SUBJECT_ID,
            HADM_ID,
            ICUSTAY_ID,
            "first_careunit",
            "last_careunit",
            "intime",
            "outtime",
            "los",
        ],
    )
    .primary_key(ICUSTAY_ID)
    .within("intime", HADM_ID, "admittime", "dischtime")
    .within("outtime", HADM_ID, "admittime", "dischtime")
    .spanning("intime", "outtime")
}

pub fn diagnoses() -> TableSchema {
    admission_child(
        DIAGNOSES,
        &[SUBJECT_ID, HADM_ID, "seq_num", "icd10_code", "description"],
    )
}

pub fn vitals() -> TableSchema {
    admission_child(
        VITALS,
        &[
            SUBJECT_ID,
            HADM_ID,
            ICUSTAY_ID,
            "charttime",
            "itemid",
            "label",
            "value",
            "valuenum",
            "valueuom",
        ],
    )
    .references(ICUSTAY_ID, ICUSTAYS, ICUSTAY_ID)
    .within("charttime", ICUSTAY_ID, "intime", "outtime")
}

pub fn labs() -> TableSchema {
    admission_child(
        LABS,
        &[
            SUBJECT_ID,
            HADM_ID,
            "charttime",
            "itemid",
            "label",
            "value",
            "valuenum",
            "valueuom",
            "flag",
            "loinc_code",
        ],
    )
    .within("charttime", HADM_ID, "admittime", "dischtime")
}

pub fn medications() -> TableSchema {
    admission_child(
        MEDICATIONS,
        &[
            SUBJECT_ID,
            HADM_ID,
            "startdate",
            "enddate",
            "drug",
            "drug_name_generic",
            "rxnorm_code",
            "dose_val_rx",
            "dose_unit_rx",
            "route",
        ],
    )
    .within("startdate", HADM_ID, "admittime", "dischtime")
    .within("enddate", HADM_ID, "admittime", "dischtime")
    .spanning("startdate", "enddate")
}

pub fn procedures() -> TableSchema {
    admission_child(
        PROCEDURES,
        &[SUBJECT_ID, HADM_ID, "chartdate", "icd10_code", "description"],
    )
    .within("chartdate", HADM_ID, "admittime", "dischtime")
}

/// Every table, parents first.
pub fn all() -> Vec<TableSchema> {
    vec![
        patients(),
        admissions(),
        icustays(),
        diagnoses(),
        vitals(),
        labs(),
        medications(),
        procedures(),
    ]
}
