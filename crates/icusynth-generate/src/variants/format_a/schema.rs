//! Table layouts of the longitudinal ICU schema.

use icusynth_core::TableSchema;

pub const PATIENT: &str = "patient";
pub const HOSPITALIZATION: &str = "hospitalization";
pub const ADT: &str = "adt";
pub const VITALS: &str = "vitals";
pub const LABS: &str = "labs";
pub const PATIENT_ASSESSMENTS: &str = "patient_assessments";
pub const RESPIRATORY_SUPPORT: &str = "respiratory_support";
pub const MEDICATION_ORDERS: &str = "medication_orders";
pub const MEDICATION_ADMIN_CONTINUOUS: &str = "medication_admin_continuous";
pub const MEDICATION_ADMIN_INTERMITTENT: &str = "medication_admin_intermittent";
pub const CRRT_THERAPY: &str = "crrt_therapy";
pub const ECMO_MCS: &str = "ecmo_mcs";
pub const POSITION: &str = "position";
pub const PROCEDURES: &str = "procedures";
pub const INTAKE_OUTPUT: &str = "intake_output";
pub const MICROBIOLOGY_CULTURE: &str = "microbiology_culture";
pub const SENSITIVITY: &str = "sensitivity";
pub const MICROBIOLOGY_NON_CULTURE: &str = "microbiology_non_culture";
pub const ADMISSION_DIAGNOSIS: &str = "admission_diagnosis";
pub const CODE_STATUS: &str = "code_status";
pub const PROVIDER: &str = "provider";
pub const THERAPY_SESSION: &str = "therapy_session";
pub const THERAPY_DETAILS: &str = "therapy_details";

const HOSP_ID: &str = "hospitalization_id";
const ADMIT: &str = "admission_dttm";
const DISCHARGE: &str = "discharge_dttm";

/// Child of `hospitalization` whose listed timestamps fall in the stay.
fn encounter_child(name: &str, columns: &[&str], timestamps: &[&str]) -> TableSchema {
    timestamps.iter().fold(
        TableSchema::new(name, columns).references(HOSP_ID, HOSPITALIZATION, HOSP_ID),
        |schema, column| schema.within(column, HOSP_ID, ADMIT, DISCHARGE),
    )
}

pub fn patient() -> TableSchema {
    TableSchema::new(
        PATIENT,
        &[
            "patient_id",
            "race_name",
            "race_category",
            "ethnicity_name",
            "ethnicity_category",
            "sex_name",
            "sex_category",
            "birth_date",
            "death_dttm",
            "language_name",
            "language_category",
        ],
    )
    .primary_key("patient_id")
}

pub fn hospitalization() -> TableSchema {
    TableSchema::new(
        HOSPITALIZATION,
        &[
            "patient_id",
            HOSP_ID,
            "hospitalization_joined_id",
            ADMIT,
            DISCHARGE,
            "age_at_admission",
            "admission_type_name",
            "admission_type_category",
            "discharge_name",
            "discharge_category",
            "zipcode_five_digit",
            "zipcode_nine_digit",
            "census_block_group_code",
            "latitude",
            "longitude",
        ],
    )
    .primary_key(HOSP_ID)
    .references("patient_id", PATIENT, "patient_id")
    .spanning(ADMIT, DISCHARGE)
}

pub fn adt() -> TableSchema {
    encounter_child(
        ADT,
        &[
            HOSP_ID,
            "hospital_id",
            "hospital_type",
            "in_dttm",
            "out_dttm",
            "location_name",
            "location_category",
            "location_type",
        ],
        &["in_dttm", "out_dttm"],
    )
    .spanning("in_dttm", "out_dttm")
}

pub fn vitals() -> TableSchema {
    encounter_child(
        VITALS,
        &[
            HOSP_ID,
            "recorded_dttm",
            "vital_name",
            "vital_category",
            "vital_value",
            "meas_site_name",
        ],
        &["recorded_dttm"],
    )
}

pub fn labs() -> TableSchema {
    encounter_child(
        LABS,
        &[
            HOSP_ID,
            "lab_order_dttm",
            "lab_collect_dttm",
            "lab_result_dttm",
            "lab_order_name",
            "lab_name",
            "lab_category",
            "lab_value",
            "lab_value_numeric",
            "reference_unit",
            "lab_loinc_code",
            "lab_specimen_name",
            "lab_specimen_category",
        ],
        &["lab_order_dttm", "lab_collect_dttm", "lab_result_dttm"],
    )
}

pub fn patient_assessments() -> TableSchema {
    encounter_child(
        PATIENT_ASSESSMENTS,
        &[
            HOSP_ID,
            "recorded_dttm",
            "assessment_name",
            "assessment_category",
            "assessment_group",
            "numerical_value",
            "categorical_value",
            "text_value",
        ],
        &["recorded_dttm"],
    )
}

pub fn respiratory_support() -> TableSchema {
    encounter_child(
        RESPIRATORY_SUPPORT,
        &[
            HOSP_ID,
            "recorded_dttm",
            "device_name",
            "device_category",
            "mode_name",
            "mode_category",
            "vent_brand_name",
            "tracheostomy",
            "fio2_set",
            "lpm_set",
            "tidal_volume_set",
            "resp_rate_set",
            "pressure_control_set",
            "pressure_support_set",
            "flow_rate_set",
            "peak_inspiratory_pressure_set",
            "inspiratory_time_set",
            "peep_set",
            "tidal_volume_obs",
            "resp_rate_obs",
            "plateau_pressure_obs",
            "peak_inspiratory_pressure_obs",
            "peep_obs",
            "minute_vent_obs",
            "mean_airway_pressure_obs",
        ],
        &["recorded_dttm"],
    )
}

pub fn medication_orders() -> TableSchema {
    encounter_child(
        MEDICATION_ORDERS,
        &[
            "med_order_id",
            HOSP_ID,
            "order_dttm",
            "med_name",
            "med_category",
            "med_route",
            "med_dose",
            "med_frequency",
            "start_dttm",
            "end_dttm",
        ],
        &["order_dttm", "start_dttm", "end_dttm"],
    )
    .primary_key("med_order_id")
    .spanning("start_dttm", "end_dttm")
}

pub fn medication_admin_continuous() -> TableSchema {
    encounter_child(
        MEDICATION_ADMIN_CONTINUOUS,
        &[
            HOSP_ID,
            "med_order_id",
            "admin_dttm",
            "med_name",
            "med_category",
            "med_group",
            "med_route_name",
            "med_route_category",
            "med_dose",
            "med_dose_unit",
            "mar_action_name",
            "mar_action_category",
        ],
        &["admin_dttm"],
    )
    .references("med_order_id", MEDICATION_ORDERS, "med_order_id")
    .within("admin_dttm", "med_order_id", "start_dttm", "end_dttm")
}

pub fn medication_admin_intermittent() -> TableSchema {
    encounter_child(
        MEDICATION_ADMIN_INTERMITTENT,
        &[
            HOSP_ID,
            "med_order_id",
            "admin_dttm",
            "med_name",
            "med_category",
            "med_route",
            "med_dose",
            "med_frequency",
            "mar_action",
        ],
        &["admin_dttm"],
    )
    .references("med_order_id", MEDICATION_ORDERS, "med_order_id")
    .within("admin_dttm", "med_order_id", "start_dttm", "end_dttm")
}

pub fn crrt_therapy() -> TableSchema {
    encounter_child(
        CRRT_THERAPY,
        &[
            HOSP_ID,
            "recorded_dttm",
            "crrt_mode_name",
            "crrt_mode_category",
            "dialysis_machine_name",
            "blood_flow_rate",
            "pre_filter_replacement_fluid_rate",
            "post_filter_replacement_fluid_rate",
            "dialysate_flow_rate",
            "ultrafiltration_out",
        ],
        &["recorded_dttm"],
    )
}

pub fn ecmo_mcs() -> TableSchema {
    encounter_child(
        ECMO_MCS,
        &[
            HOSP_ID,
            "recorded_dttm",
            "device_name",
            "device_category",
            "mcs_group",
            "side",
            "device_metric_name",
            "device_rate",
            "flow",
            "sweep",
            "fdo2",
        ],
        &["recorded_dttm"],
    )
}

pub fn position() -> TableSchema {
    encounter_child(
        POSITION,
        &[HOSP_ID, "recorded_dttm", "position_name", "position_category"],
        &["recorded_dttm"],
    )
}

pub fn procedures() -> TableSchema {
    encounter_child(
        PROCEDURES,
        &[
            HOSP_ID,
            "procedure_dttm",
            "procedure_name",
            "procedure_duration_minutes",
        ],
        &["procedure_dttm"],
    )
}

pub fn intake_output() -> TableSchema {
    encounter_child(
        INTAKE_OUTPUT,
        &[
            HOSP_ID,
            "recorded_dttm",
            "intake_oral",
            "intake_iv_fluids",
            "intake_medications",
            "intake_blood_products",
            "intake_total",
            "output_urine",
            "output_stool",
            "output_drainage",
            "output_blood_loss",
            "output_total",
            "net_balance",
        ],
        &["recorded_dttm"],
    )
}

pub fn microbiology_culture() -> TableSchema {
    encounter_child(
        MICROBIOLOGY_CULTURE,
        &[
            "culture_id",
            HOSP_ID,
            "order_dttm",
            "collect_dttm",
            "result_dttm",
            "specimen_type",
            "organism",
            "growth",
        ],
        &["order_dttm", "collect_dttm", "result_dttm"],
    )
    .primary_key("culture_id")
}

pub fn sensitivity() -> TableSchema {
    TableSchema::new(
        SENSITIVITY,
        &[
            "culture_id",
            HOSP_ID,
            "antibiotic",
            "sensitivity",
            "mic",
            "interpretation",
        ],
    )
    .references("culture_id", MICROBIOLOGY_CULTURE, "culture_id")
    .references(HOSP_ID, HOSPITALIZATION, HOSP_ID)
}

pub fn microbiology_non_culture() -> TableSchema {
    encounter_child(
        MICROBIOLOGY_NON_CULTURE,
        &[
            HOSP_ID,
            "order_dttm",
            "collect_dttm",
            "result_dttm",
            "fluid_name",
            "component_category",
            "result_unit_category",
            "result_category",
        ],
        &["order_dttm", "collect_dttm", "result_dttm"],
    )
}

pub fn admission_diagnosis() -> TableSchema {
    encounter_child(
        ADMISSION_DIAGNOSIS,
        &[
            HOSP_ID,
            "diagnostic_code",
            "diagnosis_code_format",
            "start_dttm",
            "end_dttm",
        ],
        &["start_dttm", "end_dttm"],
    )
}

pub fn code_status() -> TableSchema {
    encounter_child(
        CODE_STATUS,
        &[HOSP_ID, "start_dttm", "code_status_name", "code_status_category"],
        &["start_dttm"],
    )
}

pub fn provider() -> TableSchema {
    TableSchema::new(
        PROVIDER,
        &[
            HOSP_ID,
            "provider_id",
            "provider_name",
            "provider_specialty",
            "provider_role",
        ],
    )
    .references(HOSP_ID, HOSPITALIZATION, HOSP_ID)
}

pub fn therapy_session() -> TableSchema {
    encounter_child(
        THERAPY_SESSION,
        &[
            "session_id",
            HOSP_ID,
            "therapy_type",
            "session_dttm",
            "duration_minutes",
            "therapist_notes",
        ],
        &["session_dttm"],
    )
    .primary_key("session_id")
}

pub fn therapy_details() -> TableSchema {
    TableSchema::new(
        THERAPY_DETAILS,
        &[
            "session_id",
            HOSP_ID,
            "activity_name",
            "activity_duration_minutes",
            "patient_response",
            "notes",
        ],
    )
    .references("session_id", THERAPY_SESSION, "session_id")
    .references(HOSP_ID, HOSPITALIZATION, HOSP_ID)
}

/// Every table in generation order.
pub fn all() -> Vec<TableSchema> {
    vec![
        patient(),
        hospitalization(),
        adt(),
        vitals(),
        labs(),
        patient_assessments(),
        respiratory_support(),
        medication_orders(),
        medication_admin_continuous(),
        medication_admin_intermittent(),
        crrt_therapy(),
        ecmo_mcs(),
        position(),
        procedures(),
        intake_output(),
        microbiology_culture(),
        sensitivity(),
        microbiology_non_culture(),
        admission_diagnosis(),
        code_status(),
        provider(),
        therapy_session(),
        therapy_details(),
    ]
}
