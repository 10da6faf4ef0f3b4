//! Patients and their hospitalizations.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use rand::seq::index;

use icusynth_core::{
    FormatAConfig, GeneratorConfig, IdFormat, IdSequence, Record, Span, Value, WeightedLabel,
};

use super::Hospitalization;
use super::schema::{self, HOSPITALIZATION, PATIENT};
use crate::assembler::TableBuilder;
use crate::errors::{GenerationError, SamplingError, Site};
use crate::quota::QuotaTracker;
use crate::sampler::{BoundedSampler, Categorical, round_to};

pub const PATIENT_ID: IdFormat = IdFormat::new("P", 6);
pub const HOSPITALIZATION_ID: IdFormat = IdFormat::new("H", 8);
pub const JOINED_ID: IdFormat = IdFormat::new("HJ", 8);
pub const FIRST_HOSPITALIZATION: u64 = 1000;

const AGE: BoundedSampler = BoundedSampler::gamma(Site::new(PATIENT, "birth_date"), 7.5, 8.5, 18.0, 105.0);

const ADMISSION_TYPES: [&str; 4] = ["Inpatient", "ED to Inpatient", "Acute Care Transfer", "Pre-op"];
const DISCHARGES: [&str; 6] = [
    "Home",
    "SNF",
    "Acute Inpatient Rehab Facility",
    "Hospice",
    "LTACH",
    "AMA",
];
pub const EXPIRED: &str = "Expired";

#[derive(Debug, Clone)]
pub struct Patient {
    pub id: String,
    pub age: i64,
    pub birth_date: NaiveDate,
    pub death: Option<NaiveDateTime>,
    pub female: bool,
    pub race: String,
    pub hispanic: bool,
    pub language: String,
}

pub fn base_time(config: &GeneratorConfig) -> NaiveDateTime {
    config.base_date.and_time(NaiveTime::MIN)
}

/// Whole-minute offset inside a day, added to day-granular dates.
fn time_of_day<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    Duration::hours(rng.random_range(0..=23)) + Duration::minutes(rng.random_range(0..=59))
}

fn labels(site: Site, labels: &[WeightedLabel]) -> Result<Categorical<String>, SamplingError> {
    Categorical::new(
        site,
        labels
            .iter()
            .map(|label| (label.label.clone(), label.weight))
            .collect(),
    )
}

/// Relative death weight by age band; the bands above 70 carry an uplift.
fn death_weight(config: &FormatAConfig, age: i64) -> f64 {
    if age > 80 {
        config.mortality_rate_over_80
    } else if age > 70 {
        config.mortality_rate_over_70
    } else {
        config.mortality_rate
    }
}

/// Indices of the patients who die: exactly `round(mortality_rate * n)` of
/// them, drawn without replacement with older patients weighted up.
fn choose_deaths<R: Rng + ?Sized>(
    config: &FormatAConfig,
    ages: &[i64],
    rng: &mut R,
) -> Result<Vec<bool>, SamplingError> {
    let quota = QuotaTracker::new("mortality", ages.len(), config.mortality_rate)?;
    let mut dead = vec![false; ages.len()];
    if quota.target() == 0 {
        return Ok(dead);
    }
    let chosen = index::sample_weighted(
        rng,
        ages.len(),
        |i| death_weight(config, ages[i]),
        quota.target(),
    )
    .map_err(|err| SamplingError::invalid(Site::new(PATIENT, "death_dttm"), err.to_string()))?;
    for i in chosen.iter() {
        dead[i] = true;
    }
    Ok(dead)
}

pub fn patients<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<(TableBuilder, Vec<Patient>), GenerationError> {
    let settings = &config.format_a;
    let base = base_time(config);
    let races = labels(Site::new(PATIENT, "race_category"), &settings.race_weights)?;
    let languages = labels(Site::new(PATIENT, "language_category"), &settings.language_weights)?;
    let mut ids = IdSequence::new(PATIENT_ID, 1);

    let ages = (0..config.n_patients)
        .map(|_| AGE.sample_whole(rng))
        .collect::<Result<Vec<_>, _>>()?;
    let dead = choose_deaths(settings, &ages, rng)?;

    let mut table = TableBuilder::new(schema::patient());
    let mut patients = Vec::with_capacity(config.n_patients);
    for (age, dead) in ages.into_iter().zip(dead) {
        let birth_date = config.base_date - Duration::days((age as f64 * 365.25) as i64);
        let death = dead
            .then(|| base + Duration::days(rng.random_range(1..=364)) + time_of_day(rng));
        let female = rng.random_bool(settings.female_rate);
        let race = races.pick(rng).clone();
        let hispanic = rng.random_bool(settings.hispanic_rate);
        let language = languages.pick(rng).clone();

        let patient = Patient {
            id: ids.next_id(),
            age,
            birth_date,
            death,
            female,
            race,
            hispanic,
            language,
        };
        let sex = if patient.female { "Female" } else { "Male" };
        let (ethnicity_name, ethnicity_category) = if patient.hispanic {
            ("Hispanic or Latino", "Hispanic")
        } else {
            ("Not Hispanic", "Non-Hispanic")
        };
        table.push(
            Record::new()
                .with("patient_id", &patient.id)
                .with("race_name", &patient.race)
                .with("race_category", &patient.race)
                .with("ethnicity_name", ethnicity_name)
                .with("ethnicity_category", ethnicity_category)
                .with("sex_name", sex)
                .with("sex_category", sex)
                .with("birth_date", patient.birth_date)
                .with("death_dttm", patient.death)
                .with("language_name", &patient.language)
                .with("language_category", &patient.language),
        );
        patients.push(patient);
    }
    Ok((table, patients))
}

/// Sequential, non-overlapping stays per patient. A stay containing the
/// patient's death ends at the death time and is the patient's last.
pub fn hospitalizations<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    patients: &[Patient],
    rng: &mut R,
) -> Result<(TableBuilder, Vec<Hospitalization>), GenerationError> {
    let settings = &config.format_a;
    let base = base_time(config);
    let los = BoundedSampler::log_normal(
        Site::new(HOSPITALIZATION, "discharge_dttm"),
        settings.los_log_mean,
        settings.los_log_sd,
        0.5,
        365.0,
    );
    let counts = Categorical::new(
        Site::new(HOSPITALIZATION, "hospitalization_id"),
        settings
            .encounter_count_weights
            .iter()
            .enumerate()
            .map(|(index, weight)| (index + 1, *weight))
            .collect(),
    )?;
    let mut number = FIRST_HOSPITALIZATION;

    let mut table = TableBuilder::new(schema::hospitalization());
    let mut stays = Vec::new();
    for patient in patients {
        let mut previous_end: Option<NaiveDateTime> = None;
        for _ in 0..counts.pick_copied(rng) {
            let day = match previous_end {
                None => base + Duration::days(rng.random_range(0..=199)),
                Some(end) => end + Duration::days(rng.random_range(30..=179)),
            };
            let admission = day + time_of_day(rng);
            if patient.death.is_some_and(|death| admission > death) {
                break;
            }

            let los_days = (los.sample(rng)?.trunc() as i64).max(1);
            let mut discharge = admission + Duration::days(los_days);
            let death_in_stay = patient
                .death
                .filter(|death| admission <= *death && *death <= discharge);
            if let Some(death) = death_in_stay {
                discharge = death;
            }
            let expired = death_in_stay.is_some();

            let stay = Hospitalization {
                id: HOSPITALIZATION_ID.format(number),
                patient_id: patient.id.clone(),
                span: Span::new(admission, discharge),
                expired,
                age: ((admission.date() - patient.birth_date).num_days() as f64 / 365.25) as i64,
                care: Default::default(),
            };
            let admission_type = ADMISSION_TYPES[rng.random_range(0..ADMISSION_TYPES.len())];
            let discharge_category = if expired {
                EXPIRED
            } else {
                DISCHARGES[rng.random_range(0..DISCHARGES.len())]
            };
            table.push(
                Record::new()
                    .with("patient_id", &stay.patient_id)
                    .with("hospitalization_id", &stay.id)
                    .with("hospitalization_joined_id", JOINED_ID.format(number))
                    .with("admission_dttm", stay.span.start)
                    .with("discharge_dttm", stay.span.end)
                    .with("age_at_admission", stay.age)
                    .with("admission_type_name", admission_type)
                    .with("admission_type_category", admission_type)
                    .with("discharge_name", discharge_category)
                    .with("discharge_category", discharge_category)
                    .with(
                        "zipcode_five_digit",
                        rng.random_range(10_000..=99_999_u32).to_string(),
                    )
                    .with(
                        "zipcode_nine_digit",
                        rng.random_range(100_000_000..=999_999_999_u64).to_string(),
                    )
                    .with(
                        "census_block_group_code",
                        rng.random_range(100_000_000_000..=999_999_999_999_u64).to_string(),
                    )
                    .with(
                        "latitude",
                        Value::decimal(round_to(rng.random_range(25.0..=49.0), 5), 5),
                    )
                    .with(
                        "longitude",
                        Value::decimal(
                            round_to(rng.random_range(-125.0..=-66.0), 5),
                            5,
                        ),
                    ),
            );
            number += 1;
            previous_end = Some(discharge);
            stays.push(stay);
            if expired {
                break;
            }
        }
    }
    Ok((table, stays))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            n_patients: 40,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn stays_are_ordered_and_end_at_death() {
        let config = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let (_, patients) = patients(&config, &mut rng).expect("patients");
        let (_, stays) = hospitalizations(&config, &patients, &mut rng).expect("stays");

        assert!(!stays.is_empty());
        for stay in &stays {
            assert!(stay.span.end >= stay.span.start);
            let patient = patients
                .iter()
                .find(|patient| patient.id == stay.patient_id)
                .expect("owning patient");
            if stay.expired {
                assert_eq!(Some(stay.span.end), patient.death);
            }
            if let Some(death) = patient.death {
                assert!(stay.span.start <= death);
            }
        }
        for pair in stays.windows(2) {
            if pair[0].patient_id == pair[1].patient_id {
                assert!(pair[1].span.start > pair[0].span.end);
                assert!(!pair[0].expired);
            }
        }
    }

    #[test]
    fn deaths_hit_the_quota_and_favour_older_patients() {
        let config = GeneratorConfig {
            n_patients: 5000,
            ..GeneratorConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let (_, patients) = patients(&config, &mut rng).expect("patients");
        let deaths = patients.iter().filter(|p| p.death.is_some()).count();
        assert_eq!(deaths, 695);

        let death_rate = |band: &dyn Fn(i64) -> bool| {
            let members: Vec<&Patient> = patients.iter().filter(|p| band(p.age)).collect();
            let dead = members.iter().filter(|p| p.death.is_some()).count();
            dead as f64 / members.len() as f64
        };
        let oldest = death_rate(&|age| age > 80);
        let youngest = death_rate(&|age| age <= 70);
        assert!(oldest > youngest, "{oldest} <= {youngest}");
    }

    #[test]
    fn zero_mortality_kills_nobody() {
        let mut config = small_config();
        config.format_a.mortality_rate = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (_, patients) = patients(&config, &mut rng).expect("patients");
        assert!(patients.iter().all(|p| p.death.is_none()));
    }

    #[test]
    fn ages_stay_in_adult_range() {
        let config = small_config();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (table, patients) = patients(&config, &mut rng).expect("patients");
        assert_eq!(table.len(), 40);
        assert!(patients.iter().all(|p| (18..=105).contains(&p.age)));
        assert_eq!(patients[0].id, "P000001");
    }
}
