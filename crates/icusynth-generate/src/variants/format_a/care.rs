//! Diagnoses, goals of care, care team and rehabilitation therapy.

use chrono::{Duration, NaiveDateTime};
use fake::Fake;
use fake::faker::name::en::LastName;
use rand::Rng;
use rand::seq::IndexedRandom;

use icusynth_core::{FormatAConfig, IdFormat, IdSequence, Record, Span};

use super::Hospitalization;
use super::schema::{self, ADMISSION_DIAGNOSIS, THERAPY_SESSION};
use crate::assembler::{Parent, TableBuilder};
use crate::errors::{GenerationError, Site};
use crate::progression::{Dwell, Stage, StateInterval, StateProgression};
use crate::sampler::BoundedSampler;
use crate::sequencer::{IntervalPolicy, event_times};

pub const PROVIDER_ID: IdFormat = IdFormat::new("PROV", 5);
pub const SESSION_ID: IdFormat = IdFormat::new("TS", 8);

/// (ICD-10, ICD-9). The first eight are acute admission reasons.
const DIAGNOSES: [(&str, &str); 10] = [
    ("A41.9", "038.9"),
    ("J18.9", "486"),
    ("N17.9", "584.9"),
    ("I50.9", "428.9"),
    ("J80", "518.82"),
    ("I63.9", "434.91"),
    ("J44.1", "491.21"),
    ("K92.2", "578.9"),
    ("E11.9", "250.00"),
    ("I10", "401.9"),
];
const ACUTE_DIAGNOSES: usize = 8;

const COMORBIDITIES: BoundedSampler = BoundedSampler::poisson(
    Site::new(ADMISSION_DIAGNOSIS, "diagnostic_code"),
    2.0,
    0.0,
    DIAGNOSES.len() as f64,
);

/// A primary diagnosis plus Poisson(2) distinct comorbidities, all coded in
/// the same format. The primary stays open when the patient died.
pub fn admission_diagnosis<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let mut table = TableBuilder::new(schema::admission_diagnosis());
    for stay in stays {
        let primary = rng.random_range(0..ACUTE_DIAGNOSES);
        let icd10 = rng.random_bool(0.9);
        let format = if icd10 { "icd10" } else { "icd9" };
        let code = |index: usize| {
            let (ten, nine) = DIAGNOSES[index];
            if icd10 { ten } else { nine }
        };
        let primary_end = (!stay.expired).then_some(stay.span.end);
        table.push(diagnosis_row(stay, code(primary), format, primary_end));

        let count = COMORBIDITIES.sample_whole(rng)? as usize;
        let indices: Vec<usize> = (0..DIAGNOSES.len()).collect();
        for &index in indices.choose_multiple(rng, count) {
            if index != primary {
                table.push(diagnosis_row(stay, code(index), format, Some(stay.span.end)));
            }
        }
    }
    Ok(table)
}

fn diagnosis_row(
    stay: &Hospitalization,
    code: &str,
    format: &str,
    end: Option<NaiveDateTime>,
) -> Record {
    stay.child()
        .with("diagnostic_code", code)
        .with("diagnosis_code_format", format)
        .with("start_dttm", stay.span.start)
        .with("end_dttm", end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CodeStatus {
    Full,
    Dnr,
    DnrDni,
    ComfortCare,
}

impl CodeStatus {
    fn category(self) -> &'static str {
        match self {
            CodeStatus::Full => "Full",
            CodeStatus::Dnr => "DNR",
            CodeStatus::DnrDni => "DNR/DNI",
            CodeStatus::ComfortCare => "Comfort Care Only",
        }
    }
}

/// Escalation path of one stay: full code, then DNR or straight to DNR/DNI,
/// then comfort care. Each limitation starts a whole number of days after
/// the previous status, spaced so that `changes` of them fit in the stay.
fn code_status_path<R: Rng + ?Sized>(
    stay: &Hospitalization,
    changes: usize,
    rng: &mut R,
) -> Result<Vec<StateInterval<CodeStatus>>, GenerationError> {
    let last_day = (stay.span.days() as i64).max(2);
    let spacing = ((last_day - 1) / changes.max(1) as i64).max(1);
    let step = Dwell::UniformDays {
        min: 1,
        max: spacing,
    };

    let mut stages = vec![Stage::new(CodeStatus::Full, step.clone())];
    if rng.random_bool(0.5) {
        stages.push(Stage::new(CodeStatus::Dnr, step.clone()));
    }
    stages.push(Stage::new(CodeStatus::DnrDni, step));
    stages.push(Stage::new(CodeStatus::ComfortCare, Dwell::UntilEnd));

    let site = Site::new(schema::CODE_STATUS, "start_dttm");
    let mut path = StateProgression::new(site, stages)?.run(stay.span, rng)?;
    path.truncate(changes + 1);
    Ok(path)
}

/// Full code at admission, then zero or one limitation (one or two when the
/// patient died) on whole days after admission, in time order.
pub fn code_status<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let mut table = TableBuilder::new(schema::code_status());
    for stay in stays.iter().filter(|stay| stay.care.code_status) {
        let changes = if stay.expired {
            rng.random_range(1..=2)
        } else {
            rng.random_range(0..=1)
        };
        for interval in code_status_path(stay, changes, rng)? {
            let name = match interval.state {
                CodeStatus::Full => "Full Code",
                status => status.category(),
            };
            table.push(
                stay.child()
                    .with("start_dttm", interval.span.start)
                    .with("code_status_name", name)
                    .with("code_status_category", interval.state.category()),
            );
        }
    }
    Ok(table)
}

const SPECIALTIES: [&str; 5] = [
    "Critical Care",
    "Pulmonology",
    "Cardiology",
    "Nephrology",
    "Infectious Disease",
];
const ROLES: [&str; 3] = ["Attending", "Fellow", "Resident"];
const INITIALS: [&str; 4] = ["A", "B", "C", "D"];

#[derive(Debug, Clone)]
struct Provider {
    id: String,
    name: String,
    specialty: &'static str,
    role: &'static str,
}

fn provider_pool<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Vec<Provider> {
    let mut ids = IdSequence::new(PROVIDER_ID, 1);
    (0..size)
        .map(|_| {
            let surname: String = LastName().fake_with_rng(rng);
            let initial = INITIALS[rng.random_range(0..INITIALS.len())];
            Provider {
                id: ids.next_id(),
                name: format!("Dr. {surname} {initial}"),
                specialty: SPECIALTIES[rng.random_range(0..SPECIALTIES.len())],
                role: ROLES[rng.random_range(0..ROLES.len())],
            }
        })
        .collect()
}

/// Two to four distinct providers per stay, drawn from a shared pool.
pub fn provider<R: Rng + ?Sized>(
    settings: &FormatAConfig,
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let pool = provider_pool(settings.provider_pool_size, rng);
    let mut table = TableBuilder::new(schema::provider());
    for stay in stays {
        let count = rng.random_range(2..=4);
        for provider in pool.choose_multiple(rng, count) {
            table.push(
                stay.child()
                    .with("provider_id", &provider.id)
                    .with("provider_name", &provider.name)
                    .with("provider_specialty", provider.specialty)
                    .with("provider_role", provider.role),
            );
        }
    }
    Ok(table)
}

const THERAPIES: [(&str, &[&str]); 4] = [
    (
        "Physical Therapy",
        &[
            "Bed mobility",
            "Transfer training",
            "Gait training",
            "Strengthening exercises",
        ],
    ),
    (
        "Occupational Therapy",
        &[
            "ADL training",
            "Upper extremity exercises",
            "Cognitive tasks",
            "Fine motor skills",
        ],
    ),
    (
        "Speech Therapy",
        &[
            "Swallow evaluation",
            "Communication exercises",
            "Cognitive-linguistic tasks",
        ],
    ),
    (
        "Respiratory Therapy",
        &[
            "Breathing exercises",
            "Airway clearance",
            "Ventilator weaning",
            "Oxygen titration",
        ],
    ),
];

/// One therapy session; parent of its activity rows.
#[derive(Debug, Clone)]
pub(crate) struct TherapySession {
    pub id: String,
    pub hospitalization_id: String,
    pub activities: &'static [&'static str],
    pub span: Span,
}

impl TherapySession {
    fn minutes(&self) -> i64 {
        self.span.duration().num_minutes()
    }
}

impl Parent for TherapySession {
    fn key_column(&self) -> &'static str {
        "session_id"
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn span(&self) -> Span {
        self.span
    }

    fn child(&self) -> Record {
        Record::new()
            .with("session_id", &self.id)
            .with("hospitalization_id", &self.hospitalization_id)
    }
}

/// Sessions of one or two therapy types every one to two days, starting two
/// to four days after admission.
pub fn therapy_sessions<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<(TableBuilder, Vec<TherapySession>), GenerationError> {
    let site = Site::new(THERAPY_SESSION, "session_dttm");
    let cadence = IntervalPolicy::UniformDays { min: 1, max: 2 };
    let mut ids = IdSequence::new(SESSION_ID, 1);
    let mut table = TableBuilder::new(schema::therapy_session());
    let mut sessions = Vec::new();

    for stay in stays.iter().filter(|stay| stay.care.therapy) {
        let start = stay.span.start + Duration::days(rng.random_range(2..=4));
        if start >= stay.span.end {
            continue;
        }
        let window = Span::new(start, stay.span.end);
        let count = rng.random_range(1..=2);
        for &(therapy, activities) in THERAPIES.choose_multiple(rng, count) {
            for at in event_times(site, window, &cadence, rng)? {
                let minutes = rng.random_range(30..=59);
                let session = TherapySession {
                    id: ids.next_id(),
                    hospitalization_id: stay.id.clone(),
                    activities,
                    span: Span::new(at, at + Duration::minutes(minutes)),
                };
                table.push(
                    stay.child()
                        .with("session_id", &session.id)
                        .with("therapy_type", therapy)
                        .with("session_dttm", at)
                        .with("duration_minutes", minutes)
                        .with("therapist_notes", format!("{therapy} session completed")),
                );
                sessions.push(session);
            }
        }
    }
    Ok((table, sessions))
}

/// Two activities per session sharing its duration.
pub fn therapy_details<R: Rng + ?Sized>(
    sessions: &[TherapySession],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    const RESPONSES: [&str; 3] = ["Good", "Fair", "Poor"];
    let mut table = TableBuilder::new(schema::therapy_details());
    for session in sessions {
        let count = session.activities.len().min(2);
        let share = session.minutes() / count.max(1) as i64;
        for activity in session.activities.choose_multiple(rng, count) {
            table.push(
                session
                    .child()
                    .with("activity_name", *activity)
                    .with("activity_duration_minutes", share)
                    .with("patient_response", RESPONSES[rng.random_range(0..RESPONSES.len())])
                    .with("notes", format!("Patient participated in {activity}")),
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

    fn stay(days: i64, expired: bool, care: CarePlan) -> Hospitalization {
        let start = NaiveDate::from_ymd_opt(2024, 7, 10)
            .and_then(|d| d.and_hms_opt(14, 5, 0))
            .expect("valid timestamp");
        Hospitalization {
            id: "H00001000".to_string(),
            patient_id: "P000001".to_string(),
            span: Span::new(start, start + Duration::days(days)),
            expired,
            age: 81,
            care,
        }
    }

    #[test]
    fn code_status_only_escalates() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let care = CarePlan {
            code_status: true,
            ..CarePlan::default()
        };
        let stays: Vec<Hospitalization> = (0..30).map(|_| stay(9, true, care)).collect();
        let table = code_status(&stays, &mut rng).expect("code status");
        assert!(table.len() >= 60);

        for changes in 0..=2 {
            for seed in 0..20 {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let long = stay(9, true, care);
                let path = code_status_path(&long, changes, &mut rng).expect("path");
                assert_eq!(path.len(), changes + 1, "seed {seed}");
                assert_eq!(path[0].state, CodeStatus::Full);
                assert_eq!(path[0].span.start, long.span.start);
                for pair in path.windows(2) {
                    assert!(pair[0].state < pair[1].state);
                    assert!(pair[1].span.start < long.span.end);
                    let days = (pair[1].span.start - long.span.start).num_minutes();
                    assert_eq!(days % (24 * 60), 0);
                }
            }
        }
    }

    #[test]
    fn same_day_stays_keep_full_code() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let care = CarePlan {
            code_status: true,
            ..CarePlan::default()
        };
        let mut brief = stay(1, true, care);
        brief.span = Span::new(brief.span.start, brief.span.start + Duration::hours(20));
        let path = code_status_path(&brief, 2, &mut rng).expect("path");
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].state, CodeStatus::Full);
    }

    #[test]
    fn providers_come_from_the_pool() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let pool = provider_pool(8, &mut rng);
        assert_eq!(pool.len(), 8);
        assert_eq!(pool[0].id, "PROV00001");
        assert!(pool.iter().all(|p| p.name.starts_with("Dr. ")));
    }

    #[test]
    fn short_stays_get_no_therapy() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let care = CarePlan {
            therapy: true,
            ..CarePlan::default()
        };
        let (table, sessions) =
            therapy_sessions(&[stay(1, false, care)], &mut rng).expect("sessions");
        assert!(table.is_empty() && sessions.is_empty());

        let (_, sessions) =
            therapy_sessions(&[stay(12, false, care)], &mut rng).expect("sessions");
        assert!(!sessions.is_empty());
        let details = therapy_details(&sessions, &mut rng).expect("details");
        assert_eq!(details.len(), sessions.len() * 2);
    }
}
