//! Medication orders and their administration records.
//!
//! Vasopressor orders come only from stays picked by the vasopressor quota,
//! so the achieved vasopressor rate equals the quota's. Every other drug
//! class is ordered independently per stay.

use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rand::seq::IndexedRandom;

use icusynth_core::{IdFormat, IdSequence, Record, Span, Value};

use super::Hospitalization;
use super::schema::{
    self, MEDICATION_ADMIN_CONTINUOUS, MEDICATION_ADMIN_INTERMITTENT, MEDICATION_ORDERS,
};
use crate::assembler::{Parent, TableBuilder};
use crate::errors::{GenerationError, Site};
use crate::sampler::{BoundedSampler, Categorical, round_to};
use crate::sequencer::{IntervalPolicy, event_times};

pub const MED_ORDER_ID: IdFormat = IdFormat::new("MO", 8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfusionGroup {
    Vasoactive,
    Sedation,
    Analgesia,
}

impl InfusionGroup {
    fn name(self) -> &'static str {
        match self {
            InfusionGroup::Vasoactive => "vasoactives",
            InfusionGroup::Sedation => "sedation",
            InfusionGroup::Analgesia => "analgesia",
        }
    }

    fn starting_rate(self) -> (f64, f64) {
        match self {
            InfusionGroup::Vasoactive => (0.05, 0.2),
            InfusionGroup::Sedation => (20.0, 50.0),
            InfusionGroup::Analgesia => (25.0, 100.0),
        }
    }

    fn rate_limits(self) -> (f64, f64) {
        match self {
            InfusionGroup::Vasoactive => (0.01, 0.5),
            InfusionGroup::Sedation => (5.0, 100.0),
            InfusionGroup::Analgesia => (10.0, 200.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Continuous {
        group: InfusionGroup,
        unit: &'static str,
    },
    /// Scheduled dose every `n` hours.
    Every(i64),
    /// As-needed dose offered every `n` hours.
    AsNeeded(i64),
}

#[derive(Debug)]
pub(crate) struct Drug {
    name: &'static str,
    route: &'static str,
    dose: &'static str,
    frequency: &'static str,
    schedule: Schedule,
}

const fn drug(
    name: &'static str,
    route: &'static str,
    dose: &'static str,
    frequency: &'static str,
    schedule: Schedule,
) -> Drug {
    Drug {
        name,
        route,
        dose,
        frequency,
        schedule,
    }
}

const fn infusion(group: InfusionGroup, unit: &'static str) -> Schedule {
    Schedule::Continuous { group, unit }
}

static ANTIBIOTICS: [Drug; 4] = [
    drug("Vancomycin", "IV", "15 mg/kg", "q12h", Schedule::Every(12)),
    drug("Piperacillin-Tazobactam", "IV", "4.5 g", "q6h", Schedule::Every(6)),
    drug("Ceftriaxone", "IV", "2 g", "daily", Schedule::Every(24)),
    drug("Meropenem", "IV", "1 g", "q8h", Schedule::Every(8)),
];
static SEDATION: [Drug; 3] = [
    drug(
        "Propofol",
        "IV",
        "50 mcg/kg/min",
        "continuous",
        infusion(InfusionGroup::Sedation, "mcg/kg/min"),
    ),
    drug(
        "Dexmedetomidine",
        "IV",
        "0.5 mcg/kg/hr",
        "continuous",
        infusion(InfusionGroup::Sedation, "mcg/kg/hr"),
    ),
    drug("Midazolam", "IV", "2 mg", "q2h prn", Schedule::AsNeeded(2)),
];
static ANALGESIA: [Drug; 3] = [
    drug(
        "Fentanyl",
        "IV",
        "50 mcg/hr",
        "continuous",
        infusion(InfusionGroup::Analgesia, "mcg/hr"),
    ),
    drug("Morphine", "IV", "2 mg", "q4h prn", Schedule::AsNeeded(4)),
    drug("Hydromorphone", "IV", "0.5 mg", "q4h prn", Schedule::AsNeeded(4)),
];
static CARDIOVASCULAR: [Drug; 2] = [
    drug("Metoprolol", "PO", "25 mg", "BID", Schedule::Every(12)),
    drug("Furosemide", "IV", "40 mg", "q12h", Schedule::Every(12)),
];
static VASOPRESSORS: [Drug; 5] = [
    drug(
        "Norepinephrine",
        "IV",
        "0.1 mcg/kg/min",
        "continuous",
        infusion(InfusionGroup::Vasoactive, "mcg/kg/min"),
    ),
    drug(
        "Epinephrine",
        "IV",
        "0.05 mcg/kg/min",
        "continuous",
        infusion(InfusionGroup::Vasoactive, "mcg/kg/min"),
    ),
    drug(
        "Vasopressin",
        "IV",
        "0.04 units/min",
        "continuous",
        infusion(InfusionGroup::Vasoactive, "units/min"),
    ),
    drug(
        "Dopamine",
        "IV",
        "5 mcg/kg/min",
        "continuous",
        infusion(InfusionGroup::Vasoactive, "mcg/kg/min"),
    ),
    drug(
        "Phenylephrine",
        "IV",
        "1 mcg/kg/min",
        "continuous",
        infusion(InfusionGroup::Vasoactive, "mcg/kg/min"),
    ),
];

static DRUG_CLASSES: [(&str, &[Drug]); 4] = [
    ("antibiotics", &ANTIBIOTICS),
    ("sedation", &SEDATION),
    ("analgesia", &ANALGESIA),
    ("cardiovascular", &CARDIOVASCULAR),
];

const VASOPRESSOR_DAYS: BoundedSampler =
    BoundedSampler::gamma(Site::new(MEDICATION_ORDERS, "end_dttm"), 2.0, 1.5, 0.5, 14.0);

/// An order; parent of its administration rows.
#[derive(Debug, Clone)]
pub(crate) struct MedicationOrder {
    pub id: String,
    pub hospitalization_id: String,
    pub category: &'static str,
    pub span: Span,
    pub drug: &'static Drug,
}

impl Parent for MedicationOrder {
    fn key_column(&self) -> &'static str {
        "med_order_id"
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn span(&self) -> Span {
        self.span
    }

    fn child(&self) -> Record {
        Record::new()
            .with("hospitalization_id", &self.hospitalization_id)
            .with("med_order_id", &self.id)
    }
}

/// Course length of a non-vasopressor order.
fn course_days<R: Rng + ?Sized>(category: &str, drug: &Drug, rng: &mut R) -> i64 {
    match (category, drug.schedule) {
        ("antibiotics", _) => rng.random_range(5..=13),
        (_, Schedule::Continuous { .. }) => rng.random_range(2..=6),
        _ => rng.random_range(1..=4),
    }
}

pub fn orders<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<(TableBuilder, Vec<MedicationOrder>), GenerationError> {
    let pressor_count = Categorical::new(
        Site::new(MEDICATION_ORDERS, "med_name"),
        vec![(1_usize, 0.6), (2, 0.3), (3, 0.1)],
    )?;
    let mut ids = IdSequence::new(MED_ORDER_ID, 1);
    let mut table = TableBuilder::new(schema::medication_orders());
    let mut orders = Vec::new();

    for stay in stays {
        let mut planned: Vec<(&'static str, &'static Drug, Duration)> = Vec::new();
        if stay.care.vasopressor {
            let count = pressor_count.pick_copied(rng);
            for drug in VASOPRESSORS.choose_multiple(rng, count) {
                let days = VASOPRESSOR_DAYS.sample(rng)?;
                let minutes = (days * 24.0 * 60.0).round() as i64;
                planned.push(("vasopressor", drug, Duration::minutes(minutes)));
            }
        }
        for &(category, drugs) in &DRUG_CLASSES {
            if !rng.random_bool(0.7) {
                continue;
            }
            let count = rng.random_range(1..=2);
            for drug in drugs.choose_multiple(rng, count) {
                let days = course_days(category, drug, rng);
                planned.push((category, drug, Duration::days(days)));
            }
        }

        for (category, drug, length) in planned {
            let start = stay.span.at(Duration::hours(rng.random_range(0..=23)));
            let order = MedicationOrder {
                id: ids.next_id(),
                hospitalization_id: stay.id.clone(),
                category,
                span: stay.span.window(start, length),
                drug,
            };
            table.push(
                stay.child()
                    .with("med_order_id", &order.id)
                    .with("order_dttm", order.span.start)
                    .with("med_name", drug.name)
                    .with("med_category", category)
                    .with("med_route", drug.route)
                    .with("med_dose", drug.dose)
                    .with("med_frequency", drug.frequency)
                    .with("start_dttm", order.span.start)
                    .with("end_dttm", order.span.end),
            );
            orders.push(order);
        }
    }
    Ok((table, orders))
}

/// Infusion start, titrations every 2-5 hours, and a zero-rate stop at the
/// end of the order.
pub fn continuous<R: Rng + ?Sized>(
    orders: &[MedicationOrder],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let site = Site::new(MEDICATION_ADMIN_CONTINUOUS, "admin_dttm");
    let titration = IntervalPolicy::UniformHours { min: 2, max: 5 };
    let mut table = TableBuilder::new(schema::medication_admin_continuous());

    for order in orders {
        let Schedule::Continuous { group, unit } = order.drug.schedule else {
            continue;
        };
        let name = format!("{} infusion", order.drug.name);
        let category = order.drug.name.to_lowercase();
        let row = |at: NaiveDateTime, dose: f64, action: &str, action_category: &str| {
            order
                .child()
                .with("admin_dttm", at)
                .with("med_name", &name)
                .with("med_category", &category)
                .with("med_group", group.name())
                .with("med_route_name", "Intravenous")
                .with("med_route_category", "IV")
                .with("med_dose", Value::decimal(round_to(dose, 4), 4))
                .with("med_dose_unit", unit)
                .with("mar_action_name", action)
                .with("mar_action_category", action_category)
        };

        let (low, high) = group.starting_rate();
        let (floor, ceiling) = group.rate_limits();
        let mut rate = rng.random_range(low..=high);
        table.push(row(order.span.start, rate, "New Bag", "Start"));
        for at in event_times(site, order.span, &titration, rng)?
            .into_iter()
            .skip(1)
        {
            let factor = if rng.random_bool(0.5) {
                rng.random_range(0.5..=0.8)
            } else {
                rng.random_range(1.2..=1.5)
            };
            rate = (rate * factor).clamp(floor, ceiling);
            table.push(row(at, rate, "Rate Change", "Adjust"));
        }
        table.push(row(order.span.end, 0.0, "Stopped", "Stop"));
    }
    Ok(table)
}

/// Scheduled doses at the order frequency; as-needed doses are skipped 40%
/// of the time and 5% of recorded doses are held.
pub fn intermittent<R: Rng + ?Sized>(
    orders: &[MedicationOrder],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let site = Site::new(MEDICATION_ADMIN_INTERMITTENT, "admin_dttm");
    let mut table = TableBuilder::new(schema::medication_admin_intermittent());

    for order in orders {
        let (hours, as_needed) = match order.drug.schedule {
            Schedule::Continuous { .. } => continue,
            Schedule::Every(hours) => (hours, false),
            Schedule::AsNeeded(hours) => (hours, true),
        };
        for at in event_times(site, order.span, &IntervalPolicy::hours(hours), rng)? {
            if as_needed && rng.random_bool(0.4) {
                continue;
            }
            let action = if rng.random_bool(0.05) { "Held" } else { "Given" };
            table.push(
                order
                    .child()
                    .with("admin_dttm", at)
                    .with("med_name", order.drug.name)
                    .with("med_category", order.category)
                    .with("med_route", order.drug.route)
                    .with("med_dose", order.drug.dose)
                    .with("med_frequency", order.drug.frequency)
                    .with("mar_action", action),
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

    fn stay(id: &str, vasopressor: bool) -> Hospitalization {
        let start = NaiveDate::from_ymd_opt(2024, 5, 2)
            .and_then(|d| d.and_hms_opt(6, 30, 0))
            .expect("valid timestamp");
        Hospitalization {
            id: id.to_string(),
            patient_id: "P000001".to_string(),
            span: Span::new(start, start + Duration::days(8)),
            expired: false,
            age: 55,
            care: CarePlan {
                vasopressor,
                ..CarePlan::default()
            },
        }
    }

    #[test]
    fn only_quota_stays_get_vasopressors() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let stays = vec![stay("H00001000", true), stay("H00001001", false)];
        let (_, orders) = orders(&stays, &mut rng).expect("orders");
        let pressor_stays: Vec<&str> = orders
            .iter()
            .filter(|order| order.category == "vasopressor")
            .map(|order| order.hospitalization_id.as_str())
            .collect();
        assert!(!pressor_stays.is_empty());
        assert!(pressor_stays.iter().all(|id| *id == "H00001000"));
        assert_eq!(orders[0].id, "MO00000001");
    }

    #[test]
    fn orders_stay_inside_their_hospitalization() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let stays: Vec<Hospitalization> = (0..20)
            .map(|n| stay(&format!("H{:08}", 1000 + n), n % 2 == 0))
            .collect();
        let (_, orders) = orders(&stays, &mut rng).expect("orders");
        for order in &orders {
            let owner = stays
                .iter()
                .find(|stay| stay.id == order.hospitalization_id)
                .expect("owner");
            assert!(owner.span.contains(order.span.start));
            assert!(owner.span.contains(order.span.end));
            assert!(order.span.end >= order.span.start);
        }
    }

    #[test]
    fn infusions_start_and_stop_with_the_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let stays = vec![stay("H00001000", true)];
        let (_, orders) = orders(&stays, &mut rng).expect("orders");
        let infusions = orders
            .iter()
            .filter(|o| matches!(o.drug.schedule, Schedule::Continuous { .. }))
            .count();
        let table = continuous(&orders, &mut rng).expect("continuous");
        assert!(table.len() >= infusions * 2);
    }
}
