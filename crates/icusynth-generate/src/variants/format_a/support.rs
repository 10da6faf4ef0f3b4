//! Organ support, positioning, procedures and fluid balance.

use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rand::seq::IndexedRandom;

use icusynth_core::{Record, Span, Value};

use super::Hospitalization;
use super::schema::{self, CRRT_THERAPY, ECMO_MCS, POSITION, RESPIRATORY_SUPPORT};
use crate::assembler::{Parent, TableBuilder};
use crate::errors::{GenerationError, Site};
use crate::progression::{Dwell, Stage, StateInterval, StateProgression};
use crate::sampler::{BoundedSampler, Categorical, round_to};
use crate::sequencer::{IntervalPolicy, event_times};

/// Whole-number reading rendered like a measured float.
fn reading<R: Rng + ?Sized>(rng: &mut R, lo: i64, hi: i64) -> Value {
    Value::decimal(rng.random_range(lo..=hi) as f64, 1)
}

fn fraction<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64, decimals: u32) -> Value {
    Value::decimal(round_to(rng.random_range(lo..=hi), decimals), decimals as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Device {
    NasalCannula,
    FaceMask,
    HighFlow,
    Nippv,
    Imv,
}

const RECORDED: Site = Site::new(RESPIRATORY_SUPPORT, "recorded_dttm");
const IMV_HOURS: BoundedSampler = BoundedSampler::gamma(RECORDED, 48.0, 2.0, 4.0, 720.0);
const VENT_MODES: [&str; 3] = ["Assist Control-Volume Control", "Pressure Control", "SIMV"];
const VENT_BRANDS: [&str; 3] = ["Puritan Bennett", "Hamilton", "Drager"];

/// Device periods of one stay. Ventilated stays escalate through high-flow
/// and non-invasive support first unless the stay is shorter than a day, and
/// are weaned onto a nasal cannula for up to two days after extubation.
fn device_periods<R: Rng + ?Sized>(
    stay: &Hospitalization,
    non_invasive: &Categorical<Device>,
    rng: &mut R,
) -> Result<Vec<StateInterval<Device>>, GenerationError> {
    if !stay.care.imv {
        let device = non_invasive.pick_copied(rng);
        let start = stay.span.at(Duration::hours(rng.random_range(0..=5)));
        let span = stay
            .span
            .window(start, Duration::hours(rng.random_range(12..=71)));
        return Ok(vec![StateInterval {
            state: device,
            span,
        }]);
    }

    let mut stages = Vec::with_capacity(4);
    if stay.span.hours() >= 24.0 {
        stages.push(Stage::new(Device::HighFlow, Dwell::UniformHours { min: 1, max: 11 }));
        stages.push(Stage::new(Device::Nippv, Dwell::UniformHours { min: 1, max: 11 }));
    }
    stages.push(Stage::new(Device::Imv, Dwell::Hours(IMV_HOURS)));
    stages.push(Stage::new(Device::NasalCannula, Dwell::UntilEnd));

    let mut periods = StateProgression::new(RECORDED, stages)?.run(stay.span, rng)?;
    let weaning = periods
        .last_mut()
        .filter(|period| period.state == Device::NasalCannula);
    if let Some(weaning) = weaning {
        let cutoff = weaning.span.start + Duration::hours(rng.random_range(12..=47));
        weaning.span = weaning.span.truncated(cutoff);
    }
    Ok(periods)
}

fn device_row<R: Rng + ?Sized>(
    stay: &Hospitalization,
    at: NaiveDateTime,
    device: Device,
    rng: &mut R,
) -> Record {
    let row = stay.child().with("recorded_dttm", at);
    match device {
        Device::NasalCannula => row
            .with("device_name", "Nasal Cannula")
            .with("device_category", "NC")
            .with("tracheostomy", 0_i64)
            .with("lpm_set", reading(rng, 1, 14))
            .with("resp_rate_obs", reading(rng, 16, 29)),
        Device::FaceMask => row
            .with("device_name", "Face Mask")
            .with("device_category", "Face Mask")
            .with("tracheostomy", 0_i64)
            .with("fio2_set", fraction(rng, 0.21, 0.6, 2))
            .with("lpm_set", reading(rng, 1, 14))
            .with("resp_rate_obs", reading(rng, 16, 29)),
        Device::HighFlow => row
            .with("device_name", "OptiFlow")
            .with("device_category", "High Flow NC")
            .with("tracheostomy", 0_i64)
            .with("fio2_set", fraction(rng, 0.3, 0.8, 2))
            .with("lpm_set", reading(rng, 30, 59))
            .with("resp_rate_obs", reading(rng, 12, 29)),
        Device::Nippv => row
            .with("device_name", "BiPAP")
            .with("device_category", "NIPPV")
            .with("mode_name", "BiPAP S/T")
            .with("mode_category", "Pressure Support/CPAP")
            .with("vent_brand_name", "Respironics")
            .with("tracheostomy", 0_i64)
            .with("fio2_set", fraction(rng, 0.3, 0.6, 2))
            .with("pressure_support_set", reading(rng, 8, 14))
            .with("peak_inspiratory_pressure_set", reading(rng, 15, 24))
            .with("peep_set", reading(rng, 5, 9))
            .with("resp_rate_obs", reading(rng, 12, 24))
            .with("peep_obs", reading(rng, 5, 9)),
        Device::Imv => {
            let mode = VENT_MODES[rng.random_range(0..VENT_MODES.len())];
            let brand = VENT_BRANDS[rng.random_range(0..VENT_BRANDS.len())];
            let tracheostomy = i64::from(rng.random_bool(0.2));
            let tidal_volume = mode
                .contains("Volume")
                .then(|| reading(rng, 400, 599));
            let pressure_control = mode
                .contains("Pressure")
                .then(|| reading(rng, 15, 29));
            row.with("device_name", "Ventilator")
                .with("device_category", "IMV")
                .with("mode_name", mode)
                .with("mode_category", mode)
                .with("vent_brand_name", brand)
                .with("tracheostomy", tracheostomy)
                .with("fio2_set", fraction(rng, 0.3, 0.8, 2))
                .with("tidal_volume_set", tidal_volume)
                .with("resp_rate_set", reading(rng, 12, 19))
                .with("pressure_control_set", pressure_control)
                .with("pressure_support_set", reading(rng, 5, 14))
                .with("flow_rate_set", reading(rng, 40, 59))
                .with("inspiratory_time_set", fraction(rng, 0.8, 1.2, 1))
                .with("peep_set", reading(rng, 5, 14))
                .with("tidal_volume_obs", reading(rng, 380, 579))
                .with("resp_rate_obs", reading(rng, 12, 24))
                .with("plateau_pressure_obs", reading(rng, 15, 29))
                .with("peak_inspiratory_pressure_obs", reading(rng, 20, 34))
                .with("peep_obs", reading(rng, 5, 14))
                .with("minute_vent_obs", fraction(rng, 6.0, 12.0, 1))
                .with("mean_airway_pressure_obs", reading(rng, 10, 19))
        }
    }
}

/// Charting gaps between device records; mostly four-hourly, tighter when
/// settings are being titrated.
fn charting_cadence() -> IntervalPolicy {
    IntervalPolicy::Weighted(vec![
        (Duration::hours(1), 0.1),
        (Duration::hours(2), 0.25),
        (Duration::hours(4), 0.5),
        (Duration::hours(6), 0.15),
    ])
}

/// Charting times of one stay with the device in use at each.
fn device_charting<R: Rng + ?Sized>(
    stay: &Hospitalization,
    non_invasive: &Categorical<Device>,
    cadence: &IntervalPolicy,
    rng: &mut R,
) -> Result<Vec<(NaiveDateTime, Device)>, GenerationError> {
    let mut charted = Vec::new();
    for period in device_periods(stay, non_invasive, rng)? {
        for at in event_times(RECORDED, period.span, cadence, rng)? {
            charted.push((at, period.state));
        }
    }
    Ok(charted)
}

pub fn respiratory_support<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let non_invasive = Categorical::new(
        Site::new(RESPIRATORY_SUPPORT, "device_category"),
        vec![
            (Device::NasalCannula, 0.4),
            (Device::FaceMask, 0.3),
            (Device::HighFlow, 0.2),
            (Device::Nippv, 0.1),
        ],
    )?;
    let cadence = charting_cadence();
    let mut table = TableBuilder::new(schema::respiratory_support());
    for stay in stays {
        for (at, device) in device_charting(stay, &non_invasive, &cadence, rng)? {
            table.push(device_row(stay, at, device, rng));
        }
    }
    Ok(table)
}

struct CrrtMode {
    name: &'static str,
    category: &'static str,
    blood_flow: i64,
    pre_filter: Option<i64>,
    post_filter: Option<i64>,
    dialysate: Option<i64>,
}

const CRRT_MODES: [CrrtMode; 4] = [
    CrrtMode {
        name: "CVVHDF",
        category: "cvvhdf",
        blood_flow: 200,
        pre_filter: Some(1000),
        post_filter: Some(500),
        dialysate: Some(800),
    },
    CrrtMode {
        name: "CVVH",
        category: "cvvh",
        blood_flow: 180,
        pre_filter: Some(1200),
        post_filter: Some(300),
        dialysate: None,
    },
    CrrtMode {
        name: "CVVHD",
        category: "cvvhd",
        blood_flow: 160,
        pre_filter: None,
        post_filter: None,
        dialysate: Some(1000),
    },
    CrrtMode {
        name: "SCUF",
        category: "scuf",
        blood_flow: 150,
        pre_filter: None,
        post_filter: None,
        dialysate: None,
    },
];

/// Nominal rate plus symmetric integer jitter.
fn jittered<R: Rng + ?Sized>(rng: &mut R, nominal: Option<i64>, jitter: i64) -> Option<Value> {
    nominal.map(|rate| Value::decimal((rate + rng.random_range(-jitter..jitter)) as f64, 1))
}

/// Window starting `offset` into the stay and lasting `length`, or `None`
/// when the stay has already ended by then.
fn course(stay: &Hospitalization, offset: Duration, length: Duration) -> Option<Span> {
    let start = stay.span.start + offset;
    (start < stay.span.end).then(|| stay.span.window(start, length))
}

pub fn crrt_therapy<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let site = Site::new(CRRT_THERAPY, "recorded_dttm");
    let mut table = TableBuilder::new(schema::crrt_therapy());
    for stay in stays.iter().filter(|stay| stay.care.crrt) {
        let offset = Duration::days(rng.random_range(1..=2));
        let length = Duration::days(rng.random_range(3..=9));
        let mode = &CRRT_MODES[rng.random_range(0..CRRT_MODES.len())];
        let Some(span) = course(stay, offset, length) else {
            continue;
        };
        for at in event_times(site, span, &IntervalPolicy::hours(4), rng)? {
            let machine = format!("Machine-{}", rng.random_range(1..=9));
            table.push(
                stay.child()
                    .with("recorded_dttm", at)
                    .with("crrt_mode_name", mode.name)
                    .with("crrt_mode_category", mode.category)
                    .with("dialysis_machine_name", machine)
                    .with("blood_flow_rate", jittered(rng, Some(mode.blood_flow), 20))
                    .with(
                        "pre_filter_replacement_fluid_rate",
                        jittered(rng, mode.pre_filter, 100),
                    )
                    .with(
                        "post_filter_replacement_fluid_rate",
                        jittered(rng, mode.post_filter, 50),
                    )
                    .with("dialysate_flow_rate", jittered(rng, mode.dialysate, 100))
                    .with("ultrafiltration_out", reading(rng, 500, 1999)),
            );
        }
    }
    Ok(table)
}

struct CirculatoryDevice {
    name: &'static str,
    category: &'static str,
    group: &'static str,
}

impl CirculatoryDevice {
    fn is_ecmo(&self) -> bool {
        self.category == "ECMO"
    }
}

const CIRCULATORY_DEVICES: [CirculatoryDevice; 4] = [
    CirculatoryDevice {
        name: "ECMO VV",
        category: "ECMO",
        group: "ECMO",
    },
    CirculatoryDevice {
        name: "ECMO VA",
        category: "ECMO",
        group: "ECMO",
    },
    CirculatoryDevice {
        name: "Impella",
        category: "Impella",
        group: "temporary_LVAD",
    },
    CirculatoryDevice {
        name: "Centrimag",
        category: "Centrimag",
        group: "temporary_LVAD",
    },
];

pub fn ecmo_mcs<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let site = Site::new(ECMO_MCS, "recorded_dttm");
    let mut table = TableBuilder::new(schema::ecmo_mcs());
    for stay in stays.iter().filter(|stay| stay.care.ecmo) {
        let offset = Duration::hours(rng.random_range(0..=47));
        let length = Duration::days(rng.random_range(3..=13));
        let device = &CIRCULATORY_DEVICES[rng.random_range(0..CIRCULATORY_DEVICES.len())];
        let span = stay.span.window(stay.span.at(offset), length);
        for at in event_times(site, span, &IntervalPolicy::hours(2), rng)? {
            let row = stay
                .child()
                .with("recorded_dttm", at)
                .with("device_name", device.name)
                .with("device_category", device.category)
                .with("mcs_group", device.group);
            let row = if device.is_ecmo() {
                row.with("side", "both")
                    .with("device_metric_name", "Flow Rate")
                    .with("flow", fraction(rng, 3.5, 5.5, 1))
                    .with("sweep", fraction(rng, 1.0, 4.0, 1))
                    .with("fdo2", fraction(rng, 0.6, 1.0, 2))
            } else {
                let side = if rng.random_bool(0.5) { "left" } else { "right" };
                row.with("side", side)
                    .with("device_metric_name", "RPMs")
                    .with("device_rate", reading(rng, 2500, 3499))
                    .with("flow", fraction(rng, 3.5, 5.5, 1))
            };
            table.push(row);
        }
    }
    Ok(table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Posture {
    NotProne,
    Prone,
}

const NOT_PRONE: [&str; 4] = ["Supine", "Supine-turn R", "Supine-turn L", "30 Degrees"];
const PRONE: [&str; 3] = ["Prone", "Prone-turn R", "Prone-turn L"];

/// Turns every 2-3 hours, with 16-hour prone sessions in between.
pub fn position<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let progression = StateProgression::new(
        Site::new(POSITION, "recorded_dttm"),
        vec![
            Stage::new(Posture::NotProne, Dwell::UniformHours { min: 2, max: 3 }).repeating(0.8),
            Stage::new(Posture::Prone, Dwell::Fixed(Duration::hours(16))),
        ],
    )?
    .cyclic();
    let mut table = TableBuilder::new(schema::position());
    for stay in stays.iter().filter(|stay| stay.care.position) {
        for interval in progression.run(stay.span, rng)? {
            let (names, category) = match interval.state {
                Posture::NotProne => (&NOT_PRONE[..], "not_prone"),
                Posture::Prone => (&PRONE[..], "prone"),
            };
            let name = names.choose(rng).copied().unwrap_or(names[0]);
            table.push(
                stay.child()
                    .with("recorded_dttm", interval.span.start)
                    .with("position_name", name)
                    .with("position_category", category),
            );
        }
    }
    Ok(table)
}

const PROCEDURES: [(&str, f64, i64); 8] = [
    ("Central Line Placement", 0.7, 30),
    ("Arterial Line Placement", 0.6, 20),
    ("Intubation", 0.5, 15),
    ("Bronchoscopy", 0.3, 45),
    ("Chest Tube Placement", 0.2, 30),
    ("Lumbar Puncture", 0.1, 30),
    ("Paracentesis", 0.1, 30),
    ("Thoracentesis", 0.1, 30),
];

pub fn procedures<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let mut table = TableBuilder::new(schema::procedures());
    for stay in stays {
        for (name, probability, minutes) in PROCEDURES {
            if !rng.random_bool(probability) {
                continue;
            }
            let at = stay.span.at(Duration::hours(rng.random_range(0..=47)));
            table.push(
                stay.child()
                    .with("procedure_dttm", at)
                    .with("procedure_name", name)
                    .with("procedure_duration_minutes", minutes),
            );
        }
    }
    Ok(table)
}

/// Amount in `lo..=hi` with probability `p`, otherwise zero.
fn sometimes<R: Rng + ?Sized>(rng: &mut R, p: f64, lo: i64, hi: i64) -> i64 {
    if rng.random_bool(p) {
        rng.random_range(lo..=hi)
    } else {
        0
    }
}

pub fn intake_output<R: Rng + ?Sized>(
    stays: &[Hospitalization],
    rng: &mut R,
) -> Result<TableBuilder, GenerationError> {
    let site = Site::new(schema::INTAKE_OUTPUT, "recorded_dttm");
    let mut table = TableBuilder::new(schema::intake_output());
    for stay in stays {
        for at in event_times(site, stay.span, &IntervalPolicy::hours(8), rng)? {
            let iv_fluids = rng.random_range(200..=999);
            let medications = rng.random_range(50..=199);
            let oral = sometimes(rng, 0.3, 0, 499);
            let blood_products = sometimes(rng, 0.1, 250, 499);
            let intake = iv_fluids + medications + oral + blood_products;

            let urine = rng.random_range(100..=799);
            let stool = sometimes(rng, 0.3, 0, 199);
            let drainage = sometimes(rng, 0.2, 50, 299);
            let blood_loss = sometimes(rng, 0.1, 50, 199);
            let output = urine + stool + drainage + blood_loss;

            let volume = |ml: i64| Value::decimal(ml as f64, 1);
            table.push(
                stay.child()
                    .with("recorded_dttm", at)
                    .with("intake_oral", volume(oral))
                    .with("intake_iv_fluids", volume(iv_fluids))
                    .with("intake_medications", volume(medications))
                    .with("intake_blood_products", volume(blood_products))
                    .with("intake_total", volume(intake))
                    .with("output_urine", volume(urine))
                    .with("output_stool", volume(stool))
                    .with("output_drainage", volume(drainage))
                    .with("output_blood_loss", volume(blood_loss))
                    .with("output_total", volume(output))
                    .with("net_balance", volume(intake - output)),
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

    fn stay(days: i64, care: CarePlan) -> Hospitalization {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid timestamp");
        Hospitalization {
            id: "H00001000".to_string(),
            patient_id: "P000001".to_string(),
            span: Span::new(start, start + Duration::days(days)),
            expired: false,
            age: 60,
            care,
        }
    }

    #[test]
    fn ventilated_stays_escalate_to_imv() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let care = CarePlan {
            imv: true,
            ..CarePlan::default()
        };
        let stays = vec![stay(10, care)];
        let non_invasive = Categorical::uniform(RECORDED, vec![Device::NasalCannula]).expect("one");
        let periods = device_periods(&stays[0], &non_invasive, &mut rng).expect("periods");
        let states: Vec<Device> = periods.iter().map(|p| p.state).collect();
        assert_eq!(
            states,
            vec![Device::HighFlow, Device::Nippv, Device::Imv, Device::NasalCannula]
        );
        for pair in periods.windows(2) {
            assert_eq!(pair[0].span.end, pair[1].span.start);
        }
        let imv_hours = periods[2].span.hours();
        assert!((4.0..=720.0).contains(&imv_hours), "{imv_hours}");
        let weaning = &periods[3];
        assert!(weaning.span.hours() >= 12.0 && weaning.span.hours() <= 47.0);
        assert!(weaning.span.end <= stays[0].span.end);
    }

    #[test]
    fn short_ventilated_stays_start_on_imv() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let care = CarePlan {
            imv: true,
            ..CarePlan::default()
        };
        let mut short = stay(1, care);
        short.span = Span::new(short.span.start, short.span.start + Duration::hours(20));
        let non_invasive = Categorical::uniform(RECORDED, vec![Device::FaceMask]).expect("one");
        let periods = device_periods(&short, &non_invasive, &mut rng).expect("periods");
        assert_eq!(periods[0].state, Device::Imv);
    }

    #[test]
    fn respiratory_charting_varies_and_stays_inside_the_stay() {
        let care = CarePlan {
            imv: true,
            ..CarePlan::default()
        };
        let ventilated = stay(8, care);
        let non_invasive = Categorical::uniform(RECORDED, vec![Device::HighFlow]).expect("one");
        let cadence = charting_cadence();
        let mut gaps = std::collections::BTreeSet::new();
        for seed in 0..10 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let charted = device_charting(&ventilated, &non_invasive, &cadence, &mut rng)
                .expect("charting");
            assert!(!charted.is_empty());
            for (at, _) in &charted {
                assert!(ventilated.span.contains(*at));
            }
            for pair in charted.windows(2) {
                assert!(pair[0].0 < pair[1].0);
                if pair[0].1 == pair[1].1 {
                    gaps.insert((pair[1].0 - pair[0].0).num_hours());
                }
            }
        }
        assert!(gaps.len() > 1, "{gaps:?}");
        assert!(gaps.iter().all(|hours| [1, 2, 4, 6].contains(hours)), "{gaps:?}");
    }

    #[test]
    fn fluid_balance_adds_up() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let stays = vec![stay(3, CarePlan::default())];
        let table = intake_output(&stays, &mut rng).expect("io");
        assert_eq!(table.len(), 9);
    }

    #[test]
    fn crrt_skips_stays_that_end_first() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let care = CarePlan {
            crrt: true,
            ..CarePlan::default()
        };
        let mut brief = stay(1, care);
        brief.span = Span::new(brief.span.start, brief.span.start + Duration::hours(12));
        let table = crrt_therapy(&[brief], &mut rng).expect("crrt");
        assert!(table.is_empty());
    }
}
