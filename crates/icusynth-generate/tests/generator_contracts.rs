use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use icusynth_core::Span;
use icusynth_generate::Site;
use icusynth_generate::progression::{Dwell, Stage, StateProgression};
use icusynth_generate::quota::QuotaTracker;
use icusynth_generate::sampler::{BoundedSampler, Severity};
use icusynth_generate::sequencer::{IntervalPolicy, event_times};

const SITE: Site = Site::new("vitals", "heart_rate");

fn at(hour: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid timestamp")
        + Duration::hours(hour)
}

#[test]
fn quota_hits_exact_count_for_500_rows() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut quota = QuotaTracker::new("imv", 500, 0.356).expect("valid rate");
    let outcomes = quota.assign_all(&mut rng);
    assert_eq!(outcomes.len(), 500);
    assert_eq!(outcomes.iter().filter(|positive| **positive).count(), 178);
    assert_eq!(quota.positives(), 178);
}

#[test]
fn quota_is_exact_for_every_seed() {
    for seed in 0..25 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut quota = QuotaTracker::new("vasopressor", 137, 0.368).expect("valid rate");
        quota.assign_all(&mut rng);
        assert_eq!(quota.positives(), 50, "seed {seed}");
    }
}

#[test]
fn quota_rejects_rates_outside_unit_interval() {
    assert!(QuotaTracker::new("bad", 10, 1.5).is_err());
    assert!(QuotaTracker::new("bad", 10, -0.1).is_err());
}

#[test]
fn bounded_samplers_stay_in_range_over_100k_draws() {
    let samplers = [
        BoundedSampler::normal(SITE, 80.0, 40.0, 40.0, 180.0),
        BoundedSampler::gamma(SITE, 2.0, 1.5, 0.5, 3.0),
        BoundedSampler::log_normal(SITE, 1.93, 0.8, 1.0, 30.0),
        BoundedSampler::uniform(SITE, 5.0, 50.0),
        BoundedSampler::poisson(SITE, 2.0, 0.0, 3.0),
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for sampler in samplers {
        for _ in 0..100_000 {
            let value = sampler
                .sample_with(&mut rng, Some(Severity::new(15.0, 2.0)))
                .expect("valid parameters");
            assert!(
                (sampler.lo..=sampler.hi).contains(&value),
                "{value} escaped [{}, {}]",
                sampler.lo,
                sampler.hi
            );
        }
    }
}

#[test]
fn negative_spread_is_reported_with_its_site() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let err = BoundedSampler::normal(SITE, 80.0, -1.0, 40.0, 180.0)
        .sample(&mut rng)
        .expect_err("negative std dev");
    assert!(err.to_string().contains("vitals.heart_rate"));
}

#[test]
fn four_hour_sequence_over_ten_hours_has_three_events() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let times = event_times(
        SITE,
        Span::new(at(0), at(10)),
        &IntervalPolicy::hours(4),
        &mut rng,
    )
    .expect("valid policy");
    assert_eq!(times, vec![at(0), at(4), at(8)]);
}

#[test]
fn zero_length_window_yields_no_events() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let times = event_times(
        SITE,
        Span::new(at(5), at(5)),
        &IntervalPolicy::hours(1),
        &mut rng,
    )
    .expect("valid policy");
    assert!(times.is_empty());
}

#[test]
fn progression_never_regresses_and_covers_the_window() {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Support {
        NasalCannula,
        HighFlow,
        Ventilator,
    }

    let progression = StateProgression::new(
        SITE,
        vec![
            Stage::new(Support::NasalCannula, Dwell::UniformHours { min: 2, max: 6 }),
            Stage::new(Support::HighFlow, Dwell::UniformHours { min: 4, max: 12 }),
            Stage::new(Support::Ventilator, Dwell::UntilEnd),
        ],
    )
    .expect("valid stages");

    for seed in 0..20 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let window = Span::new(at(0), at(30));
        let intervals = progression.run(window, &mut rng).expect("run");
        assert_eq!(intervals.first().map(|i| i.span.start), Some(window.start));
        assert_eq!(intervals.last().map(|i| i.span.end), Some(window.end));
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].span.end, pair[1].span.start);
            assert!(pair[0].state < pair[1].state);
        }
    }
}

#[test]
fn non_cyclic_progression_holds_its_final_state_to_the_window_end() {
    let bounded = StateProgression::new(
        SITE,
        vec![
            Stage::new("ward", Dwell::Fixed(Duration::hours(1))),
            Stage::new("icu", Dwell::Fixed(Duration::hours(1))),
        ],
    )
    .expect("valid stages");
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let intervals = bounded
        .run(Span::new(at(0), at(10)), &mut rng)
        .expect("run");
    assert_eq!(intervals.len(), 2);
    assert_eq!(intervals[1].state, "icu");
    assert_eq!(intervals[1].span, Span::new(at(1), at(10)));

    let sampled = StateProgression::new(
        SITE,
        vec![
            Stage::new("ed", Dwell::UniformHours { min: 1, max: 5 }).repeating(0.3),
            Stage::new("icu", Dwell::UniformDays { min: 1, max: 2 }),
            Stage::new("stepdown", Dwell::UniformHours { min: 6, max: 12 }),
        ],
    )
    .expect("valid stages");
    for seed in 0..20 {
        for hours in [1, 7, 30, 96, 400] {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let window = Span::new(at(0), at(hours));
            let intervals = sampled.run(window, &mut rng).expect("run");
            assert_eq!(
                intervals.last().map(|i| i.span.end),
                Some(window.end),
                "seed {seed}, {hours}h"
            );
            assert_eq!(intervals.first().map(|i| i.span.start), Some(window.start));
            for pair in intervals.windows(2) {
                assert_eq!(pair[0].span.end, pair[1].span.start);
            }
        }
    }
}
