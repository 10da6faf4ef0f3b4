//! Monotonic event timestamps inside a half-open window.

use chrono::{Duration, NaiveDateTime};
use rand::Rng;

use icusynth_core::Span;

use crate::errors::{SamplingError, Site};
use crate::sampler::Categorical;

/// How far apart consecutive events are.
#[derive(Debug, Clone, PartialEq)]
pub enum IntervalPolicy {
    Fixed(Duration),
    /// Whole hours drawn uniformly from `min..=max`.
    UniformHours { min: i64, max: i64 },
    /// Whole days drawn uniformly from `min..=max`.
    UniformDays { min: i64, max: i64 },
    Weighted(Vec<(Duration, f64)>),
    /// `early` applies until `until` has elapsed since the window start,
    /// `late` afterwards.
    Phased {
        until: Duration,
        early: Box<IntervalPolicy>,
        late: Box<IntervalPolicy>,
    },
}

impl IntervalPolicy {
    pub fn hours(hours: i64) -> Self {
        IntervalPolicy::Fixed(Duration::hours(hours))
    }
}

#[derive(Debug, Clone)]
enum Step {
    Fixed(Duration),
    UniformHours(i64, i64),
    UniformDays(i64, i64),
    Weighted(Categorical<Duration>),
    Phased {
        until: Duration,
        early: Box<Step>,
        late: Box<Step>,
    },
}

impl Step {
    fn compile(site: Site, policy: &IntervalPolicy) -> Result<Self, SamplingError> {
        match policy {
            IntervalPolicy::Fixed(interval) => {
                if *interval <= Duration::zero() {
                    return Err(SamplingError::invalid(site, "interval must be positive"));
                }
                Ok(Step::Fixed(*interval))
            }
            IntervalPolicy::UniformHours { min, max } => {
                check_range(site, *min, *max)?;
                Ok(Step::UniformHours(*min, *max))
            }
            IntervalPolicy::UniformDays { min, max } => {
                check_range(site, *min, *max)?;
                Ok(Step::UniformDays(*min, *max))
            }
            IntervalPolicy::Weighted(options) => {
                if options.iter().any(|(interval, _)| *interval <= Duration::zero()) {
                    return Err(SamplingError::invalid(site, "interval must be positive"));
                }
                Ok(Step::Weighted(Categorical::new(site, options.clone())?))
            }
            IntervalPolicy::Phased { until, early, late } => Ok(Step::Phased {
                until: *until,
                early: Box::new(Step::compile(site, early)?),
                late: Box::new(Step::compile(site, late)?),
            }),
        }
    }

    fn draw<R: Rng + ?Sized>(&self, elapsed: Duration, rng: &mut R) -> Duration {
        match self {
            Step::Fixed(interval) => *interval,
            Step::UniformHours(min, max) => Duration::hours(rng.random_range(*min..=*max)),
            Step::UniformDays(min, max) => Duration::days(rng.random_range(*min..=*max)),
            Step::Weighted(choice) => choice.pick_copied(rng),
            Step::Phased { until, early, late } => {
                if elapsed < *until {
                    early.draw(elapsed, rng)
                } else {
                    late.draw(elapsed, rng)
                }
            }
        }
    }
}

fn check_range(site: Site, min: i64, max: i64) -> Result<(), SamplingError> {
    if min <= 0 || min > max {
        return Err(SamplingError::invalid(
            site,
            format!("interval range {min}..={max} must be positive and ordered"),
        ));
    }
    Ok(())
}

/// Yields `start, start + d1, start + d1 + d2, ...` while strictly before
/// the window end. An empty window yields nothing.
#[derive(Debug, Clone)]
pub struct EventSequencer {
    window: Span,
    cursor: Option<NaiveDateTime>,
    step: Step,
}

impl EventSequencer {
    pub fn new(site: Site, window: Span, policy: &IntervalPolicy) -> Result<Self, SamplingError> {
        let step = Step::compile(site, policy)?;
        let cursor = (!window.is_empty()).then_some(window.start);
        Ok(Self {
            window,
            cursor,
            step,
        })
    }

    /// Next event time, or `None` once the window is exhausted.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<NaiveDateTime> {
        let current = self.cursor?;
        if current >= self.window.end {
            self.cursor = None;
            return None;
        }
        let interval = self.step.draw(current - self.window.start, rng);
        self.cursor = Some(current + interval);
        Some(current)
    }

    pub fn collect<R: Rng + ?Sized>(mut self, rng: &mut R) -> Vec<NaiveDateTime> {
        let mut times = Vec::new();
        while let Some(time) = self.advance(rng) {
            times.push(time);
        }
        times
    }
}

/// All event times of `policy` inside `window`.
pub fn event_times<R: Rng + ?Sized>(
    site: Site,
    window: Span,
    policy: &IntervalPolicy,
    rng: &mut R,
) -> Result<Vec<NaiveDateTime>, SamplingError> {
    Ok(EventSequencer::new(site, window, policy)?.collect(rng))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const SITE: Site = Site::new("vitals", "recorded_dttm");

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn fixed_interval_is_half_open() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let times = event_times(
            SITE,
            Span::new(ts(0), ts(10)),
            &IntervalPolicy::hours(4),
            &mut rng,
        )
        .expect("valid policy");
        assert_eq!(times, vec![ts(0), ts(4), ts(8)]);

        let exact = event_times(
            SITE,
            Span::new(ts(0), ts(8)),
            &IntervalPolicy::hours(4),
            &mut rng,
        )
        .expect("valid policy");
        assert_eq!(exact, vec![ts(0), ts(4)]);
    }

    #[test]
    fn empty_window_yields_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let times = event_times(
            SITE,
            Span::new(ts(5), ts(5)),
            &IntervalPolicy::hours(1),
            &mut rng,
        )
        .expect("valid policy");
        assert!(times.is_empty());
    }

    #[test]
    fn non_positive_intervals_are_rejected() {
        let window = Span::new(ts(0), ts(10));
        assert!(EventSequencer::new(SITE, window, &IntervalPolicy::hours(0)).is_err());
        assert!(
            EventSequencer::new(SITE, window, &IntervalPolicy::UniformHours { min: 0, max: 3 })
                .is_err()
        );
        assert!(
            EventSequencer::new(
                SITE,
                window,
                &IntervalPolicy::Weighted(vec![(Duration::hours(-1), 1.0)])
            )
            .is_err()
        );
    }

    #[test]
    fn phased_policy_switches_after_cutoff() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let policy = IntervalPolicy::Phased {
            until: Duration::hours(3),
            early: Box::new(IntervalPolicy::hours(1)),
            late: Box::new(IntervalPolicy::hours(4)),
        };
        let times = event_times(SITE, Span::new(ts(0), ts(12)), &policy, &mut rng)
            .expect("valid policy");
        assert_eq!(times, vec![ts(0), ts(1), ts(2), ts(3), ts(7), ts(11)]);
    }

    #[test]
    fn random_intervals_stay_ordered_and_inside() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let window = Span::new(ts(0), ts(23));
        let policy = IntervalPolicy::UniformHours { min: 1, max: 5 };
        let times = event_times(SITE, window, &policy, &mut rng).expect("valid policy");
        assert_eq!(times.first(), Some(&ts(0)));
        assert!(times.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(times.iter().all(|time| *time < window.end));
    }
}
