//! Ordered sequences of non-overlapping state intervals.
//!
//! A progression is a list of stages. Each stage holds its state for a
//! sampled dwell time, optionally re-enters itself, and then hands over to
//! the next stage. Intervals tile the window from its start to its end: the
//! last interval is clipped to the window end, and a non-cyclic progression
//! holds its final state until the window closes.

use chrono::Duration;
use rand::Rng;

use icusynth_core::Span;

use crate::errors::{SamplingError, Site};
use crate::sampler::BoundedSampler;

/// Time spent in one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Dwell {
    Fixed(Duration),
    UniformHours { min: i64, max: i64 },
    UniformDays { min: i64, max: i64 },
    /// Hours drawn from a bounded sampler; its lower bound must be positive.
    Hours(BoundedSampler),
    /// Holds until the window ends.
    UntilEnd,
}

impl Dwell {
    fn validate(&self, site: Site) -> Result<(), SamplingError> {
        let ok = match self {
            Dwell::Fixed(duration) => *duration > Duration::zero(),
            Dwell::UniformHours { min, max } | Dwell::UniformDays { min, max } => {
                *min > 0 && min <= max
            }
            Dwell::Hours(sampler) => sampler.lo > 0.0 && sampler.lo <= sampler.hi,
            Dwell::UntilEnd => true,
        };
        if ok {
            Ok(())
        } else {
            Err(SamplingError::invalid(site, "dwell time must be positive"))
        }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Option<Duration>, SamplingError> {
        Ok(match self {
            Dwell::Fixed(duration) => Some(*duration),
            Dwell::UniformHours { min, max } => Some(Duration::hours(rng.random_range(*min..=*max))),
            Dwell::UniformDays { min, max } => Some(Duration::days(rng.random_range(*min..=*max))),
            Dwell::Hours(sampler) => {
                let hours = sampler.sample(rng)?;
                Some(Duration::minutes(((hours * 60.0).round() as i64).max(1)))
            }
            Dwell::UntilEnd => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage<S> {
    pub state: S,
    pub dwell: Dwell,
    /// Probability of re-entering this stage after each dwell.
    pub repeat: f64,
}

impl<S> Stage<S> {
    pub fn new(state: S, dwell: Dwell) -> Self {
        Self {
            state,
            dwell,
            repeat: 0.0,
        }
    }

    pub fn repeating(mut self, repeat: f64) -> Self {
        self.repeat = repeat;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateInterval<S> {
    pub state: S,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StateProgression<S> {
    site: Site,
    stages: Vec<Stage<S>>,
    cyclic: bool,
}

impl<S: Clone> StateProgression<S> {
    pub fn new(site: Site, stages: Vec<Stage<S>>) -> Result<Self, SamplingError> {
        if stages.is_empty() {
            return Err(SamplingError::invalid(site, "progression has no stages"));
        }
        for stage in &stages {
            stage.dwell.validate(site)?;
            if !(0.0..=1.0).contains(&stage.repeat) {
                return Err(SamplingError::invalid(
                    site,
                    format!("repeat probability {} is outside [0, 1]", stage.repeat),
                ));
            }
        }
        Ok(Self {
            site,
            stages,
            cyclic: false,
        })
    }

    /// Restart from the first stage after the last one instead of stopping.
    pub fn cyclic(mut self) -> Self {
        self.cyclic = true;
        self
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn run<R: Rng + ?Sized>(
        &self,
        window: Span,
        rng: &mut R,
    ) -> Result<Vec<StateInterval<S>>, SamplingError> {
        let mut intervals = Vec::new();
        let mut cursor = window.start;
        let mut index = 0;

        while cursor < window.end {
            let stage = &self.stages[index];
            let end = match stage.dwell.draw(rng)? {
                Some(dwell) => (cursor + dwell).min(window.end),
                None => window.end,
            };
            intervals.push(StateInterval {
                state: stage.state.clone(),
                span: Span::new(cursor, end),
            });
            cursor = end;

            if stage.repeat > 0.0 && rng.random_bool(stage.repeat) {
                continue;
            }
            index += 1;
            if index == self.stages.len() {
                if !self.cyclic {
                    if let Some(last) = intervals.last_mut() {
                        last.span.end = window.end;
                    }
                    break;
                }
                index = 0;
            }
        }

        Ok(intervals)
    }
}
