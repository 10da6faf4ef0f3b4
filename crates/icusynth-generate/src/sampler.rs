//! Clamped draws from closed-form distributions.

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand_distr::{Gamma, LogNormal, Normal, Poisson};

use crate::errors::{SamplingError, Site};

/// Distribution family and parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Family {
    Normal { mean: f64, std_dev: f64 },
    Gamma { shape: f64, scale: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Uniform { low: f64, high: f64 },
    Poisson { lambda: f64 },
}

/// Shift applied before sampling to correlate measurements with an acute
/// state. Location moves by `mean_shift`, the spread parameter is
/// multiplied by `spread_scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Severity {
    pub mean_shift: f64,
    pub spread_scale: f64,
}

impl Severity {
    pub const fn shift(mean_shift: f64) -> Self {
        Self {
            mean_shift,
            spread_scale: 1.0,
        }
    }

    pub const fn new(mean_shift: f64, spread_scale: f64) -> Self {
        Self {
            mean_shift,
            spread_scale,
        }
    }
}

/// One numeric measurement: draw from `family`, clamp into `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedSampler {
    pub site: Site,
    pub family: Family,
    pub lo: f64,
    pub hi: f64,
}

impl BoundedSampler {
    pub const fn new(site: Site, family: Family, lo: f64, hi: f64) -> Self {
        Self {
            site,
            family,
            lo,
            hi,
        }
    }

    pub const fn normal(site: Site, mean: f64, std_dev: f64, lo: f64, hi: f64) -> Self {
        Self::new(site, Family::Normal { mean, std_dev }, lo, hi)
    }

    pub const fn gamma(site: Site, shape: f64, scale: f64, lo: f64, hi: f64) -> Self {
        Self::new(site, Family::Gamma { shape, scale }, lo, hi)
    }

    pub const fn log_normal(site: Site, mu: f64, sigma: f64, lo: f64, hi: f64) -> Self {
        Self::new(site, Family::LogNormal { mu, sigma }, lo, hi)
    }

    pub const fn uniform(site: Site, low: f64, high: f64) -> Self {
        Self::new(site, Family::Uniform { low, high }, low, high)
    }

    pub const fn poisson(site: Site, lambda: f64, lo: f64, hi: f64) -> Self {
        Self::new(site, Family::Poisson { lambda }, lo, hi)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, SamplingError> {
        self.sample_with(rng, None)
    }

    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        severity: Option<Severity>,
    ) -> Result<f64, SamplingError> {
        if !(self.lo.is_finite() && self.hi.is_finite()) || self.lo > self.hi {
            return Err(SamplingError::invalid(
                self.site,
                format!("bounds [{}, {}] are not an ordered finite range", self.lo, self.hi),
            ));
        }
        let (shift, spread) = match severity {
            Some(severity) => (severity.mean_shift, severity.spread_scale),
            None => (0.0, 1.0),
        };
        if !(shift.is_finite() && spread.is_finite() && spread >= 0.0) {
            return Err(SamplingError::invalid(self.site, "severity must be finite"));
        }

        let raw = match self.family {
            Family::Normal { mean, std_dev } => Normal::new(mean + shift, std_dev * spread)
                .map_err(|err| SamplingError::invalid(self.site, err.to_string()))?
                .sample(rng),
            Family::Gamma { shape, scale } => {
                Gamma::new(shape, scale * spread)
                    .map_err(|err| SamplingError::invalid(self.site, err.to_string()))?
                    .sample(rng)
                    + shift
            }
            Family::LogNormal { mu, sigma } => {
                LogNormal::new(mu, sigma * spread)
                    .map_err(|err| SamplingError::invalid(self.site, err.to_string()))?
                    .sample(rng)
                    + shift
            }
            Family::Uniform { low, high } => {
                if !(low.is_finite() && high.is_finite()) || low > high {
                    return Err(SamplingError::invalid(
                        self.site,
                        format!("uniform range [{low}, {high}] is empty"),
                    ));
                }
                let center = (low + high) / 2.0 + shift;
                let half = (high - low) / 2.0 * spread;
                rng.random_range((center - half)..=(center + half))
            }
            Family::Poisson { lambda } => Poisson::new(lambda + shift)
                .map_err(|err| SamplingError::invalid(self.site, err.to_string()))?
                .sample(rng),
        };

        if raw.is_nan() {
            return Err(SamplingError::invalid(self.site, "draw produced NaN"));
        }
        Ok(raw.clamp(self.lo, self.hi))
    }

    /// Draw, round to `decimals`, and clamp again so rounding cannot escape.
    pub fn sample_rounded<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        decimals: u32,
        severity: Option<Severity>,
    ) -> Result<f64, SamplingError> {
        let value = self.sample_with(rng, severity)?;
        Ok(round_to(value, decimals).clamp(self.lo, self.hi))
    }

    /// Draw and truncate toward zero, like an integer cast of the raw value.
    pub fn sample_whole<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<i64, SamplingError> {
        let value = self.sample(rng)?.trunc();
        Ok(value.clamp(self.lo.ceil(), self.hi.floor()) as i64)
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Discrete choice among items with relative weights.
#[derive(Debug, Clone)]
pub struct Categorical<T> {
    site: Site,
    items: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T> Categorical<T> {
    pub fn new(site: Site, weighted: Vec<(T, f64)>) -> Result<Self, SamplingError> {
        let (items, weights): (Vec<T>, Vec<f64>) = weighted.into_iter().unzip();
        if items.is_empty() {
            return Err(SamplingError::invalid(site, "no categories"));
        }
        let index = WeightedIndex::new(&weights)
            .map_err(|err| SamplingError::invalid(site, err.to_string()))?;
        Ok(Self { site, items, index })
    }

    /// Equal weights for every item.
    pub fn uniform(site: Site, items: Vec<T>) -> Result<Self, SamplingError> {
        Self::new(site, items.into_iter().map(|item| (item, 1.0)).collect())
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.items[self.index.sample(rng)]
    }
}

impl<T: Copy> Categorical<T> {
    pub fn pick_copied<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        *self.pick(rng)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const SITE: Site = Site::new("vitals", "heart_rate");

    #[test]
    fn severity_shifts_the_center() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let sampler = BoundedSampler::normal(SITE, 75.0, 5.0, 0.0, 300.0);
        let calm: f64 = (0..2000)
            .map(|_| sampler.sample(&mut rng).expect("sample"))
            .sum::<f64>()
            / 2000.0;
        let severe: f64 = (0..2000)
            .map(|_| {
                sampler
                    .sample_with(&mut rng, Some(Severity::shift(15.0)))
                    .expect("sample")
            })
            .sum::<f64>()
            / 2000.0;
        assert!((calm - 75.0).abs() < 1.0);
        assert!((severe - 90.0).abs() < 1.0);
    }

    #[test]
    fn negative_std_dev_names_the_site() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let sampler = BoundedSampler::normal(SITE, 75.0, -1.0, 0.0, 300.0);
        let err = sampler.sample(&mut rng).expect_err("negative std dev");
        assert!(err.to_string().contains("vitals.heart_rate"));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let sampler = BoundedSampler::normal(SITE, 75.0, 1.0, 10.0, 5.0);
        assert!(sampler.sample(&mut rng).is_err());
    }

    #[test]
    fn whole_values_respect_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let sampler = BoundedSampler::gamma(Site::new("patient", "age"), 7.5, 8.5, 18.0, 105.0);
        for _ in 0..5000 {
            let age = sampler.sample_whole(&mut rng).expect("sample");
            assert!((18..=105).contains(&age));
        }
    }

    #[test]
    fn categorical_follows_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let choice = Categorical::new(SITE, vec![("a", 0.9), ("b", 0.1)]).expect("weights");
        let hits = (0..10_000).filter(|_| *choice.pick(&mut rng) == "a").count();
        assert!((8_700..9_300).contains(&hits));
    }

    #[test]
    fn categorical_rejects_empty_and_zero_weights() {
        assert!(Categorical::<&str>::new(SITE, Vec::new()).is_err());
        assert!(Categorical::new(SITE, vec![("a", 0.0)]).is_err());
        assert!(Categorical::new(SITE, vec![("a", -1.0), ("b", 2.0)]).is_err());
    }
}
