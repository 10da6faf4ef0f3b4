//! Exact-count rate matching for per-row boolean outcomes.

use rand::Rng;

use crate::errors::SamplingError;

/// Draws row-by-row outcomes whose final positive count is exactly
/// `round(rate * total)`.
///
/// Each row is positive with probability `remaining_needed / remaining_slots`
/// clamped to `[0, 1]`, which behaves like sampling without replacement.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    name: String,
    total: usize,
    target: usize,
    position: usize,
    positives: usize,
}

impl QuotaTracker {
    pub fn new(name: &str, total: usize, rate: f64) -> Result<Self, SamplingError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(SamplingError::InvalidRate {
                name: name.to_string(),
                rate,
            });
        }
        let target = ((rate * total as f64).round() as usize).min(total);
        Ok(Self {
            name: name.to_string(),
            total,
            target,
            position: 0,
            positives: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn positives(&self) -> usize {
        self.positives
    }

    /// Probability the next row is positive.
    pub fn probability(&self) -> f64 {
        let remaining_slots = self.total.saturating_sub(self.position);
        if remaining_slots == 0 {
            return 0.0;
        }
        let remaining_needed = self.target as f64 - self.positives as f64;
        (remaining_needed / remaining_slots as f64).clamp(0.0, 1.0)
    }

    /// Decide the outcome of the next row. Rows past `total` are negative.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let probability = self.probability();
        let draw: f64 = rng.random();
        if self.position < self.total {
            self.position += 1;
        }
        let positive = draw < probability;
        if positive {
            self.positives += 1;
        }
        positive
    }

    /// Outcomes for every row at once, in row order.
    pub fn assign_all<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<bool> {
        (0..self.total).map(|_| self.next(rng)).collect()
    }

    pub fn achieved_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.positives as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn hits_exact_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut tracker = QuotaTracker::new("imv", 500, 0.356).expect("valid rate");
        let outcomes = tracker.assign_all(&mut rng);
        assert_eq!(tracker.target(), 178);
        assert_eq!(outcomes.iter().filter(|positive| **positive).count(), 178);
        assert_eq!(tracker.positives(), 178);
    }

    #[test]
    fn exact_for_many_seeds_and_sizes() {
        for seed in 0..20 {
            for (total, rate) in [(5, 0.4), (37, 0.02), (120, 0.999), (1, 0.5), (0, 0.3)] {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let mut tracker = QuotaTracker::new("x", total, rate).expect("valid rate");
                tracker.assign_all(&mut rng);
                let expected = (rate * total as f64).round() as usize;
                assert_eq!(tracker.positives(), expected, "seed {seed} total {total}");
            }
        }
    }

    #[test]
    fn rows_past_total_are_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut tracker = QuotaTracker::new("x", 2, 1.0).expect("valid rate");
        assert!(tracker.next(&mut rng));
        assert!(tracker.next(&mut rng));
        assert!(!tracker.next(&mut rng));
        assert_eq!(tracker.probability(), 0.0);
    }

    #[test]
    fn rejects_rates_outside_unit_interval() {
        assert!(matches!(
            QuotaTracker::new("vaso", 10, -0.1),
            Err(SamplingError::InvalidRate { .. })
        ));
        assert!(QuotaTracker::new("vaso", 10, f64::NAN).is_err());
    }
}
