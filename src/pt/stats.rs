//! Online energy statistics consumed by the temperature controller.

/// Count and running mean of a stream of samples.
///
/// Only the mean is kept; the history is never stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMean {
    count: usize,
    mean: f64,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample using the incremental update `m += (x - m) / n`.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    /// Mean of the samples since the last [`clear`](Self::clear), or 0 if empty.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty() {
        let stats = RunningMean::new();
        assert!(stats.is_empty());
        assert_eq!(stats.mean(), 0.0);
    }

    #[test]
    fn test_mean_and_clear() {
        let mut stats = RunningMean::new();
        for x in [2.0, 4.0, 9.0] {
            stats.push(x);
        }
        assert_eq!(stats.count(), 3);
        assert!((stats.mean() - 5.0).abs() < 1e-12);

        stats.clear();
        assert!(stats.is_empty());
        stats.push(7.0);
        assert!((stats.mean() - 7.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_matches_batch_mean(values in prop::collection::vec(-1e6f64..1e6, 1..200)) {
            let mut stats = RunningMean::new();
            for &v in &values {
                stats.push(v);
            }
            let batch = values.iter().sum::<f64>() / values.len() as f64;
            prop_assert!((stats.mean() - batch).abs() <= 1e-6 * (1.0 + batch.abs()));
            prop_assert_eq!(stats.count(), values.len());
        }
    }
}
