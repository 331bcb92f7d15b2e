//! Round-trip latency estimation over a bounded window of samples.

use crate::LATENCY_SAMPLES;
use std::collections::VecDeque;

/// Median-filtered latency estimate.
///
/// The median is used instead of the mean so a single jitter spike does not
/// move the render delay.
#[derive(Debug, Clone)]
pub struct LatencyEstimator {
    samples: VecDeque<u64>,
    capacity: usize,
    median: u64,
}

impl LatencyEstimator {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            median: 0,
        }
    }

    /// Records the echo of a timestamp we sent at `echoed` and received
    /// back at `now` (both milliseconds). Returns the one-way sample.
    pub fn record_echo(&mut self, now: u64, echoed: u64) -> u64 {
        let sample = now.saturating_sub(echoed) / 2;
        self.push_sample(sample);
        sample
    }

    pub fn push_sample(&mut self, sample: u64) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.median = median(self.samples.iter().copied().collect());
    }

    /// Current estimate in milliseconds; zero before the first sample.
    pub fn median(&self) -> u64 {
        self.median
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Default for LatencyEstimator {
    fn default() -> Self {
        Self::new(LATENCY_SAMPLES)
    }
}

/// Median by partial selection. Even-length inputs average the two middle
/// values.
pub fn median(mut values: Vec<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }

    let len = values.len();
    let mid = len / 2;
    let (lower, upper, _) = values.select_nth_unstable(mid);
    let upper = *upper;

    if len % 2 == 0 {
        let lower_max = lower.iter().copied().max().unwrap_or(upper);
        (lower_max + upper) / 2
    } else {
        upper
    }
}
