use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Trend;

const TREND_CAPACITY: usize = 5;
const TREND_MIN_SAMPLES: usize = 3;
const TREND_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSample {
    #[serde(rename = "temp")]
    pub temperature: f64,
    #[serde(rename = "timestamp")]
    pub at: DateTime<Utc>,
}

/// Samples evicted by age: everything older than `window` before the newest
/// sample is dropped. Out-of-order samples are refused.
#[derive(Debug, Clone)]
pub struct TemperatureHistory {
    window: Duration,
    samples: VecDeque<TemperatureSample>,
}

impl TemperatureHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn from_samples(window: Duration, samples: impl IntoIterator<Item = TemperatureSample>) -> Self {
        let mut sorted: Vec<_> = samples
            .into_iter()
            .filter(|sample| sample.temperature.is_finite())
            .collect();
        sorted.sort_by_key(|sample| sample.at);

        let mut history = Self::new(window);
        for sample in sorted {
            history.push(sample);
        }
        history
    }

    pub fn push(&mut self, sample: TemperatureSample) -> bool {
        if self.samples.back().is_some_and(|last| sample.at < last.at) {
            return false;
        }
        self.samples.push_back(sample);

        let horizon = sample.at - self.window;
        while self.samples.front().is_some_and(|oldest| oldest.at < horizon) {
            self.samples.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemperatureSample> {
        self.samples.iter()
    }

    pub fn get(&self, index: usize) -> Option<&TemperatureSample> {
        self.samples.get(index)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Absolute-error samples evicted by count, oldest first.
#[derive(Debug, Clone)]
pub struct PerformanceHistory {
    capacity: usize,
    errors: VecDeque<f64>,
    total: u64,
}

impl PerformanceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            errors: VecDeque::with_capacity(capacity),
            total: 0,
        }
    }

    pub fn from_errors(capacity: usize, errors: impl IntoIterator<Item = f64>, total: u64) -> Self {
        let mut history = Self::new(capacity);
        for error in errors.into_iter().filter(|error| error.is_finite()) {
            history.push(error);
        }
        history.total = total.max(history.errors.len() as u64);
        history
    }

    pub fn push(&mut self, abs_error: f64) {
        if self.errors.len() == self.capacity {
            self.errors.pop_front();
        }
        self.errors.push_back(abs_error);
        self.total = self.total.saturating_add(1);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of samples ever pushed, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.errors.iter()
    }

    /// Mean and population standard deviation of the newest `count` samples.
    pub fn recent_stats(&self, count: usize) -> Option<(f64, f64)> {
        if count == 0 || self.errors.len() < count {
            return None;
        }
        let recent = self.errors.iter().skip(self.errors.len() - count);
        let mean = recent.clone().sum::<f64>() / count as f64;
        let variance = recent.map(|error| (error - mean).powi(2)).sum::<f64>() / count as f64;
        Some((mean, variance.sqrt()))
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.total = 0;
    }
}

/// The last few readings, used to label the short-term direction of travel.
#[derive(Debug, Clone, Default)]
pub struct TrendWindow {
    samples: VecDeque<f64>,
}

impl TrendWindow {
    pub fn from_samples(samples: impl IntoIterator<Item = f64>) -> Self {
        let mut window = Self::default();
        for sample in samples.into_iter().filter(|sample| sample.is_finite()) {
            window.push(sample);
        }
        window
    }

    pub fn push(&mut self, temperature: f64) {
        if self.samples.len() == TREND_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(temperature);
    }

    pub fn trend(&self) -> Trend {
        if self.samples.len() < TREND_MIN_SAMPLES {
            return Trend::Unknown;
        }
        let (Some(oldest), Some(newest)) = (self.samples.front(), self.samples.back()) else {
            return Trend::Unknown;
        };
        let delta = newest - oldest;
        if delta > TREND_THRESHOLD {
            Trend::Heating
        } else if delta < -TREND_THRESHOLD {
            Trend::Cooling
        } else {
            Trend::Stable
        }
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}
