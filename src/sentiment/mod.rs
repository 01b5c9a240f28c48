//! Sentiment capture and analysis.
//!
//! The external frame analyzer emits one integer per line on stdout:
//! -1 (frustrated), 0 (neutral), 1 (happy). This module owns the typed
//! sample model, the bounded rolling history, and the trend derivation
//! shared by the process wrapper, the WebSocket channel, and the REST
//! analytics endpoints.

pub mod channel;
pub mod process;

pub use process::{SentimentEvent, SentimentService};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One discrete emotional-state reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentSample {
    /// Discrete sentiment level: -1, 0, or 1.
    pub value: i8,
    /// Capture time in epoch milliseconds.
    pub timestamp: i64,
    /// Optional classifier confidence in `0.0..=1.0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl SentimentSample {
    /// Create a sample stamped with the current wall clock.
    pub fn now(value: i8) -> Self {
        Self {
            value,
            timestamp: chrono::Utc::now().timestamp_millis(),
            confidence: None,
        }
    }

    /// Human-readable label for the sample value.
    pub fn label(&self) -> &'static str {
        sentiment_label(f64::from(self.value))
    }
}

/// Qualitative direction of recent sentiment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentTrend {
    Improving,
    Declining,
    #[default]
    Stable,
}

impl std::fmt::Display for SentimentTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        };
        f.write_str(label)
    }
}

/// Mean difference between window halves required to leave `Stable`.
pub const TREND_THRESHOLD: f64 = 0.2;

/// Minimum samples in the window before a trend can be derived.
pub const TREND_MIN_SAMPLES: usize = 3;

/// Label for a sentiment value on the -1..=1 scale.
pub fn sentiment_label(value: f64) -> &'static str {
    if value > 0.0 {
        "Happy"
    } else if value < 0.0 {
        "Frustrated"
    } else {
        "Neutral"
    }
}

/// Bounded, oldest-first ring buffer of sentiment samples.
#[derive(Debug, Clone)]
pub struct SentimentHistory {
    samples: VecDeque<SentimentSample>,
    capacity: usize,
}

impl Default for SentimentHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SentimentHistory {
    /// Create a history with the given ring-buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, evicting the oldest on overflow.
    pub fn push(&mut self, sample: SentimentSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<SentimentSample> {
        self.samples.back().copied()
    }

    /// The most recent `limit` samples, oldest-first.
    pub fn recent(&self, limit: usize) -> Vec<SentimentSample> {
        let skip = self.samples.len().saturating_sub(limit);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Mean value of samples within `window_ms` of `now_ms`; 0.0 if none.
    pub fn average(&self, window_ms: i64, now_ms: i64) -> f64 {
        let recent: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| now_ms - s.timestamp < window_ms)
            .map(|s| f64::from(s.value))
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().sum::<f64>() / recent.len() as f64
    }

    /// Trend over samples within `window_ms` of `now_ms`.
    ///
    /// `Stable` unless at least [`TREND_MIN_SAMPLES`] samples fall in the
    /// window; otherwise the filtered samples are split at the midpoint and
    /// the signed difference of half means is classified against
    /// ±[`TREND_THRESHOLD`].
    pub fn trend(&self, window_ms: i64, now_ms: i64) -> SentimentTrend {
        let recent: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| now_ms - s.timestamp < window_ms)
            .map(|s| f64::from(s.value))
            .collect();
        trend_of_values(&recent)
    }
}

/// Classify a chronological value sequence by comparing half means.
pub fn trend_of_values(values: &[f64]) -> SentimentTrend {
    if values.len() < TREND_MIN_SAMPLES {
        return SentimentTrend::Stable;
    }

    let midpoint = values.len() / 2;
    let (first, second) = values.split_at(midpoint);
    let first_avg = first.iter().sum::<f64>() / first.len() as f64;
    let second_avg = second.iter().sum::<f64>() / second.len() as f64;
    let diff = second_avg - first_avg;

    if diff > TREND_THRESHOLD {
        SentimentTrend::Improving
    } else if diff < -TREND_THRESHOLD {
        SentimentTrend::Declining
    } else {
        SentimentTrend::Stable
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn sample_at(value: i8, timestamp: i64) -> SentimentSample {
        SentimentSample {
            value,
            timestamp,
            confidence: None,
        }
    }

    #[test]
    fn history_evicts_oldest_on_overflow() {
        let mut history = SentimentHistory::new(3);
        for (i, v) in [1, 0, -1, 1].iter().enumerate() {
            history.push(sample_at(*v, i as i64));
        }
        let values: Vec<i8> = history.recent(10).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![0, -1, 1]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn recent_is_oldest_first_and_bounded() {
        let mut history = SentimentHistory::new(100);
        for i in 0..10 {
            history.push(sample_at((i % 2) as i8, i));
        }
        let recent = history.recent(4);
        assert_eq!(recent.len(), 4);
        assert!(recent.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn average_ignores_samples_outside_window() {
        let mut history = SentimentHistory::new(100);
        history.push(sample_at(1, 0));
        history.push(sample_at(-1, 9_000));
        history.push(sample_at(-1, 9_500));
        // Window of 2s from t=10s excludes the t=0 sample.
        assert_eq!(history.average(2_000, 10_000), -1.0);
    }

    #[test]
    fn average_of_empty_window_is_zero() {
        let history = SentimentHistory::new(100);
        assert_eq!(history.average(30_000, 1_000_000), 0.0);
    }

    #[test]
    fn trend_is_stable_below_minimum_samples() {
        assert_eq!(trend_of_values(&[]), SentimentTrend::Stable);
        assert_eq!(trend_of_values(&[1.0, -1.0]), SentimentTrend::Stable);
    }

    #[test]
    fn trend_declines_when_second_half_mean_drops() {
        let values = [0.8, 0.7, 0.6, -0.6, -0.7, -0.8];
        assert_eq!(trend_of_values(&values), SentimentTrend::Declining);
    }

    #[test]
    fn trend_improves_when_second_half_mean_rises() {
        let values = [-1.0, -1.0, 1.0, 1.0];
        assert_eq!(trend_of_values(&values), SentimentTrend::Improving);
    }

    #[test]
    fn trend_is_stable_within_threshold() {
        let values = [0.0, 0.1, 0.0, 0.1];
        assert_eq!(trend_of_values(&values), SentimentTrend::Stable);
    }

    #[test]
    fn label_maps_sign_to_name() {
        assert_eq!(sentiment_label(1.0), "Happy");
        assert_eq!(sentiment_label(-0.2), "Frustrated");
        assert_eq!(sentiment_label(0.0), "Neutral");
    }
}
