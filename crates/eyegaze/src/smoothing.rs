//! Linearly weighted moving average over recent gaze points.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Window size `N`; the newest `N - 1` samples carry weights `1..N`.
    pub window_size: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { window_size: 10 }
    }
}

/// Weighted smoother whose history starts filled with `(0, 0)`.
///
/// Early outputs are therefore pulled towards the origin until the window
/// has seen `N - 1` real samples.
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    weights: Vec<f64>,
    weight_sum: f64,
    history: VecDeque<[f64; 2]>,
}

impl GazeSmoother {
    pub fn new(window_size: usize) -> Self {
        let slots = window_size.saturating_sub(1).max(1);
        let weights: Vec<f64> = (1..=slots).map(|w| w as f64).collect();
        let weight_sum = weights.iter().sum();
        Self {
            weights,
            weight_sum,
            history: std::iter::repeat([0.0, 0.0]).take(slots).collect(),
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.window_size)
    }

    /// Push `sample` as the newest entry and return the smoothed point.
    pub fn push(&mut self, sample: [f64; 2]) -> [f64; 2] {
        self.history.pop_front();
        self.history.push_back(sample);
        let (sx, sy) = self
            .history
            .iter()
            .zip(&self.weights)
            .fold((0.0, 0.0), |(sx, sy), (p, w)| (sx + p[0] * w, sy + p[1] * w));
        [sx / self.weight_sum, sy / self.weight_sum]
    }

    /// Refill the history with zeros.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|p| *p = [0.0, 0.0]);
    }
}

impl Default for GazeSmoother {
    fn default() -> Self {
        Self::from_config(&SmoothingConfig::default())
    }
}
