//! Heat tracker (§4.6): a per-entity access score in `[0, 1]`, boosted
//! on access and exponentially decayed on a background tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

const EVICTION_THRESHOLD: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Stable,
    Falling,
}

#[derive(Debug, Clone, Copy)]
pub struct AccessPattern {
    pub frequency: f64,
    pub recency: f64,
    pub trend: Trend,
}

struct Entry {
    score: f64,
    last_access: Instant,
    access_history: Vec<Instant>,
}

pub struct HeatTracker {
    entries: HashMap<String, Entry>,
    decay_interval: Duration,
    decay_factor: f64,
    hot_threshold: f64,
    cold_threshold: f64,
}

impl HeatTracker {
    pub fn new(decay_interval: Duration, decay_factor: f64, hot_threshold: f64, cold_threshold: f64) -> Self {
        Self {
            entries: HashMap::new(),
            decay_interval,
            decay_factor,
            hot_threshold,
            cold_threshold,
        }
    }

    pub fn record_access(&mut self, key: &str, weight: f64) {
        let now = Instant::now();
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            score: 0.0,
            last_access: now,
            access_history: Vec::new(),
        });
        entry.score = (entry.score + weight * 0.1).min(1.0);
        entry.last_access = now;
        entry.access_history.push(now);
        if entry.access_history.len() > 3 {
            entry.access_history.remove(0);
        }
    }

    pub fn score(&self, key: &str) -> f64 {
        self.entries.get(key).map(|e| e.score).unwrap_or(0.0)
    }

    pub fn is_hot(&self, key: &str) -> bool {
        self.score(key) >= self.hot_threshold
    }

    pub fn is_cold(&self, key: &str) -> bool {
        self.score(key) <= self.cold_threshold
    }

    /// Applies exponential decay to every entry and evicts those that
    /// fall below the eviction threshold. Intended to run on a fixed
    /// `decay_interval` tick.
    pub fn tick(&mut self) {
        let interval_secs = self.decay_interval.as_secs_f64().max(f64::EPSILON);
        let now = Instant::now();
        self.entries.retain(|_, entry| {
            let elapsed = now.duration_since(entry.last_access).as_secs_f64();
            let decay_steps = elapsed / interval_secs;
            entry.score *= self.decay_factor.powf(decay_steps);
            entry.score >= EVICTION_THRESHOLD
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_access_pattern(&self, key: &str) -> Option<AccessPattern> {
        let entry = self.entries.get(key)?;
        let now = Instant::now();
        let interval_secs = self.decay_interval.as_secs_f64().max(f64::EPSILON);

        let frequency = entry.access_history.len() as f64;
        let since_last = now.duration_since(entry.last_access).as_secs_f64();
        let recency = (1.0 - since_last / interval_secs).max(0.0);

        let trend = if entry.access_history.len() < 3 {
            Trend::Stable
        } else {
            let gaps: Vec<f64> = entry
                .access_history
                .windows(2)
                .map(|w| w[1].duration_since(w[0]).as_secs_f64().max(f64::EPSILON))
                .collect();
            let ratio = gaps[1] / gaps[0];
            if ratio < 0.8 {
                Trend::Rising
            } else if ratio > 1.25 {
                Trend::Falling
            } else {
                Trend::Stable
            }
        };

        Some(AccessPattern { frequency, recency, trend })
    }
}
