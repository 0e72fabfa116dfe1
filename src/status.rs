//! Operating-status classification.
//!
//! A unit producing nothing is `Offline`. Otherwise the gap between power and
//! demand is compared against a fraction of rated capacity.

use std::fmt;

pub const DEFAULT_THRESHOLD_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Offline,
    Surplus,
    HighDemand,
    Normal,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Offline => "OFFLINE",
            Status::Surplus => "SURPLUS",
            Status::HighDemand => "HIGH DEMAND",
            Status::Normal => "NORMAL",
        }
    }

    /// Gauge colour used by the dashboard.
    pub fn color(&self) -> &'static str {
        match self {
            Status::Offline => "#4a4a4a",
            Status::Surplus => "#34d399",
            Status::HighDemand => "#f87171",
            Status::Normal => "#FFD700",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    pub threshold_fraction: f64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            threshold_fraction: DEFAULT_THRESHOLD_FRACTION,
        }
    }
}

impl Classifier {
    pub fn new(threshold_fraction: f64) -> Self {
        Self { threshold_fraction }
    }

    pub fn classify(&self, power: f64, demand: f64, capacity: f64) -> Status {
        if power == 0.0 {
            return Status::Offline;
        }
        let diff = power - demand;
        let threshold = self.threshold_fraction * capacity;
        if diff > threshold {
            Status::Surplus
        } else if diff < -threshold {
            Status::HighDemand
        } else {
            Status::Normal
        }
    }
}

/// Classify with the default 10% threshold.
pub fn classify(power: f64, demand: f64, capacity: f64) -> Status {
    Classifier::default().classify(power, demand, capacity)
}
