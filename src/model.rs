use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::status::Status;

/// What the dashboard is looking at: one unit, or the fleet aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selection {
    All,
    Unit(String),
}

impl Selection {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("all") {
            Selection::All
        } else {
            Selection::Unit(raw.to_string())
        }
    }

    /// Value used for the `unit=` query parameter of the history API.
    pub fn query_value(&self) -> &str {
        match self {
            Selection::All => "all",
            Selection::Unit(id) => id,
        }
    }

    pub fn unit_id(&self) -> Option<&str> {
        match self {
            Selection::All => None,
            Selection::Unit(id) => Some(id),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.query_value())
    }
}

/// Time series served by the history service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    Rpm,
    WaterLevel,
    Vibration,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::Rpm,
        Metric::WaterLevel,
        Metric::Vibration,
    ];

    pub fn endpoint(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature-history",
            Metric::Rpm => "rpm-history",
            Metric::WaterLevel => "level-history",
            Metric::Vibration => "vibration-history",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Temperature => "temperature",
            Metric::Rpm => "rpm",
            Metric::WaterLevel => "water_level",
            Metric::Vibration => "vibration",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Ordered (ascending timestamp) samples for one metric. May be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    samples: Vec<MetricSample>,
}

impl MetricSeries {
    pub fn new(mut samples: Vec<MetricSample>) -> Self {
        // stable: samples sharing a timestamp keep service order
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.last()
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The four series fetched by one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    pub temperature: MetricSeries,
    pub rpm: MetricSeries,
    pub water_level: MetricSeries,
    pub vibration: MetricSeries,
}

impl MetricSet {
    pub fn get(&self, metric: Metric) -> &MetricSeries {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Rpm => &self.rpm,
            Metric::WaterLevel => &self.water_level,
            Metric::Vibration => &self.vibration,
        }
    }
}

/// Snapshot produced by one aggregator cycle. Replaced wholesale by the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub selection: Selection,
    pub series: MetricSet,
    pub power_w: f64,
    pub demand_w: f64,
    pub capacity_w: f64,
    pub status: Status,
    pub produced_at: DateTime<Utc>,
}

impl PollResult {
    pub fn summary(&self) -> String {
        format!(
            "[{}] power {:.2} kW | demand {:.2} kW | capacity {:.2} kW | {}",
            self.selection,
            self.power_w / 1000.0,
            self.demand_w / 1000.0,
            self.capacity_w / 1000.0,
            self.status
        )
    }
}

/// Rating used by the power estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitRating {
    pub capacity_w: f64,
    pub max_rpm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub map_x: f64,
    pub map_y: f64,
    pub rating: UnitRating,
}

/// Row of `GET /api/units`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit_id: String,
    pub unit_name: String,
}

/// Row of `GET /api/villages/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VillageDescriptor {
    pub unit_id: String,
    pub name: String,
    pub map_x: f64,
    pub map_y: f64,
    #[serde(default)]
    pub status: Option<String>,
}

impl VillageDescriptor {
    pub fn pin(&self) -> Status {
        match self.status.as_deref().unwrap_or("normal") {
            "surplus" => Status::Surplus,
            "demand" => Status::HighDemand,
            _ => Status::Normal,
        }
    }
}

/// Body of `POST /api/log-power`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerLogEntry {
    pub unit_id: String,
    pub current_power: f64,
    pub city_demand: f64,
}

/// Simulated sensors driven by the slider panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Vibration,
    Rpm,
    WaterLevel,
}

impl SensorKind {
    /// Publish order.
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Vibration,
        SensorKind::Rpm,
        SensorKind::WaterLevel,
    ];

    pub fn topic_suffix(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "/temp",
            SensorKind::Vibration => "/vibration",
            SensorKind::Rpm => "/rpm",
            SensorKind::WaterLevel => "/level",
        }
    }

    /// JSON field name expected by the downstream ingest schema.
    pub fn field_name(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Vibration => "vibration",
            SensorKind::Rpm => "rpm",
            SensorKind::WaterLevel => "water",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::Vibration => "Vibration",
            SensorKind::Rpm => "RPM Sensor",
            SensorKind::WaterLevel => "Water Level",
        }
    }

    /// Slider bounds, inclusive.
    pub fn range(&self) -> (f64, f64) {
        match self {
            SensorKind::Temperature => (0.0, 100.0),
            SensorKind::Vibration => (0.0, 10_000.0),
            SensorKind::Rpm => (0.0, 8_000.0),
            SensorKind::WaterLevel => (0.0, 1_000.0),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "temp" | "temperature" => Some(SensorKind::Temperature),
            "vibration" | "vib" => Some(SensorKind::Vibration),
            "rpm" => Some(SensorKind::Rpm),
            "level" | "water" | "water_level" => Some(SensorKind::WaterLevel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorValueSet {
    pub temperature: f64,
    pub vibration: f64,
    pub rpm: f64,
    pub water_level: f64,
}

impl Default for SensorValueSet {
    fn default() -> Self {
        Self {
            temperature: 58.0,
            vibration: 7069.0,
            rpm: 5479.0,
            water_level: 347.0,
        }
    }
}

impl SensorValueSet {
    pub fn get(&self, kind: SensorKind) -> f64 {
        match kind {
            SensorKind::Temperature => self.temperature,
            SensorKind::Vibration => self.vibration,
            SensorKind::Rpm => self.rpm,
            SensorKind::WaterLevel => self.water_level,
        }
    }

    pub fn set(&mut self, kind: SensorKind, value: f64) {
        match kind {
            SensorKind::Temperature => self.temperature = value,
            SensorKind::Vibration => self.vibration = value,
            SensorKind::Rpm => self.rpm = value,
            SensorKind::WaterLevel => self.water_level = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// The history service has been seen emitting both RFC 3339 strings and epoch millis.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
        Float(f64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
        Raw::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        Raw::Float(ms) if ms.is_finite() => Utc
            .timestamp_millis_opt(ms.round() as i64)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        Raw::Float(ms) => Err(serde::de::Error::custom(format!("invalid timestamp: {ms}"))),
    }
}
