#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use village_monitor::config::PowerConfig;
use village_monitor::demand::FixedDemand;
use village_monitor::error::{AppError, Result};
use village_monitor::history::{Fetcher, PowerLogSink, TelemetrySource};
use village_monitor::model::{
    Metric, MetricSample, OutboundMessage, PowerLogEntry, Selection, VillageDescriptor,
};
use village_monitor::publisher::Connection;
use village_monitor::registry::UnitRegistry;
use village_monitor::report::{ChannelReporter, ReportReceivers, Reporter};
use village_monitor::status::Classifier;
use village_monitor::PollContext;

pub fn sample(minute: u32, value: f64) -> MetricSample {
    MetricSample {
        timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 10, minute, 0).unwrap(),
        value,
    }
}

/// Serves a fixed RPM per unit, optionally after a delay. Other metrics return
/// one sample; units without an RPM entry fail every read.
#[derive(Default)]
pub struct ScriptedSource {
    rpm: HashMap<String, f64>,
    delays: HashMap<String, Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn with_rpm(mut self, unit: &str, rpm: f64) -> Self {
        self.rpm.insert(unit.to_string(), rpm);
        self
    }

    pub fn with_delay(mut self, unit: &str, delay: Duration) -> Self {
        self.delays.insert(unit.to_string(), delay);
        self
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn series(&self, selection: &Selection, metric: Metric) -> Result<Vec<MetricSample>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = selection.query_value();
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        let Some(rpm) = self.rpm.get(key) else {
            return Err(AppError::FetchFailed {
                metric,
                reason: "no such unit".into(),
            });
        };
        Ok(match metric {
            Metric::Rpm => vec![sample(2, *rpm), sample(0, 1.0)],
            _ => vec![sample(0, 42.0)],
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub entries: Mutex<Vec<PowerLogEntry>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl PowerLogSink for RecordingSink {
    async fn log_power(&self, entry: &PowerLogEntry) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::LogSinkFailed("sink offline".into()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingConnection {
    pub connected: AtomicBool,
    pub sent: Mutex<Vec<OutboundMessage>>,
    /// Topics ending with this suffix fail to send.
    pub fail_suffix: Mutex<Option<&'static str>>,
}

impl RecordingConnection {
    pub fn connected() -> Self {
        let c = Self::default();
        c.connected.store(true, Ordering::SeqCst);
        c
    }

    pub fn topics(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.topic.clone())
            .collect()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        if let Some(suffix) = *self.fail_suffix.lock().unwrap() {
            if message.topic.ends_with(suffix) {
                return Err(AppError::Mqtt("request channel closed".into()));
            }
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub fn registry(units: &[&str]) -> UnitRegistry {
    let villages: Vec<VillageDescriptor> = units
        .iter()
        .map(|id| VillageDescriptor {
            unit_id: id.to_string(),
            name: format!("Village {id}"),
            map_x: 0.0,
            map_y: 0.0,
            status: None,
        })
        .collect();
    UnitRegistry::build(&villages, &PowerConfig::default(), &Default::default())
}

pub fn context(
    source: Arc<ScriptedSource>,
    sink: Arc<RecordingSink>,
    demand_w: f64,
    interval: Duration,
) -> (PollContext, ReportReceivers) {
    let (reporter, rx) = ChannelReporter::new();
    let reporter: Arc<dyn Reporter> = Arc::new(reporter);
    let ctx = PollContext {
        fetcher: Fetcher::new(source, reporter.clone()),
        demand: Arc::new(FixedDemand(demand_w)),
        power_log: sink,
        registry: Arc::new(registry(&["u1", "u2"])),
        classifier: Classifier::default(),
        reporter,
        interval,
    };
    (ctx, rx)
}
