//! Typed client over the external history service, plus the fetcher that
//! degrades failures to empty series.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HistoryConfig;
use crate::error::{AppError, Result};
use crate::model::{
    Metric, MetricSample, MetricSeries, MetricSet, PowerLogEntry, Selection, UnitSummary,
    VillageDescriptor,
};
use crate::report::Reporter;

/// Read side of the history service.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn series(&self, selection: &Selection, metric: Metric) -> Result<Vec<MetricSample>>;
}

/// Destination for power log entries.
#[async_trait]
pub trait PowerLogSink: Send + Sync {
    async fn log_power(&self, entry: &PowerLogEntry) -> Result<()>;
}

#[derive(Clone)]
pub struct HistoryClient {
    http: Client,
    base_url: String,
}

impl HistoryClient {
    pub fn new(cfg: &HistoryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// `GET /api/units`
    pub async fn units(&self) -> Result<Vec<UnitSummary>> {
        self.get("/api/units", &[]).await
    }

    /// `GET /api/villages/status`
    pub async fn villages(&self) -> Result<Vec<VillageDescriptor>> {
        self.get("/api/villages/status", &[]).await
    }
}

#[async_trait]
impl TelemetrySource for HistoryClient {
    async fn series(&self, selection: &Selection, metric: Metric) -> Result<Vec<MetricSample>> {
        let path = format!("/api/{}", metric.endpoint());
        self.get(&path, &[("unit", selection.query_value())]).await
    }
}

#[async_trait]
impl PowerLogSink for HistoryClient {
    async fn log_power(&self, entry: &PowerLogEntry) -> Result<()> {
        let url = format!("{}/api/log-power", self.base_url);
        self.http
            .post(&url)
            .json(entry)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::LogSinkFailed(e.to_string()))?;
        Ok(())
    }
}

/// Fetches metric series; a failed read becomes an empty series plus an advisory.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn TelemetrySource>,
    reporter: Arc<dyn Reporter>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn TelemetrySource>, reporter: Arc<dyn Reporter>) -> Self {
        Self { source, reporter }
    }

    pub async fn fetch_series(&self, selection: &Selection, metric: Metric) -> MetricSeries {
        match self.source.series(selection, metric).await {
            Ok(samples) => MetricSeries::new(samples),
            Err(e) => {
                let failure = match e {
                    e @ AppError::FetchFailed { .. } => e,
                    other => AppError::FetchFailed {
                        metric,
                        reason: other.to_string(),
                    },
                };
                warn!(unit = %selection, metric = %metric, error = %failure, "history fetch failed");
                self.reporter.on_log_entry(format!("⚠️ {failure}"));
                MetricSeries::empty()
            }
        }
    }

    /// The four reads run concurrently and resolve independently.
    pub async fn fetch_all(&self, selection: &Selection) -> MetricSet {
        let (temperature, rpm, water_level, vibration) = futures::join!(
            self.fetch_series(selection, Metric::Temperature),
            self.fetch_series(selection, Metric::Rpm),
            self.fetch_series(selection, Metric::WaterLevel),
            self.fetch_series(selection, Metric::Vibration),
        );
        MetricSet {
            temperature,
            rpm,
            water_level,
            vibration,
        }
    }
}
