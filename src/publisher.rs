//! Maps sensor values to `gnt/<unit>/<suffix>` messages and sends them.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::debounce::{DebounceAction, Debouncer};
use crate::error::{AppError, Result};
use crate::model::{OutboundMessage, SensorKind, SensorValueSet};
use crate::report::Reporter;

pub const TOPIC_ROOT: &str = "gnt";

/// Broker connection seen by the publisher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

pub fn topic_base(unit_id: &str) -> String {
    format!("{TOPIC_ROOT}/{unit_id}")
}

/// One message per sensor, in publish order.
pub fn build_messages(unit_id: &str, values: &SensorValueSet) -> Vec<OutboundMessage> {
    let base = topic_base(unit_id);
    SensorKind::ALL
        .iter()
        .map(|kind| {
            let mut payload = Map::new();
            payload.insert(kind.field_name().to_string(), number(values.get(*kind)));
            OutboundMessage {
                topic: format!("{base}{}", kind.topic_suffix()),
                payload: Value::Object(payload),
            }
        })
        .collect()
}

/// Whole numbers go out as JSON integers, the way the slider emits them.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

struct Sender<C> {
    connection: Arc<C>,
    reporter: Arc<dyn Reporter>,
}

impl<C: Connection> Sender<C> {
    async fn publish(&self, unit_id: &str, values: &SensorValueSet) -> Result<usize> {
        if !self.connection.is_connected() {
            self.reporter
                .on_log_entry("❌ Not connected to Broker.".to_string());
            return Err(AppError::NotConnected);
        }

        let messages = build_messages(unit_id, values);
        let count = messages.len();
        for message in messages {
            let topic = message.topic.clone();
            let shown = message.payload.to_string();
            if let Err(e) = self.connection.send(message).await {
                warn!(topic = %topic, error = %e, "publish failed");
                self.reporter.on_log_entry(format!("❌ {e}"));
                return Err(e);
            }
            debug!(topic = %topic, payload = %shown, "published");
            self.reporter
                .on_log_entry(format!("➡️ Sent {shown} to {topic}"));
        }
        info!(unit = %unit_id, count, "sensor readings published");
        Ok(count)
    }
}

pub struct Publisher<C> {
    sender: Arc<Sender<C>>,
    debouncer: Debouncer<String, SensorValueSet>,
}

impl<C: Connection + 'static> Publisher<C> {
    pub fn new(connection: Arc<C>, reporter: Arc<dyn Reporter>) -> Self {
        let sender = Arc::new(Sender {
            connection,
            reporter,
        });
        let action: DebounceAction<String, SensorValueSet> = {
            let sender = sender.clone();
            Arc::new(move |unit_id, values| {
                let sender = sender.clone();
                Box::pin(async move {
                    if let Err(e) = sender.publish(&unit_id, &values).await {
                        warn!(unit = %unit_id, error = %e, "debounced publish failed");
                    }
                })
            })
        };
        Self {
            sender,
            debouncer: Debouncer::new(action),
        }
    }

    /// Send all four readings now. Fails fast, sending nothing, when the
    /// connection is down.
    pub async fn publish(&self, unit_id: &str, values: &SensorValueSet) -> Result<usize> {
        self.sender.publish(unit_id, values).await
    }

    /// Publish `values` once `delay` passes without another call for `unit_id`.
    pub fn publish_debounced(&self, unit_id: &str, values: SensorValueSet, delay: Duration) {
        self.debouncer.schedule(unit_id.to_string(), values, delay);
    }

    pub fn cancel_pending(&self, unit_id: &str) -> bool {
        self.debouncer.cancel(&unit_id.to_string())
    }

    pub fn shutdown(&self) {
        self.debouncer.cancel_all();
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.sender.connection
    }
}
