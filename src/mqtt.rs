use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

// Use the MQTT v5 API surface only
use rumqttc::v5 as mqtt5;
use rumqttc::Transport;

use crate::config::MqttConfig;
use crate::error::{AppError, Result};
use crate::model::OutboundMessage;
use crate::publisher::Connection;
use crate::report::Reporter;

pub type MqttOptions = mqtt5::MqttOptions;
pub type AsyncClient = mqtt5::AsyncClient;
pub type EventLoop = mqtt5::EventLoop;
pub type QoS = mqtt5::mqttbytes::QoS;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

pub fn build_options(cfg: &MqttConfig) -> MqttOptions {
    let client_id = format!("{}-{}", cfg.client_id_prefix, Uuid::new_v4());
    let mut opts = MqttOptions::new(client_id, cfg.host.clone(), cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.unwrap_or(30)));
    opts.set_clean_start(cfg.clean_session.unwrap_or(true));
    if let (Some(u), Some(p)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(u.clone(), p.clone());
    }
    if cfg.port == 8883 {
        opts.set_transport(Transport::tls_with_default_config());
    }
    opts
}

pub fn qos(v: u8) -> QoS {
    match v {
        2 => QoS::ExactlyOnce,
        0 => QoS::AtMostOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Owned broker handle. Connectivity is tracked from the event loop driver.
pub struct MqttConnection {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    qos: QoS,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttConnection {
    /// Start the client and its event loop driver. Connection happens in the
    /// background; `is_connected` flips once the broker acknowledges.
    pub fn connect(cfg: &MqttConfig, qos_level: u8, reporter: Arc<dyn Reporter>) -> Self {
        let opts = build_options(cfg);
        let (client, eventloop) = AsyncClient::new(opts, 50);
        let connected = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));
        info!(host = %cfg.host, port = cfg.port, "connecting to MQTT broker");
        let driver = tokio::spawn(drive(
            eventloop,
            connected.clone(),
            closing.clone(),
            reporter,
        ));
        Self {
            client,
            connected,
            closing,
            qos: qos(qos_level),
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Send DISCONNECT and stop the driver. Safe to call more than once.
    pub async fn disconnect(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut driver) = driver else {
            return;
        };
        let mut finished = false;
        if self.connected.load(Ordering::SeqCst) {
            if let Err(e) = self.client.disconnect().await {
                warn!(error = %e, "MQTT disconnect failed");
            }
            // let the driver flush DISCONNECT before it is stopped
            match tokio::time::timeout(RECONNECT_DELAY, &mut driver).await {
                Ok(_) => finished = true,
                Err(_) => debug!("MQTT driver did not stop in time"),
            }
        }
        if !finished {
            driver.abort();
            // the event loop is dropped once the aborted task settles
            let _ = driver.await;
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("MQTT connection closed");
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        if let Ok(mut driver) = self.driver.lock() {
            if let Some(driver) = driver.take() {
                driver.abort();
            }
        }
    }
}

#[async_trait]
impl Connection for MqttConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let payload = serde_json::to_vec(&message.payload)?;
        self.client
            .publish(message.topic, self.qos, false, payload)
            .await
            .map_err(|e| AppError::Mqtt(e.to_string()))
    }
}

async fn drive(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    reporter: Arc<dyn Reporter>,
) {
    loop {
        match eventloop.poll().await {
            Ok(mqtt5::Event::Incoming(mqtt5::Incoming::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                info!("MQTT connected");
                reporter.on_log_entry("✅ Connected!".to_string());
            }
            Ok(mqtt5::Event::Incoming(mqtt5::Incoming::Disconnect(_))) => {
                connected.store(false, Ordering::SeqCst);
                reporter.on_log_entry(format!("⚠️ {}", AppError::ConnectionLost));
            }
            Ok(event) => debug!(?event, "mqtt event"),
            Err(_) if closing.load(Ordering::SeqCst) => break,
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!(error = %e, "MQTT connection lost; reconnecting after short delay");
                    reporter.on_log_entry(format!("⚠️ {}", AppError::ConnectionLost));
                } else {
                    warn!(error = %e, "MQTT connect failed; retrying after short delay");
                    reporter.on_log_entry(format!("❌ Failed: {e}"));
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
