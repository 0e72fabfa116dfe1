mod common;

use common::RecordingConnection;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use village_monitor::model::{SensorKind, SensorValueSet, UnitSummary};
use village_monitor::publisher::Publisher;
use village_monitor::report::{ChannelReporter, ReportReceivers};
use village_monitor::simulator::SensorPanel;
use village_monitor::AppError;

const DEBOUNCE: Duration = Duration::from_millis(300);

fn units() -> Vec<UnitSummary> {
    vec![
        UnitSummary {
            unit_id: "unit01".into(),
            unit_name: "Ban Mai".into(),
        },
        UnitSummary {
            unit_id: "unit02".into(),
            unit_name: "Ban Nong".into(),
        },
    ]
}

fn make_panel(
    connection: Arc<RecordingConnection>,
    units: Vec<UnitSummary>,
) -> (SensorPanel<RecordingConnection>, ReportReceivers) {
    let (reporter, rx) = ChannelReporter::new();
    let reporter = Arc::new(reporter);
    let publisher = Publisher::new(connection, reporter.clone());
    let panel = SensorPanel::new(publisher, reporter, units, SensorValueSet::default(), DEBOUNCE);
    (panel, rx)
}

#[tokio::test]
async fn test_targets_first_unit() {
    let (panel, _rx) = make_panel(Arc::new(RecordingConnection::connected()), units());
    assert_eq!(panel.unit_id(), "unit01");
    assert_eq!(panel.unit_name(), "Ban Mai");

    let (fallback, _rx) = panel_without_units();
    assert_eq!(fallback.unit_id(), "unit01");
    assert_eq!(fallback.unit_name(), "Default Unit");
}

fn panel_without_units() -> (SensorPanel<RecordingConnection>, ReportReceivers) {
    make_panel(Arc::new(RecordingConnection::connected()), Vec::new())
}

#[tokio::test(start_paused = true)]
async fn test_slider_burst_publishes_final_values_once() {
    let connection = Arc::new(RecordingConnection::connected());
    let (mut panel, _rx) = make_panel(connection.clone(), units());

    panel.set(SensorKind::Rpm, 1000.0).unwrap();
    sleep(Duration::from_millis(100)).await;
    panel.set(SensorKind::Rpm, 2500.0).unwrap();
    sleep(Duration::from_millis(100)).await;
    panel.set(SensorKind::Temperature, 71.0).unwrap();
    assert!(connection.sent.lock().unwrap().is_empty());

    sleep(Duration::from_secs(1)).await;

    assert_eq!(
        connection.topics(),
        vec![
            "gnt/unit01/temp",
            "gnt/unit01/vibration",
            "gnt/unit01/rpm",
            "gnt/unit01/level"
        ]
    );
    let sent = connection.sent.lock().unwrap().clone();
    assert_eq!(sent[0].payload, json!({"temperature": 71}));
    assert_eq!(sent[2].payload, json!({"rpm": 2500}));
    assert_eq!(sent[3].payload, json!({"water": 347}));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_is_rejected() {
    let connection = Arc::new(RecordingConnection::connected());
    let (mut panel, _rx) = make_panel(connection.clone(), units());

    let err = panel.set(SensorKind::Rpm, 12_000.0).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(panel.set(SensorKind::WaterLevel, f64::NAN).is_err());
    assert_eq!(panel.values(), &SensorValueSet::default());

    sleep(Duration::from_secs(1)).await;
    assert!(connection.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_publishes_immediately() {
    let connection = Arc::new(RecordingConnection::connected());
    let (panel, mut rx) = make_panel(connection.clone(), units());

    assert_eq!(panel.send().await.unwrap(), 4);
    assert_eq!(connection.topics().len(), 4);

    let log: Vec<String> = std::iter::from_fn(|| rx.log.try_recv().ok()).collect();
    assert_eq!(log.len(), 5);
    assert_eq!(log[0], "➡️ Sent {\"temperature\":58} to gnt/unit01/temp");
    assert_eq!(log[4], "✅ Sent 4 sensor readings for Ban Mai.");
}

#[tokio::test]
async fn test_send_while_disconnected() {
    let connection = Arc::new(RecordingConnection::default());
    let (panel, mut rx) = make_panel(connection.clone(), units());

    assert!(matches!(panel.send().await, Err(AppError::NotConnected)));
    assert!(connection.sent.lock().unwrap().is_empty());
    assert_eq!(rx.log.try_recv().unwrap(), "❌ Not connected to Broker.");
}

#[tokio::test(start_paused = true)]
async fn test_retarget() {
    let connection = Arc::new(RecordingConnection::connected());
    let (mut panel, _rx) = make_panel(connection.clone(), units());

    panel.retarget("unit02");
    assert_eq!(panel.unit_name(), "Ban Nong");
    panel.retarget("unit09");
    assert_eq!(panel.unit_name(), "unit09");

    panel.set(SensorKind::Vibration, 120.0).unwrap();
    sleep(Duration::from_secs(1)).await;
    let topics = connection.topics();
    assert_eq!(topics.len(), 4);
    assert!(topics.iter().all(|t| t.starts_with("gnt/unit09/")));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_is_picked_up() {
    let connection = Arc::new(RecordingConnection::default());
    let (mut panel, _rx) = make_panel(connection.clone(), units());

    panel.set(SensorKind::Rpm, 4000.0).unwrap();
    sleep(Duration::from_secs(1)).await;
    assert!(connection.sent.lock().unwrap().is_empty());

    connection.connected.store(true, Ordering::SeqCst);
    panel.set(SensorKind::Rpm, 4100.0).unwrap();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(connection.topics().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_reaches_activity_log() {
    let connection = Arc::new(RecordingConnection::connected());
    *connection.fail_suffix.lock().unwrap() = Some("/rpm");
    let (mut panel, mut rx) = make_panel(connection.clone(), units());

    assert!(matches!(panel.send().await, Err(AppError::Mqtt(_))));
    panel.set(SensorKind::Rpm, 100.0).unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(
        connection.topics(),
        vec![
            "gnt/unit01/temp",
            "gnt/unit01/vibration",
            "gnt/unit01/temp",
            "gnt/unit01/vibration"
        ]
    );
    let log: Vec<String> = std::iter::from_fn(|| rx.log.try_recv().ok()).collect();
    let failures = log
        .iter()
        .filter(|l| l.contains("request channel closed"))
        .count();
    assert_eq!(failures, 2);
    assert!(!log.iter().any(|l| l.contains("sensor readings for")));
}
