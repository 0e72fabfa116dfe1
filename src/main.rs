use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use village_monitor::aggregator::{Aggregator, PollContext};
use village_monitor::config::{Config, DemandConfig};
use village_monitor::console::{self, Command, HELP};
use village_monitor::demand::{DemandSource, FixedDemand, SimulatedDemand};
use village_monitor::history::{Fetcher, HistoryClient};
use village_monitor::model::{Metric, PollResult, Selection, SensorKind};
use village_monitor::mqtt::MqttConnection;
use village_monitor::publisher::Publisher;
use village_monitor::registry::UnitRegistry;
use village_monitor::report::{ActivityLog, ChannelReporter, Reporter};
use village_monitor::simulator::SensorPanel;
use village_monitor::status::Classifier;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let cfg_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.example.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!(path = %cfg_path, "loaded config");

    let (reporter, mut reports) = ChannelReporter::new();
    let reporter: Arc<dyn Reporter> = Arc::new(reporter);

    let history = HistoryClient::new(&cfg.history)?;
    let (registry, _) = UnitRegistry::load(&history, &cfg.power, &cfg.units).await;
    let units = match history.units().await {
        Ok(units) => units,
        Err(e) => {
            warn!(error = %e, "failed to load unit list");
            reporter.on_log_entry(format!("❌ Failed to load Unit list: {e}"));
            Vec::new()
        }
    };

    let demand: Arc<dyn DemandSource> = match cfg.demand {
        DemandConfig::Simulated {
            baseline_fraction,
            range_fraction,
        } => Arc::new(SimulatedDemand::new(baseline_fraction, range_fraction)),
        DemandConfig::Fixed { watts } => Arc::new(FixedDemand(watts)),
    };
    let history = Arc::new(history);
    let ctx = PollContext {
        fetcher: Fetcher::new(history.clone(), reporter.clone()),
        demand,
        power_log: history.clone(),
        registry: Arc::new(registry),
        classifier: Classifier::new(cfg.power.threshold_fraction),
        reporter: reporter.clone(),
        interval: cfg.polling.interval(),
    };
    let mut aggregator = Aggregator::new(ctx);
    if let Some(initial) = &cfg.polling.initial_selection {
        aggregator.select(Selection::parse(initial));
    }

    let connection = Arc::new(MqttConnection::connect(
        &cfg.mqtt,
        cfg.publisher.qos,
        reporter.clone(),
    ));
    let publisher = Publisher::new(connection.clone(), reporter.clone());
    let mut panel = SensorPanel::new(
        publisher,
        reporter.clone(),
        units,
        cfg.sensors,
        cfg.publisher.debounce(),
    );

    let activity = ActivityLog::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    println!("{HELP}");

    let sig = tokio::signal::ctrl_c();
    tokio::pin!(sig);
    loop {
        tokio::select! {
            biased;
            _ = &mut sig => {
                info!("shutdown requested");
                break;
            }
            Some(result) = reports.results.recv() => render(&result),
            Some(entry) = reports.log.recv() => println!("{}", activity.push(&entry)),
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    // stdin closed: keep polling until ctrl-c
                    Ok(None) => {
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        continue;
                    }
                };
                let command = match console::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(msg) => {
                        println!("{msg}");
                        continue;
                    }
                };
                match command {
                    Command::Quit => break,
                    Command::Help => println!("{HELP}"),
                    Command::Select(selection) => aggregator.select(selection),
                    Command::Stop => aggregator.stop(),
                    Command::Units => {
                        for unit in panel.units() {
                            println!("{} ({})", unit.unit_name, unit.unit_id);
                        }
                    }
                    Command::Villages => match history.villages().await {
                        Ok(villages) => {
                            for v in villages {
                                println!(
                                    "{:<10} {:<24} ({:>5.1}%, {:>5.1}%) {}",
                                    v.unit_id, v.name, v.map_x, v.map_y, v.pin()
                                );
                            }
                        }
                        Err(e) => println!("failed to load villages: {e}"),
                    },
                    Command::Target(unit_id) => {
                        panel.retarget(&unit_id);
                        println!("target: {} ({})", panel.unit_name(), panel.unit_id());
                    }
                    Command::Set(kind, value) => {
                        if let Err(e) = panel.set(kind, value) {
                            println!("{e}");
                        }
                    }
                    Command::Send => {
                        if let Err(e) = panel.send().await {
                            warn!(error = %e, "sensor send failed");
                        }
                    }
                    Command::Values => {
                        for kind in SensorKind::ALL {
                            println!("{:<12} {}", kind.label(), panel.values().get(kind));
                        }
                    }
                    Command::Log => {
                        for entry in activity.entries() {
                            println!("{entry}");
                        }
                    }
                }
            }
        }
    }

    aggregator.stop();
    panel.publisher().shutdown();
    connection.disconnect().await;
    info!("shutdown complete");
    Ok(())
}

fn render(result: &PollResult) {
    println!("{}", result.summary());
    for metric in Metric::ALL {
        let series = result.series.get(metric);
        match series.latest() {
            Some(latest) => println!(
                "  {:<12} {:>10.2} ({} samples, latest {})",
                metric,
                latest.value,
                series.len(),
                latest.timestamp.format("%H:%M:%S")
            ),
            None => println!("  {:<12} waiting for data...", metric),
        }
    }
}
