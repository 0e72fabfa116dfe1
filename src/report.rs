//! Upstream reporting: poll results and the human-readable activity trace.

use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;

use crate::model::PollResult;

pub const ACTIVITY_CAPACITY: usize = 10;

/// Presentation-layer callbacks.
pub trait Reporter: Send + Sync {
    fn on_result(&self, result: PollResult);
    fn on_log_entry(&self, entry: String);
}

/// Forwards reports over unbounded channels to whatever renders them.
#[derive(Clone)]
pub struct ChannelReporter {
    results: mpsc::UnboundedSender<PollResult>,
    log: mpsc::UnboundedSender<String>,
}

pub struct ReportReceivers {
    pub results: mpsc::UnboundedReceiver<PollResult>,
    pub log: mpsc::UnboundedReceiver<String>,
}

impl ChannelReporter {
    pub fn new() -> (Self, ReportReceivers) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        (
            Self {
                results: results_tx,
                log: log_tx,
            },
            ReportReceivers {
                results: results_rx,
                log: log_rx,
            },
        )
    }
}

impl Reporter for ChannelReporter {
    fn on_result(&self, result: PollResult) {
        // receiver gone means the front-end is shutting down
        let _ = self.results.send(result);
    }

    fn on_log_entry(&self, entry: String) {
        info!(activity = %entry);
        let _ = self.log.send(entry);
    }
}

/// The most recent activity entries, newest first, timestamped on insert.
#[derive(Clone, Default)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<String>>>,
}

impl ActivityLog {
    pub fn push(&self, message: &str) -> String {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push_front(line.clone());
        entries.truncate(ACTIVITY_CAPACITY);
        line
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}
