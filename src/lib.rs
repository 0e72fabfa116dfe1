pub mod aggregator;
pub mod config;
pub mod console;
pub mod debounce;
pub mod demand;
pub mod error;
pub mod history;
pub mod model;
pub mod mqtt;
pub mod power;
pub mod publisher;
pub mod registry;
pub mod report;
pub mod simulator;
pub mod status;

// Re-export commonly used items
pub use aggregator::{Aggregator, PollContext, PollState};
pub use config::Config;
pub use error::{AppError, Result};
pub use model::{MetricSeries, PollResult, Selection, SensorValueSet};
pub use publisher::Publisher;
pub use status::Status;
