//! Slider panel that pushes synthetic sensor values to a unit.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::model::{SensorKind, SensorValueSet, UnitSummary};
use crate::publisher::{Connection, Publisher};
use crate::registry::display_name;
use crate::report::Reporter;

pub struct SensorPanel<C> {
    publisher: Publisher<C>,
    reporter: Arc<dyn Reporter>,
    units: Vec<UnitSummary>,
    unit_id: String,
    unit_name: String,
    values: SensorValueSet,
    debounce: Duration,
}

impl<C: Connection + 'static> SensorPanel<C> {
    /// Targets the first listed unit, or `unit01` when the list is empty.
    pub fn new(
        publisher: Publisher<C>,
        reporter: Arc<dyn Reporter>,
        units: Vec<UnitSummary>,
        values: SensorValueSet,
        debounce: Duration,
    ) -> Self {
        let (unit_id, unit_name) = match units.first() {
            Some(u) => (u.unit_id.clone(), u.unit_name.clone()),
            None => ("unit01".to_string(), "Default Unit".to_string()),
        };
        Self {
            publisher,
            reporter,
            units,
            unit_id,
            unit_name,
            values,
            debounce,
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn values(&self) -> &SensorValueSet {
        &self.values
    }

    pub fn units(&self) -> &[UnitSummary] {
        &self.units
    }

    pub fn publisher(&self) -> &Publisher<C> {
        &self.publisher
    }

    pub fn retarget(&mut self, unit_id: &str) {
        self.unit_id = unit_id.to_string();
        self.unit_name = display_name(&self.units, unit_id)
            .unwrap_or(unit_id)
            .to_string();
    }

    /// Move one slider; the whole set is published after the debounce delay.
    pub fn set(&mut self, kind: SensorKind, value: f64) -> Result<()> {
        let (min, max) = kind.range();
        if !value.is_finite() || value < min || value > max {
            return Err(AppError::Validation(format!(
                "{} must be within {min}..={max}, got {value}",
                kind.label()
            )));
        }
        self.values.set(kind, value);
        self.publisher
            .publish_debounced(&self.unit_id, self.values, self.debounce);
        Ok(())
    }

    /// Publish the current set right away.
    pub async fn send(&self) -> Result<usize> {
        let sent = self.publisher.publish(&self.unit_id, &self.values).await?;
        self.reporter.on_log_entry(format!(
            "✅ Sent {sent} sensor readings for {}.",
            self.unit_name
        ));
        Ok(sent)
    }
}
