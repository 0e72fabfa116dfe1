use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::config::{PowerConfig, UnitOverride};
use crate::error::{AppError, Result};
use crate::history::HistoryClient;
use crate::model::{Selection, Unit, UnitRating, UnitSummary, VillageDescriptor};

/// Units known to the fleet, immutable once loaded.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: Vec<Unit>,
    index: HashMap<String, usize>,
    default_rating: UnitRating,
    aggregate_rating: UnitRating,
}

impl UnitRegistry {
    pub fn build(
        villages: &[VillageDescriptor],
        power: &PowerConfig,
        overrides: &BTreeMap<String, UnitOverride>,
    ) -> Self {
        let default_rating = power.default_rating();
        let units: Vec<Unit> = villages
            .iter()
            .map(|v| Unit {
                id: v.unit_id.clone(),
                name: v.name.clone(),
                map_x: v.map_x,
                map_y: v.map_y,
                rating: rating_for(&v.unit_id, default_rating, overrides),
            })
            .collect();
        let index = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u.id.clone(), i))
            .collect();
        Self {
            units,
            index,
            default_rating,
            aggregate_rating: power.aggregate_rating(),
        }
    }

    /// Load the village list from the history service. An unreachable service
    /// yields an empty registry; ratings still resolve to the configured defaults.
    pub async fn load(
        client: &HistoryClient,
        power: &PowerConfig,
        overrides: &BTreeMap<String, UnitOverride>,
    ) -> (Self, Vec<VillageDescriptor>) {
        let villages = match client.villages().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to load village status");
                Vec::new()
            }
        };
        info!(count = villages.len(), "loaded unit registry");
        (Self::build(&villages, power, overrides), villages)
    }

    pub fn get(&self, id: &str) -> Result<&Unit> {
        self.index
            .get(id)
            .map(|&i| &self.units[i])
            .ok_or_else(|| AppError::UnknownUnit(id.to_string()))
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Rating of the selected unit, or the aggregate rating for "all".
    pub fn rating(&self, selection: &Selection) -> UnitRating {
        match selection {
            Selection::All => self.aggregate_rating,
            Selection::Unit(id) => match self.get(id) {
                Ok(unit) => unit.rating,
                Err(_) => {
                    warn!(unit = %id, "unit not in registry; using default rating");
                    self.default_rating
                }
            },
        }
    }
}

fn rating_for(
    id: &str,
    default: UnitRating,
    overrides: &BTreeMap<String, UnitOverride>,
) -> UnitRating {
    match overrides.get(id) {
        Some(o) => UnitRating {
            capacity_w: o.rated_capacity_w.unwrap_or(default.capacity_w),
            max_rpm: o.rated_max_rpm.unwrap_or(default.max_rpm),
        },
        None => default,
    }
}

/// Display name for a unit id from the `/api/units` list.
pub fn display_name<'a>(units: &'a [UnitSummary], id: &str) -> Option<&'a str> {
    units
        .iter()
        .find(|u| u.unit_id == id)
        .map(|u| u.unit_name.as_str())
}
