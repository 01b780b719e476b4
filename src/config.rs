use crate::cost::{CostRates, SegmentCategory};
use crate::error::{PlanError, Result};
use crate::hub::snap::HubSnap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_leaves_per_hub: usize,
    /// Pole to underground transition reach.
    pub search_radius: f64,
    pub aerial_drop_radius: f64,
    /// Limit on buried drop length. Unlimited when absent.
    pub drop_search_radius: Option<f64>,
    pub shrink_factor: f64,
    /// First clustering cutoff as a fraction of the tallest merge.
    pub initial_cutoff_ratio: f64,
    pub max_shrink_iterations: usize,
    /// Take the coarsest admissible cut whenever the first cutoff already fits.
    /// Without it the first cut is only raised when it leaves every leaf alone.
    pub prefer_fewest_hubs: bool,
    pub cost_rates: CostRates,
    pub coincidence_epsilon: f64,
    pub hub_snap: HubSnap,
    pub snap_tolerance: f64,
    pub max_search_visits: Option<usize>,
    pub parallel_routing: bool,
    pub terminal_capacity: usize,
    pub terminal_max_distance: f64,
    pub pole_usage_tolerance: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_leaves_per_hub: 432,
            search_radius: 50.0,
            aerial_drop_radius: 200.0,
            drop_search_radius: None,
            shrink_factor: 0.95,
            initial_cutoff_ratio: 0.5,
            max_shrink_iterations: 1000,
            prefer_fewest_hubs: false,
            cost_rates: CostRates::default(),
            coincidence_epsilon: 2.0,
            hub_snap: HubSnap::NearestNode,
            snap_tolerance: 500.0,
            max_search_visits: Some(1_000_000),
            parallel_routing: true,
            terminal_capacity: 9,
            terminal_max_distance: 1000.0,
            pole_usage_tolerance: 1.0,
        }
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PlanError::InvalidConfig(format!(
            "{name} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

impl PlannerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PlanError::InvalidConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PlanError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_leaves_per_hub == 0 {
            return Err(PlanError::InvalidConfig(
                "max_leaves_per_hub must be at least 1".to_string(),
            ));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(PlanError::InvalidConfig(format!(
                "shrink_factor must lie strictly between 0 and 1, got {}",
                self.shrink_factor
            )));
        }
        if !(self.initial_cutoff_ratio.is_finite() && self.initial_cutoff_ratio > 0.0) {
            return Err(PlanError::InvalidConfig(format!(
                "initial_cutoff_ratio must be positive, got {}",
                self.initial_cutoff_ratio
            )));
        }
        if self.terminal_capacity == 0 {
            return Err(PlanError::InvalidConfig(
                "terminal_capacity must be at least 1".to_string(),
            ));
        }

        non_negative("search_radius", self.search_radius)?;
        non_negative("aerial_drop_radius", self.aerial_drop_radius)?;
        if let Some(r) = self.drop_search_radius {
            non_negative("drop_search_radius", r)?;
        }
        non_negative("coincidence_epsilon", self.coincidence_epsilon)?;
        non_negative("snap_tolerance", self.snap_tolerance)?;
        non_negative("terminal_max_distance", self.terminal_max_distance)?;
        non_negative("pole_usage_tolerance", self.pole_usage_tolerance)?;

        for category in SegmentCategory::ALL {
            non_negative(category.as_str(), self.cost_rates.rate(category))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        PlannerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlannerConfig::from_json_str(
            r#"{"max_leaves_per_hub": 9, "hub_snap": "nearest_road", "cost_rates": {"aerial": 4.0}}"#,
        )
        .unwrap();

        assert_eq!(config.max_leaves_per_hub, 9);
        assert_eq!(config.hub_snap, HubSnap::NearestRoad);
        assert_eq!(config.cost_rates.aerial, 4.0);
        assert_eq!(config.cost_rates.underground, 1000.0);
        assert_eq!(config.shrink_factor, 0.95);
        assert!(!config.prefer_fewest_hubs);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let bad_shrink = PlannerConfig {
            shrink_factor: 1.0,
            ..Default::default()
        };
        assert!(matches!(bad_shrink.validate(), Err(PlanError::InvalidConfig(_))));

        let zero_capacity = PlannerConfig {
            max_leaves_per_hub: 0,
            ..Default::default()
        };
        assert!(zero_capacity.validate().is_err());

        let mut negative_rate = PlannerConfig::default();
        negative_rate.cost_rates.transition = -1.0;
        assert!(negative_rate.validate().is_err());

        let nan_radius = PlannerConfig {
            search_radius: f64::NAN,
            ..Default::default()
        };
        assert!(nan_radius.validate().is_err());
    }
}
