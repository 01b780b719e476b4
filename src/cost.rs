use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of cable segment. Drives the unit rate and whether a segment counts
/// as a private drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SegmentCategory {
    Underground,
    Aerial,
    AerialDrop,
    BuriedDrop,
    /// Pole to underground conduit connector, usually created by splitting a run.
    Transition,
}

impl SegmentCategory {
    pub const ALL: [SegmentCategory; 5] = [
        SegmentCategory::Underground,
        SegmentCategory::Aerial,
        SegmentCategory::AerialDrop,
        SegmentCategory::BuriedDrop,
        SegmentCategory::Transition,
    ];

    pub fn is_drop(self) -> bool {
        matches!(self, SegmentCategory::AerialDrop | SegmentCategory::BuriedDrop)
    }

    /// Segments a hub may be placed on in road snapping mode.
    pub fn is_road(self) -> bool {
        matches!(self, SegmentCategory::Underground | SegmentCategory::Aerial)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SegmentCategory::Underground => "Underground",
            SegmentCategory::Aerial => "Aerial",
            SegmentCategory::AerialDrop => "Aerial Drop",
            SegmentCategory::BuriedDrop => "Buried Drop",
            SegmentCategory::Transition => "Transition",
        }
    }
}

impl fmt::Display for SegmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown segment category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for SegmentCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "underground" => Ok(SegmentCategory::Underground),
            "aerial" => Ok(SegmentCategory::Aerial),
            "aerialdrop" => Ok(SegmentCategory::AerialDrop),
            "burieddrop" => Ok(SegmentCategory::BuriedDrop),
            "transition" => Ok(SegmentCategory::Transition),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// Cost per unit length, in the projection's linear unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostRates {
    pub underground: f64,
    pub aerial: f64,
    pub aerial_drop: f64,
    pub buried_drop: f64,
    pub transition: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            underground: 1000.0,
            aerial: 2.5,
            aerial_drop: 1.5,
            buried_drop: 200.0,
            transition: 1000.0,
        }
    }
}

impl CostRates {
    pub fn rate(&self, category: SegmentCategory) -> f64 {
        match category {
            SegmentCategory::Underground => self.underground,
            SegmentCategory::Aerial => self.aerial,
            SegmentCategory::AerialDrop => self.aerial_drop,
            SegmentCategory::BuriedDrop => self.buried_drop,
            SegmentCategory::Transition => self.transition,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CostModel {
    rates: CostRates,
}

impl CostModel {
    pub fn new(rates: CostRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &CostRates {
        &self.rates
    }

    pub fn cost(&self, category: SegmentCategory, length: f64) -> f64 {
        self.rates.rate(category) * length
    }
}
