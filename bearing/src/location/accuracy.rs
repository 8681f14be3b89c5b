//! Accuracy tiers and the backend settings derived from them.
//!
//! A caller asks for one of three [`Accuracy`] tiers. Each backend translates
//! the tier into its own vocabulary:
//!
//! - The managed service takes a [`Priority`]
//! - The OS location manager takes [`Criteria`] and a set of [`SourceKind`]s
//!
//! # Source Inclusion
//!
//! Source selection is cumulative: a higher tier includes every source a lower
//! tier would use, trading battery for robustness.
//!
//! ```text
//! Low    → least precise enabled source only
//! Medium → Passive + Network
//! High   → Passive + Network + Gps
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Desired accuracy of a position fix.
///
/// The value is the maximum acceptable reported error radius in metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    /// Within 2000 metres.
    Low,
    /// Within 200 metres.
    #[default]
    Medium,
    /// Within 20 metres.
    High,
}

impl Accuracy {
    /// Maximum acceptable error radius in metres.
    pub fn radius_m(&self) -> f32 {
        match self {
            Accuracy::Low => 2000.0,
            Accuracy::Medium => 200.0,
            Accuracy::High => 20.0,
        }
    }

    /// Power/accuracy priority for the managed location service.
    pub fn priority(&self) -> Priority {
        match self {
            Accuracy::Low => Priority::LowPower,
            Accuracy::Medium => Priority::Balanced,
            Accuracy::High => Priority::HighAccuracy,
        }
    }

    /// Selection criteria for the OS location manager.
    pub fn criteria(&self) -> Criteria {
        match self {
            Accuracy::Low => Criteria {
                power: PowerRequirement::Low,
                accuracy: CriteriaAccuracy::Coarse,
            },
            Accuracy::Medium => Criteria {
                power: PowerRequirement::Medium,
                accuracy: CriteriaAccuracy::Medium,
            },
            Accuracy::High => Criteria {
                power: PowerRequirement::High,
                accuracy: CriteriaAccuracy::Fine,
            },
        }
    }

    /// The most precise source kind this tier may draw on.
    fn source_ceiling(&self) -> SourceKind {
        match self {
            Accuracy::Low => SourceKind::Passive,
            Accuracy::Medium => SourceKind::Network,
            Accuracy::High => SourceKind::Gps,
        }
    }

    /// Sources to consult for this tier, most precise first.
    ///
    /// Only sources present in `enabled` are returned. When none of the
    /// enabled sources fall under the tier's ceiling, the least precise
    /// enabled source is used on its own, so a higher tier always returns a
    /// superset of a lower tier's sources.
    pub fn candidate_sources(&self, enabled: &[SourceKind]) -> Vec<SourceKind> {
        let ceiling = self.source_ceiling();
        let mut sources: Vec<SourceKind> = SourceKind::PRIORITY_ORDER
            .iter()
            .copied()
            .filter(|s| enabled.contains(s) && *s <= ceiling)
            .collect();

        if sources.is_empty() {
            if let Some(least) = SourceKind::PRIORITY_ORDER
                .iter()
                .rev()
                .find(|s| enabled.contains(s))
            {
                sources.push(*least);
            }
        }

        sources
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accuracy::Low => write!(f, "low"),
            Accuracy::Medium => write!(f, "medium"),
            Accuracy::High => write!(f, "high"),
        }
    }
}

impl FromStr for Accuracy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Accuracy::Low),
            "medium" => Ok(Accuracy::Medium),
            "high" => Ok(Accuracy::High),
            other => Err(format!("unknown accuracy '{}'", other)),
        }
    }
}

/// Request priority understood by the managed location service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// City-level, lowest power draw.
    LowPower,
    /// Block-level, balanced power draw.
    Balanced,
    /// Most precise fix available, highest power draw.
    HighAccuracy,
}

/// Power budget for an OS provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRequirement {
    Low,
    Medium,
    High,
}

/// Accuracy class for an OS provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaAccuracy {
    Coarse,
    Medium,
    Fine,
}

/// Provider selection criteria for the OS location manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criteria {
    pub power: PowerRequirement,
    pub accuracy: CriteriaAccuracy,
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "power={:?} accuracy={:?}", self.power, self.accuracy)
    }
}

/// An OS-level position source.
///
/// Ordered by precision: `Passive < Network < Gps`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Piggybacks on fixes requested by other consumers.
    Passive,
    /// Cell tower and Wi-Fi positioning.
    Network,
    /// Satellite positioning.
    Gps,
}

impl SourceKind {
    /// Sources in priority order, most precise first.
    pub const PRIORITY_ORDER: [SourceKind; 3] =
        [SourceKind::Gps, SourceKind::Network, SourceKind::Passive];
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Passive => write!(f, "passive"),
            SourceKind::Network => write!(f, "network"),
            SourceKind::Gps => write!(f, "gps"),
        }
    }
}
