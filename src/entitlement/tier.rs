//! Canonical subscription tiers.
//!
//! Rank is the single total order used for conflict resolution: a fetched
//! entitlement may only replace a higher-ranked cached one through an
//! explicit force refresh.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription tier, ordered from least to most capable.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Standard,
    Elevated,
    Unlimited,
    Organization,
}

impl PlanTier {
    /// Position in the tier order, 0..=4.
    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Standard => 1,
            PlanTier::Elevated => 2,
            PlanTier::Unlimited => 3,
            PlanTier::Organization => 4,
        }
    }

    /// Default monthly meeting allowance. `None` means unmetered.
    pub fn meeting_limit(&self) -> Option<u64> {
        match self {
            PlanTier::Free => Some(3),
            PlanTier::Standard => Some(10),
            PlanTier::Elevated => Some(40),
            PlanTier::Unlimited | PlanTier::Organization => None,
        }
    }

    /// Default monthly summary-generation allowance. `None` means unmetered.
    pub fn summary_limit(&self) -> Option<u64> {
        match self {
            PlanTier::Free => Some(5),
            PlanTier::Standard => Some(25),
            PlanTier::Elevated => Some(100),
            PlanTier::Unlimited | PlanTier::Organization => None,
        }
    }

    /// Tiers with no per-unit metering at all.
    pub fn is_unmetered(&self) -> bool {
        matches!(self, PlanTier::Unlimited | PlanTier::Organization)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Standard => "standard",
            PlanTier::Elevated => "elevated",
            PlanTier::Unlimited => "unlimited",
            PlanTier::Organization => "organization",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
