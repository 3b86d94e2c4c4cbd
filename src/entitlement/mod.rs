//! Entitlement resolution.
//!
//! Turns raw backend user records into a canonical `Entitlement`, applies
//! administrator grants, and merges fetched candidates into the session
//! cache without regressing tier mid-session.

pub mod normalizer;
pub mod overrides;
pub mod reconciler;
pub mod store;
pub mod tier;

pub use normalizer::{normalize, RawUser};
pub use overrides::UsageOverride;
pub use reconciler::reconcile;
pub use store::{Allowance, EntitlementStore};
pub use tier::PlanTier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolved plan state for a user at a point in time.
///
/// `usage_limit` of `None` means unmetered, which holds exactly when the
/// tier is unmetered or an unlimited grant is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub tier: PlanTier,
    pub usage_count: u64,
    pub usage_limit: Option<u64>,
    pub secondary_usage_count: u64,
    pub secondary_usage_limit: Option<u64>,
    pub renewal_date: Option<DateTime<Utc>>,
    pub cancellation: Option<Cancellation>,
}

/// Pending cancellation; the plan reverts to free at `effective_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub effective_at: DateTime<Utc>,
}

impl Entitlement {
    /// The free-tier default every unrecognized or absent record degrades to.
    pub fn free_default() -> Self {
        Self::for_tier(PlanTier::Free)
    }

    /// Fresh entitlement for a tier with default limits and zero usage.
    pub fn for_tier(tier: PlanTier) -> Self {
        Self {
            tier,
            usage_count: 0,
            usage_limit: tier.meeting_limit(),
            secondary_usage_count: 0,
            secondary_usage_limit: tier.summary_limit(),
            renewal_date: None,
            cancellation: None,
        }
    }
}
