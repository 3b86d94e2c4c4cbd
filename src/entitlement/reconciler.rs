//! Rank-ordered entitlement reconciliation.
//!
//! Every write to the session cache passes through `reconcile`. The rank
//! rule keeps a freshly upgraded user on their new tier while a stale
//! background fetch is still in flight; only a force refresh may regress
//! tier. Deliberately not last-write-wins.

use super::Entitlement;

/// Merge a fetched candidate into the cached entitlement. Infallible.
///
/// A non-forced candidate of lower rank contributes its usage counters,
/// renewal date and cancellation but keeps the cached tier and limits.
pub fn reconcile(current: Option<&Entitlement>, incoming: Entitlement, force: bool) -> Entitlement {
    let current = match current {
        Some(current) => current,
        None => return incoming,
    };

    if *current == incoming {
        return current.clone();
    }

    if force || incoming.tier.rank() >= current.tier.rank() {
        return incoming;
    }

    // Blocked downgrade: the counters are still authoritative, the tier
    // (and the limits that derive from it) are not.
    Entitlement {
        tier: current.tier,
        usage_count: incoming.usage_count,
        usage_limit: current.usage_limit,
        secondary_usage_count: incoming.secondary_usage_count,
        secondary_usage_limit: current.secondary_usage_limit,
        renewal_date: incoming.renewal_date,
        cancellation: incoming.cancellation,
    }
}
