//! Raw user record normalization.
//!
//! The backend's user payload is loosely shaped: the plan may be a bare
//! string, a nested object, or absent, and legacy labels alias current
//! tiers. `normalize` folds all of that into one canonical `Entitlement`
//! and never fails; anything unrecognized degrades to the free default.

use super::tier::PlanTier;
use super::{Cancellation, Entitlement};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// User record as the backend sends it. Every field is optional so a
/// partial or legacy payload still deserializes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawUser {
    pub id: Option<String>,
    pub email: Option<String>,
    pub plan: Option<RawPlan>,
    /// Direct membership flag, the oldest organization signal.
    pub is_organization_member: Option<bool>,
    pub organization: Option<RawOrganization>,
    pub organizations: Option<Vec<RawOrganization>>,
    pub meeting_count: Option<u64>,
    pub meeting_limit: Option<u64>,
    pub summary_count: Option<u64>,
    pub summary_limit: Option<u64>,
    pub renewal_date: Option<String>,
    pub cancellation: Option<RawCancellation>,
    pub unlimited_grant: Option<bool>,
    pub extra_meetings_grant: Option<i64>,
}

/// Plan field: either a bare label or a nested object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPlan {
    Label(String),
    Details(RawPlanDetails),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPlanDetails {
    pub tier: Option<String>,
    pub name: Option<String>,
    pub meeting_limit: Option<u64>,
    pub summary_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawOrganization {
    pub id: Option<String>,
    pub name: Option<String>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawCancellation {
    pub effective_at: Option<String>,
}

/// Legacy and marketing labels mapped onto canonical tiers.
const TIER_ALIASES: &[(&str, PlanTier)] = &[
    ("trial", PlanTier::Free),
    ("starter", PlanTier::Free),
    ("plus", PlanTier::Standard),
    ("pro", PlanTier::Standard),
    ("premium", PlanTier::Elevated),
    ("power", PlanTier::Elevated),
    ("max", PlanTier::Unlimited),
    ("org", PlanTier::Organization),
    ("team", PlanTier::Organization),
    ("enterprise", PlanTier::Organization),
];

/// Resolve a plan label to a tier, trying canonical names first and the
/// alias table second. Returns `None` for unrecognized labels.
pub fn lookup_tier(label: &str) -> Option<PlanTier> {
    let needle = label.trim().to_lowercase();
    let canonical = [
        PlanTier::Free,
        PlanTier::Standard,
        PlanTier::Elevated,
        PlanTier::Unlimited,
        PlanTier::Organization,
    ];
    if let Some(tier) = canonical.iter().find(|t| t.as_str() == needle) {
        return Some(*tier);
    }
    TIER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == needle)
        .map(|(_, tier)| *tier)
}

/// Build a canonical `Entitlement` from a raw user record.
///
/// Tier resolution order: a privileged role forces `unlimited`, any
/// organization-membership signal forces `organization`, otherwise the plan
/// label decides with `free` as the fallback. Pure and total.
pub fn normalize(raw: &RawUser, privileged: bool) -> Entitlement {
    let tier = if privileged {
        PlanTier::Unlimited
    } else if has_organization_signal(raw) {
        PlanTier::Organization
    } else {
        plan_label(raw).and_then(|l| lookup_tier(&l)).unwrap_or(PlanTier::Free)
    };

    // Unmetered tiers ignore any numeric limit the record carries.
    let (usage_limit, secondary_usage_limit) = if tier.is_unmetered() {
        (None, None)
    } else {
        (
            explicit_meeting_limit(raw).or(tier.meeting_limit()),
            explicit_summary_limit(raw).or(tier.summary_limit()),
        )
    };

    Entitlement {
        tier,
        usage_count: raw.meeting_count.unwrap_or(0),
        usage_limit,
        secondary_usage_count: raw.summary_count.unwrap_or(0),
        secondary_usage_limit,
        renewal_date: raw.renewal_date.as_deref().and_then(parse_timestamp),
        cancellation: raw
            .cancellation
            .as_ref()
            .and_then(|c| c.effective_at.as_deref())
            .and_then(parse_timestamp)
            .map(|effective_at| Cancellation { effective_at }),
    }
}

/// Any positive membership signal marks the user as an organization member.
/// The heuristics are independent and OR-ed; none can veto another.
fn has_organization_signal(raw: &RawUser) -> bool {
    if raw.is_organization_member == Some(true) {
        return true;
    }
    if let Some(org) = &raw.organization {
        if org.id.is_some() || org.name.is_some() || org.tier.is_some() {
            return true;
        }
    }
    if let Some(orgs) = &raw.organizations {
        if !orgs.is_empty() {
            return true;
        }
    }
    false
}

fn plan_label(raw: &RawUser) -> Option<String> {
    match &raw.plan {
        Some(RawPlan::Label(label)) => Some(label.clone()),
        Some(RawPlan::Details(details)) => details.tier.clone().or_else(|| details.name.clone()),
        None => None,
    }
}

/// Explicit limit from the record, top level first, then the plan object.
/// Only positive values count; zero means the field was never set.
fn explicit_meeting_limit(raw: &RawUser) -> Option<u64> {
    raw.meeting_limit
        .filter(|v| *v > 0)
        .or_else(|| plan_details(raw).and_then(|d| d.meeting_limit).filter(|v| *v > 0))
}

fn explicit_summary_limit(raw: &RawUser) -> Option<u64> {
    raw.summary_limit
        .filter(|v| *v > 0)
        .or_else(|| plan_details(raw).and_then(|d| d.summary_limit).filter(|v| *v > 0))
}

fn plan_details(raw: &RawUser) -> Option<&RawPlanDetails> {
    match &raw.plan {
        Some(RawPlan::Details(details)) => Some(details),
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawUser {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_standard_plan_with_usage() {
        let user = raw(r#"{"plan": "standard", "meetingCount": 7}"#);
        let ent = normalize(&user, false);
        assert_eq!(ent.tier, PlanTier::Standard);
        assert_eq!(ent.usage_count, 7);
        assert_eq!(ent.usage_limit, Some(10));
    }

    #[test]
    fn test_empty_record_defaults_to_free() {
        let ent = normalize(&raw("{}"), false);
        assert_eq!(ent.tier, PlanTier::Free);
        assert_eq!(ent.usage_count, 0);
        assert_eq!(ent.usage_limit, Some(3));
    }

    #[test]
    fn test_unrecognized_label_defaults_to_free() {
        let ent = normalize(&raw(r#"{"plan": "galactic"}"#), false);
        assert_eq!(ent.tier, PlanTier::Free);
    }

    #[test]
    fn test_legacy_aliases_resolve() {
        assert_eq!(lookup_tier("pro"), Some(PlanTier::Standard));
        assert_eq!(lookup_tier("Premium"), Some(PlanTier::Elevated));
        assert_eq!(lookup_tier("  enterprise "), Some(PlanTier::Organization));
        assert_eq!(lookup_tier("max"), Some(PlanTier::Unlimited));
        assert_eq!(lookup_tier("galactic"), None);
    }

    #[test]
    fn test_privileged_role_forces_unlimited() {
        let user = raw(r#"{"plan": "free", "meetingLimit": 3}"#);
        let ent = normalize(&user, true);
        assert_eq!(ent.tier, PlanTier::Unlimited);
        assert_eq!(ent.usage_limit, None);
        assert_eq!(ent.secondary_usage_limit, None);
    }

    #[test]
    fn test_membership_flag_forces_organization() {
        let user = raw(r#"{"plan": "free", "isOrganizationMember": true}"#);
        let ent = normalize(&user, false);
        assert_eq!(ent.tier, PlanTier::Organization);
        assert_eq!(ent.usage_limit, None);
    }

    #[test]
    fn test_nested_organization_forces_organization() {
        let user = raw(r#"{"plan": "standard", "organization": {"tier": "enterprise"}}"#);
        assert_eq!(normalize(&user, false).tier, PlanTier::Organization);
    }

    #[test]
    fn test_membership_list_forces_organization() {
        let user = raw(r#"{"organizations": [{"id": "org_1"}]}"#);
        assert_eq!(normalize(&user, false).tier, PlanTier::Organization);
    }

    #[test]
    fn test_empty_membership_list_is_not_a_signal() {
        let user = raw(r#"{"plan": "standard", "organizations": []}"#);
        assert_eq!(normalize(&user, false).tier, PlanTier::Standard);
    }

    #[test]
    fn test_privileged_outranks_organization_signals() {
        let user = raw(r#"{"isOrganizationMember": true}"#);
        assert_eq!(normalize(&user, true).tier, PlanTier::Unlimited);
    }

    #[test]
    fn test_nested_plan_object() {
        let user = raw(r#"{"plan": {"tier": "elevated", "meetingLimit": 60}}"#);
        let ent = normalize(&user, false);
        assert_eq!(ent.tier, PlanTier::Elevated);
        assert_eq!(ent.usage_limit, Some(60));
    }

    #[test]
    fn test_plan_object_name_fallback() {
        let user = raw(r#"{"plan": {"name": "plus"}}"#);
        assert_eq!(normalize(&user, false).tier, PlanTier::Standard);
    }

    #[test]
    fn test_explicit_limit_overrides_tier_default() {
        let user = raw(r#"{"plan": "standard", "meetingLimit": 25}"#);
        assert_eq!(normalize(&user, false).usage_limit, Some(25));
    }

    #[test]
    fn test_zero_limit_is_ignored() {
        let user = raw(r#"{"plan": "standard", "meetingLimit": 0}"#);
        assert_eq!(normalize(&user, false).usage_limit, Some(10));
    }

    #[test]
    fn test_numeric_limit_ignored_on_unmetered_tier() {
        let user = raw(r#"{"plan": "unlimited", "meetingLimit": 500}"#);
        let ent = normalize(&user, false);
        assert_eq!(ent.tier, PlanTier::Unlimited);
        assert_eq!(ent.usage_limit, None);
    }

    #[test]
    fn test_renewal_date_parses() {
        let user = raw(r#"{"renewalDate": "2026-09-01T00:00:00Z"}"#);
        let ent = normalize(&user, false);
        assert!(ent.renewal_date.is_some());
    }

    #[test]
    fn test_malformed_renewal_date_is_dropped() {
        let user = raw(r#"{"renewalDate": "next tuesday"}"#);
        assert!(normalize(&user, false).renewal_date.is_none());
    }

    #[test]
    fn test_cancellation_parses() {
        let user = raw(r#"{"cancellation": {"effectiveAt": "2026-10-01T00:00:00Z"}}"#);
        let ent = normalize(&user, false);
        assert!(ent.cancellation.is_some());
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let user = raw(r#"{"plan": "standard", "favoriteColor": "teal", "beta": {"x": 1}}"#);
        assert_eq!(normalize(&user, false).tier, PlanTier::Standard);
    }
}
