//! Administrator-granted usage overrides.
//!
//! Grants adjust capacity, never identity: an override can lift or extend
//! the meeting limit but leaves the tier untouched.

use super::normalizer::RawUser;
use super::Entitlement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOverride {
    None,
    /// Removes the meeting limit entirely.
    Unlimited,
    /// Adds extra meetings on top of the resolved limit.
    ExtraUnits(i64),
}

impl UsageOverride {
    /// Read the grant fields off a raw user record. An unlimited grant wins
    /// over an extra-units grant when both are present.
    pub fn from_raw(raw: &RawUser) -> Self {
        if raw.unlimited_grant == Some(true) {
            return UsageOverride::Unlimited;
        }
        if let Some(extra) = raw.extra_meetings_grant {
            return UsageOverride::ExtraUnits(extra);
        }
        UsageOverride::None
    }

    /// Apply the grant to a normalized entitlement.
    pub fn apply(&self, entitlement: &Entitlement) -> Entitlement {
        match self {
            UsageOverride::None => entitlement.clone(),
            UsageOverride::Unlimited => Entitlement {
                usage_limit: None,
                ..entitlement.clone()
            },
            UsageOverride::ExtraUnits(extra) => {
                // Negative grants clamp to zero; an unmetered base stays
                // unmetered.
                let extra = (*extra).max(0) as u64;
                Entitlement {
                    usage_limit: entitlement
                        .usage_limit
                        .map(|base| base.saturating_add(extra)),
                    ..entitlement.clone()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::PlanTier;

    #[test]
    fn test_none_returns_input_unchanged() {
        let ent = Entitlement::for_tier(PlanTier::Standard);
        assert_eq!(UsageOverride::None.apply(&ent), ent);
    }

    #[test]
    fn test_unlimited_clears_limit_regardless_of_tier() {
        let ent = Entitlement::for_tier(PlanTier::Free);
        let adjusted = UsageOverride::Unlimited.apply(&ent);
        assert_eq!(adjusted.tier, PlanTier::Free);
        assert_eq!(adjusted.usage_limit, None);
        assert_eq!(adjusted.secondary_usage_limit, ent.secondary_usage_limit);
    }

    #[test]
    fn test_extra_units_extend_the_limit() {
        let ent = Entitlement::for_tier(PlanTier::Standard);
        let adjusted = UsageOverride::ExtraUnits(5).apply(&ent);
        assert_eq!(adjusted.usage_limit, Some(15));
    }

    #[test]
    fn test_extra_units_respect_explicit_limit() {
        let mut ent = Entitlement::for_tier(PlanTier::Standard);
        ent.usage_limit = Some(20);
        let adjusted = UsageOverride::ExtraUnits(5).apply(&ent);
        assert_eq!(adjusted.usage_limit, Some(25));
    }

    #[test]
    fn test_negative_extra_units_clamp_to_zero() {
        let ent = Entitlement::for_tier(PlanTier::Standard);
        let adjusted = UsageOverride::ExtraUnits(-7).apply(&ent);
        assert_eq!(adjusted.usage_limit, Some(10));
    }

    #[test]
    fn test_extra_units_on_unmetered_tier_stay_unmetered() {
        let ent = Entitlement::for_tier(PlanTier::Unlimited);
        let adjusted = UsageOverride::ExtraUnits(5).apply(&ent);
        assert_eq!(adjusted.usage_limit, None);
    }

    #[test]
    fn test_overrides_never_change_tier() {
        let ent = Entitlement::for_tier(PlanTier::Elevated);
        assert_eq!(UsageOverride::Unlimited.apply(&ent).tier, PlanTier::Elevated);
        assert_eq!(UsageOverride::ExtraUnits(3).apply(&ent).tier, PlanTier::Elevated);
    }

    #[test]
    fn test_from_raw_prefers_unlimited_grant() {
        let raw: RawUser =
            serde_json::from_str(r#"{"unlimitedGrant": true, "extraMeetingsGrant": 4}"#).unwrap();
        assert_eq!(UsageOverride::from_raw(&raw), UsageOverride::Unlimited);
    }

    #[test]
    fn test_from_raw_extra_units() {
        let raw: RawUser = serde_json::from_str(r#"{"extraMeetingsGrant": 4}"#).unwrap();
        assert_eq!(UsageOverride::from_raw(&raw), UsageOverride::ExtraUnits(4));
    }

    #[test]
    fn test_from_raw_absent_fields() {
        let raw: RawUser = serde_json::from_str("{}").unwrap();
        assert_eq!(UsageOverride::from_raw(&raw), UsageOverride::None);
    }

    #[test]
    fn test_huge_limit_with_grant_saturates() {
        let raw: RawUser = serde_json::from_str(
            r#"{
                "plan": "standard",
                "meetingLimit": 18446744073709551615,
                "extraMeetingsGrant": 9223372036854775807
            }"#,
        )
        .unwrap();
        let ent = crate::entitlement::normalize(&raw, false);
        let adjusted = UsageOverride::from_raw(&raw).apply(&ent);
        assert_eq!(adjusted.usage_limit, Some(u64::MAX));
    }
}
