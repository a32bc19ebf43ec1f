use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::logging::debug_log;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Plus,
    Creator,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Plus, Tier::Creator];

    pub fn key(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Plus => "plus",
            Tier::Creator => "creator",
        }
    }

    pub fn policy(self) -> TierPolicy {
        TierPolicy::for_tier(self)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown tier {0:?} (expected free, plus or creator)")]
pub struct TierParseError(pub String);

impl FromStr for Tier {
    type Err = TierParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Tier::ALL
            .into_iter()
            .find(|tier| tier.key().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| TierParseError(trimmed.to_string()))
    }
}

/// Remaining reply credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credits {
    Limited(u32),
    Unlimited,
}

impl Credits {
    pub fn available(self) -> bool {
        match self {
            Credits::Unlimited => true,
            Credits::Limited(left) => left > 0,
        }
    }

    /// Label used inside the reply modal.
    pub fn label(self) -> String {
        match self {
            Credits::Unlimited => "Unlimited".to_string(),
            Credits::Limited(left) => format!("{left} left this month"),
        }
    }

    /// Label used by the tier bar.
    pub fn bar_label(self) -> String {
        match self {
            Credits::Unlimited => "Unlimited replies".to_string(),
            Credits::Limited(left) => format!("{left} reply credits"),
        }
    }

    pub fn short_label(self) -> String {
        match self {
            Credits::Unlimited => "∞".to_string(),
            Credits::Limited(left) => left.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub tier: Tier,
    pub monthly_allowance: Credits,
    pub label: &'static str,
}

impl TierPolicy {
    pub const fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                tier,
                monthly_allowance: Credits::Limited(3),
                label: "Free",
            },
            Tier::Plus => Self {
                tier,
                monthly_allowance: Credits::Limited(30),
                label: "Plus",
            },
            Tier::Creator => Self {
                tier,
                monthly_allowance: Credits::Unlimited,
                label: "Creator",
            },
        }
    }

    pub fn allowance_label(&self) -> String {
        match self.monthly_allowance {
            Credits::Unlimited => "Unlimited".to_string(),
            Credits::Limited(n) => format!("{n} replies/mo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: String,
    pub tier: Tier,
    pub credits: Credits,
}

impl Viewer {
    pub fn new(
        id: impl Into<String>,
        handle: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
        tier: Tier,
    ) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
            tier,
            credits: tier.policy().monthly_allowance,
        }
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new(
            "me",
            "@viewer",
            "You",
            "https://api.dicebear.com/7.x/avataaars/svg?seed=viewer",
            Tier::Free,
        )
    }
}

/// Owns the session's viewer record. Only the methods here mutate it.
#[derive(Debug, Clone, Default)]
pub struct EntitlementStore {
    viewer: Viewer,
}

impl EntitlementStore {
    pub fn new(viewer: Viewer) -> Self {
        Self { viewer }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn tier(&self) -> Tier {
        self.viewer.tier
    }

    pub fn credits(&self) -> Credits {
        self.viewer.credits
    }

    pub fn can_reply(&self) -> bool {
        self.viewer.credits.available()
    }

    /// Spends one reply credit. Returns false without touching state when
    /// none are left.
    pub fn consume_credit(&mut self) -> bool {
        match self.viewer.credits {
            Credits::Unlimited => true,
            Credits::Limited(0) => {
                debug_log("reply credit refused: none left");
                false
            }
            Credits::Limited(left) => {
                self.viewer.credits = Credits::Limited(left - 1);
                debug_log(format!("reply credit used: {} -> {}", left, left - 1));
                true
            }
        }
    }

    pub fn set_tier(&mut self, tier: Tier) {
        self.viewer.tier = tier;
        self.viewer.credits = tier.policy().monthly_allowance;
        debug_log(format!("tier set to {tier} ({:?})", self.viewer.credits));
    }

    pub fn reset_credits(&mut self) {
        self.viewer.credits = self.viewer.tier.policy().monthly_allowance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(tier: Tier) -> EntitlementStore {
        let mut viewer = Viewer::default();
        viewer.tier = tier;
        viewer.credits = tier.policy().monthly_allowance;
        EntitlementStore::new(viewer)
    }

    #[test]
    fn set_tier_resets_to_allowance() {
        let mut store = EntitlementStore::default();
        for tier in Tier::ALL {
            store.consume_credit();
            store.set_tier(tier);
            assert_eq!(store.tier(), tier);
            assert_eq!(store.credits(), TierPolicy::for_tier(tier).monthly_allowance);
        }
    }

    #[test]
    fn consume_decrements_by_one() {
        let mut store = store_with(Tier::Free);
        assert_eq!(store.credits(), Credits::Limited(3));
        assert!(store.consume_credit());
        assert_eq!(store.credits(), Credits::Limited(2));
    }

    #[test]
    fn consume_at_zero_fails_without_mutation() {
        let mut store = store_with(Tier::Free);
        for _ in 0..3 {
            assert!(store.consume_credit());
        }
        assert!(!store.can_reply());
        let before = store.viewer().clone();
        assert!(!store.consume_credit());
        assert_eq!(store.viewer(), &before);
    }

    #[test]
    fn unlimited_never_decrements() {
        let mut store = store_with(Tier::Creator);
        for _ in 0..100 {
            assert!(store.consume_credit());
        }
        assert_eq!(store.credits(), Credits::Unlimited);
        assert!(store.can_reply());
    }

    #[test]
    fn reset_credits_uses_current_tier() {
        let mut store = store_with(Tier::Plus);
        store.consume_credit();
        store.consume_credit();
        assert_eq!(store.credits(), Credits::Limited(28));
        store.reset_credits();
        assert_eq!(store.credits(), Credits::Limited(30));
    }

    #[test]
    fn parses_tier_names() {
        assert_eq!("Creator".parse::<Tier>(), Ok(Tier::Creator));
        assert_eq!(" plus ".parse::<Tier>(), Ok(Tier::Plus));
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn credit_labels() {
        assert_eq!(Credits::Unlimited.label(), "Unlimited");
        assert_eq!(Credits::Limited(2).label(), "2 left this month");
        assert_eq!(Credits::Limited(0).bar_label(), "0 reply credits");
        assert_eq!(Tier::Plus.policy().allowance_label(), "30 replies/mo");
    }
}
