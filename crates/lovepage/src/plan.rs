//! Plan tiers and the expiration policy.
//!
//! Amounts are always resolved server-side from the tier — client-supplied
//! prices are never trusted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime of a basic-tier page after finalization.
pub const BASIC_PAGE_TTL_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Constrained tier: the page expires [`BASIC_PAGE_TTL_HOURS`] after
    /// finalization.
    #[default]
    Basic,
    /// The page never expires.
    Forever,
}

impl PlanTier {
    /// Price in cents, fixed server-side.
    pub fn price_cents(self) -> u32 {
        match self {
            PlanTier::Basic => 990,
            PlanTier::Forever => 2490,
        }
    }

    /// Price as a decimal string, e.g. `"9.90"`.
    pub fn price_decimal(self) -> String {
        let cents = self.price_cents();
        format!("{}.{:02}", cents / 100, cents % 100)
    }

    /// Product name shown on provider checkout pages.
    pub fn display_name(self) -> &'static str {
        match self {
            PlanTier::Basic => "Love page (12 hours)",
            PlanTier::Forever => "Love page (forever)",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Basic => "basic",
            PlanTier::Forever => "forever",
        }
    }
}

/// Expiration policy: pure function of tier and finalize time.
///
/// Enforcement (refusing to serve, deletion) is the caller's concern.
pub fn expire_at(tier: PlanTier, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match tier {
        PlanTier::Basic => Some(now + Duration::hours(BASIC_PAGE_TTL_HOURS)),
        PlanTier::Forever => None,
    }
}
