//! Subscription plans and their monthly video allowances.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::StripeSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    Free,
    Founder,
    Pro,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::Founder, Plan::Pro];

    pub fn name(self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Founder => "Founder",
            Plan::Pro => "Pro",
        }
    }

    pub fn monthly_video_limit(self) -> i32 {
        match self {
            Plan::Free => 5,
            Plan::Founder => 15,
            Plan::Pro => 40,
        }
    }

    /// Monthly price in whole USD, as shown on the plans page.
    pub fn monthly_price_usd(self) -> u32 {
        match self {
            Plan::Free => 0,
            Plan::Founder => 49,
            Plan::Pro => 99,
        }
    }

    pub fn from_name(name: &str) -> Option<Plan> {
        Plan::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Only paid plans have a checkout price.
    pub fn price_id(self, stripe: &StripeSettings) -> Option<&str> {
        match self {
            Plan::Free => None,
            Plan::Founder => Some(stripe.founder_price_id.as_str()),
            Plan::Pro => Some(stripe.pro_price_id.as_str()),
        }
    }

    /// Unknown prices fall back to Free.
    pub fn from_price_id(price_id: &str, stripe: &StripeSettings) -> Plan {
        if price_id == stripe.founder_price_id {
            Plan::Founder
        } else if price_id == stripe.pro_price_id {
            Plan::Pro
        } else {
            Plan::Free
        }
    }

    /// The plan a user is entitled to given their latest subscription row.
    pub fn effective(subscription: Option<(&str, &str)>) -> Plan {
        match subscription {
            Some((status, plan_name)) if is_entitled_status(status) => {
                Plan::from_name(plan_name).unwrap_or(Plan::Free)
            }
            _ => Plan::Free,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn is_entitled_status(status: &str) -> bool {
    matches!(status, "active" | "trialing")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn stripe() -> StripeSettings {
        StripeSettings {
            base_url: "http://stripe.test".into(),
            secret_key: Secret::new("sk".into()),
            webhook_secret: Secret::new("whsec".into()),
            founder_price_id: "price_founder".into(),
            pro_price_id: "price_pro".into(),
        }
    }

    #[test]
    fn limits_per_plan() {
        assert_eq!(Plan::Free.monthly_video_limit(), 5);
        assert_eq!(Plan::Founder.monthly_video_limit(), 15);
        assert_eq!(Plan::Pro.monthly_video_limit(), 40);
    }

    #[test]
    fn price_ids_map_both_ways() {
        let stripe = stripe();
        assert_eq!(Plan::from_price_id("price_pro", &stripe), Plan::Pro);
        assert_eq!(Plan::from_price_id("price_founder", &stripe), Plan::Founder);
        assert_eq!(Plan::from_price_id("price_legacy", &stripe), Plan::Free);
        assert_eq!(Plan::Pro.price_id(&stripe), Some("price_pro"));
        assert_eq!(Plan::Free.price_id(&stripe), None);
    }

    #[test]
    fn only_active_or_trialing_subscriptions_count() {
        assert_eq!(Plan::effective(Some(("active", "Pro"))), Plan::Pro);
        assert_eq!(Plan::effective(Some(("trialing", "Founder"))), Plan::Founder);
        assert_eq!(Plan::effective(Some(("past_due", "Pro"))), Plan::Free);
        assert_eq!(Plan::effective(Some(("canceled", "Pro"))), Plan::Free);
        assert_eq!(Plan::effective(Some(("active", "Enterprise"))), Plan::Free);
        assert_eq!(Plan::effective(None), Plan::Free);
    }
}
