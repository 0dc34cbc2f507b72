use crate::domain::money::{Cents, Currency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sellable item with a flat one-time price.
///
/// Immutable once referenced by a Quote; the stores never mutate catalog rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Cents,
    pub currency: Currency,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringInterval {
    Day,
    Week,
    Month,
    Year,
}

/// One pricing tier of a plan. The first tier carries the base amount;
/// `up_to` bounds the quantity the tier covers (open-ended when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTier {
    pub amount: Cents,
    pub up_to: Option<u32>,
}

/// Tiered pricing under a Product, optionally recurring with a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub product_id: String,
    pub tiers: Vec<PlanTier>,
    pub currency: Currency,
    pub interval: Option<RecurringInterval>,
    pub trial_days: u32,
}

impl Plan {
    /// Resolves the base amount for a quantity from the tier table.
    /// Falls back to the last tier when the quantity exceeds every bound.
    pub fn base_amount(&self, quantity: u32) -> Option<Cents> {
        self.tiers
            .iter()
            .find(|t| t.up_to.is_none_or(|cap| quantity <= cap))
            .or_else(|| self.tiers.last())
            .map(|t| t.amount)
    }
}

/// An add-on product surfaced alongside a checkout with its own display copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBump {
    pub id: String,
    pub product_id: String,
    pub headline: String,
    pub description: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferContext {
    Standalone,
    OrderBump,
    Upsell,
    Downsell,
}

/// A priced, context-tagged wrapper around a Product, used by funnel nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub product_id: String,
    pub context: OfferContext,
    pub price: Cents,
    pub currency: Currency,
    pub coupon_id: Option<String>,
    pub max_redemptions: Option<u32>,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
}

impl Offer {
    /// Availability window check. Absent bounds are unconstrained.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        if let Some(from) = self.available_from
            && now < from
        {
            return false;
        }
        if let Some(until) = self.available_until
            && now > until
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn plan_with_tiers(tiers: Vec<PlanTier>) -> Plan {
        Plan {
            id: "plan_1".into(),
            product_id: "prod_1".into(),
            tiers,
            currency: Currency::Usd,
            interval: Some(RecurringInterval::Month),
            trial_days: 0,
        }
    }

    #[test]
    fn test_plan_base_amount_first_tier() {
        let plan = plan_with_tiers(vec![
            PlanTier {
                amount: Cents(999),
                up_to: Some(5),
            },
            PlanTier {
                amount: Cents(799),
                up_to: None,
            },
        ]);
        assert_eq!(plan.base_amount(1), Some(Cents(999)));
        assert_eq!(plan.base_amount(6), Some(Cents(799)));
    }

    #[test]
    fn test_plan_base_amount_empty_tiers() {
        let plan = plan_with_tiers(vec![]);
        assert_eq!(plan.base_amount(1), None);
    }

    #[test]
    fn test_offer_availability_window() {
        let now = Utc::now();
        let offer = Offer {
            id: "offer_1".into(),
            product_id: "prod_1".into(),
            context: OfferContext::Upsell,
            price: Cents(2000),
            currency: Currency::Usd,
            coupon_id: None,
            max_redemptions: None,
            available_from: Some(now - Duration::hours(1)),
            available_until: Some(now + Duration::hours(1)),
        };
        assert!(offer.is_available(now));
        assert!(!offer.is_available(now + Duration::hours(2)));
        assert!(!offer.is_available(now - Duration::hours(2)));
    }
}
