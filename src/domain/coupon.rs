use crate::domain::money::{Cents, Currency};
use crate::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum DiscountKind {
    /// Percentage of the pre-discount subtotal, in [0, 100].
    Percentage(Decimal),
    /// Flat amount in cents, clamped to the subtotal at application time.
    Fixed(Cents),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "duration")]
pub enum CouponDuration {
    Once,
    Forever,
    Repeating { months: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "products")]
pub enum ProductScope {
    All,
    Specific(Vec<String>),
}

impl ProductScope {
    pub fn covers(&self, product_id: &str) -> bool {
        match self {
            ProductScope::All => true,
            ProductScope::Specific(ids) => ids.iter().any(|id| id == product_id),
        }
    }
}

/// A discount definition with redemption caps and a validity window.
///
/// `times_redeemed` is monotonically non-decreasing and never exceeds
/// `max_redemptions`; the stores enforce the increment atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub kind: DiscountKind,
    pub currency: Currency,
    pub duration: CouponDuration,
    pub max_redemptions: Option<u32>,
    pub max_redemptions_per_customer: Option<u32>,
    pub times_redeemed: u32,
    pub product_scope: ProductScope,
    pub redeemable_from: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Coupon {
    /// Builds a coupon, rejecting percentage values outside [0, 100].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        kind: DiscountKind,
        currency: Currency,
        duration: CouponDuration,
        max_redemptions: Option<u32>,
        max_redemptions_per_customer: Option<u32>,
        product_scope: ProductScope,
    ) -> Result<Self> {
        let coupon = Self {
            id: id.into(),
            code: code.into(),
            kind,
            currency,
            duration,
            max_redemptions,
            max_redemptions_per_customer,
            times_redeemed: 0,
            product_scope,
            redeemable_from: None,
            expires_at: None,
            is_active: true,
        };
        coupon.validate()?;
        Ok(coupon)
    }

    /// Rejects percentage values outside [0, 100]. Stores run this on insert
    /// as well, so a deserialized coupon (seed file, persisted row) obeys the
    /// same bound as a constructed one.
    pub fn validate(&self) -> Result<()> {
        if let DiscountKind::Percentage(pct) = self.kind
            && (pct < Decimal::ZERO || pct > Decimal::from(100))
        {
            return Err(CheckoutError::Invalid(format!(
                "percentage discount must be within [0, 100], got {pct}"
            )));
        }
        Ok(())
    }

    /// Discount for a cart amount: fixed is clamped to the cart, percentage
    /// is rounded to whole cents.
    pub fn discount_for(&self, cart_amount: Cents) -> Cents {
        match self.kind {
            DiscountKind::Fixed(value) => Cents(value.0.min(cart_amount.0)),
            DiscountKind::Percentage(pct) => cart_amount.percentage(pct),
        }
    }

    /// Human-facing rendering of the discount, e.g. `10%` or `$20.00 off`.
    pub fn discount_display(&self) -> String {
        match self.kind {
            DiscountKind::Percentage(pct) => format!("{pct}% off"),
            DiscountKind::Fixed(value) => {
                format!("{}.{:02} {} off", value.0 / 100, value.0 % 100, self.currency)
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_redemptions
            .is_some_and(|cap| self.times_redeemed >= cap)
    }
}

/// Why a coupon failed validation. Typed so callers can render a message
/// without parsing error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    UnknownCode,
    Inactive,
    NotYetRedeemable,
    Expired,
    RedemptionCapReached,
    CustomerCapReached,
    ProductNotCovered,
}

impl CouponRejection {
    pub fn message(&self) -> &'static str {
        match self {
            CouponRejection::UnknownCode => "coupon code not found",
            CouponRejection::Inactive => "coupon is not active",
            CouponRejection::NotYetRedeemable => "coupon is not redeemable yet",
            CouponRejection::Expired => "coupon has expired",
            CouponRejection::RedemptionCapReached => "coupon redemption limit reached",
            CouponRejection::CustomerCapReached => "coupon already used by this customer",
            CouponRejection::ProductNotCovered => "coupon does not apply to this product",
        }
    }
}

/// Outcome of `CouponLedger::validate`. A business-rule failure is a value,
/// not an error. Serializes with a boolean `valid` flag beside the variant's
/// fields, e.g. `{"valid": false, "reason": "expired"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CouponValidationWire", try_from = "CouponValidationWire")]
pub enum CouponValidation {
    Valid {
        coupon_id: String,
        discount_amount: Cents,
        discount_display: String,
        final_amount: Cents,
    },
    Invalid { reason: CouponRejection },
}

#[derive(Clone, Serialize, Deserialize)]
struct CouponValidationWire {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    coupon_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    discount_amount: Option<Cents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    discount_display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_amount: Option<Cents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<CouponRejection>,
}

impl From<CouponValidation> for CouponValidationWire {
    fn from(validation: CouponValidation) -> Self {
        match validation {
            CouponValidation::Valid {
                coupon_id,
                discount_amount,
                discount_display,
                final_amount,
            } => Self {
                valid: true,
                coupon_id: Some(coupon_id),
                discount_amount: Some(discount_amount),
                discount_display: Some(discount_display),
                final_amount: Some(final_amount),
                reason: None,
            },
            CouponValidation::Invalid { reason } => Self {
                valid: false,
                coupon_id: None,
                discount_amount: None,
                discount_display: None,
                final_amount: None,
                reason: Some(reason),
            },
        }
    }
}

impl TryFrom<CouponValidationWire> for CouponValidation {
    type Error = String;

    fn try_from(wire: CouponValidationWire) -> std::result::Result<Self, Self::Error> {
        if wire.valid {
            match (
                wire.coupon_id,
                wire.discount_amount,
                wire.discount_display,
                wire.final_amount,
            ) {
                (
                    Some(coupon_id),
                    Some(discount_amount),
                    Some(discount_display),
                    Some(final_amount),
                ) => Ok(CouponValidation::Valid {
                    coupon_id,
                    discount_amount,
                    discount_display,
                    final_amount,
                }),
                _ => Err("valid coupon response is missing its discount fields".to_string()),
            }
        } else {
            wire.reason
                .map(|reason| CouponValidation::Invalid { reason })
                .ok_or_else(|| "invalid coupon response is missing its reason".to_string())
        }
    }
}

impl CouponValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, CouponValidation::Valid { .. })
    }
}

/// One immutable row per successful application of a coupon to a payment.
/// Doubles as the audit log and the per-customer redemption counter basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponRedemption {
    pub coupon_id: String,
    pub payment_reference: String,
    pub customer_email: Option<String>,
    pub discount_applied: Cents,
    pub original_amount: Cents,
    pub final_amount: Cents,
    pub redeemed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn percentage_coupon(pct: Decimal) -> Result<Coupon> {
        Coupon::new(
            "cpn_1",
            "SAVE10",
            DiscountKind::Percentage(pct),
            Currency::Usd,
            CouponDuration::Once,
            None,
            None,
            ProductScope::All,
        )
    }

    #[test]
    fn test_percentage_bounds_enforced_at_creation() {
        assert!(percentage_coupon(dec!(10)).is_ok());
        assert!(percentage_coupon(dec!(100)).is_ok());
        assert!(matches!(
            percentage_coupon(dec!(101)),
            Err(CheckoutError::Invalid(_))
        ));
        assert!(matches!(
            percentage_coupon(dec!(-1)),
            Err(CheckoutError::Invalid(_))
        ));
    }

    #[test]
    fn test_percentage_discount_amount() {
        let coupon = percentage_coupon(dec!(10)).unwrap();
        assert_eq!(coupon.discount_for(Cents(5000)), Cents(500));
    }

    #[test]
    fn test_fixed_discount_clamped_to_cart() {
        let coupon = Coupon::new(
            "cpn_2",
            "FLAT20",
            DiscountKind::Fixed(Cents(2000)),
            Currency::Usd,
            CouponDuration::Once,
            None,
            None,
            ProductScope::All,
        )
        .unwrap();
        assert_eq!(coupon.discount_for(Cents(1500)), Cents(1500));
        assert_eq!(coupon.discount_for(Cents(5000)), Cents(2000));
    }

    #[test]
    fn test_exhaustion() {
        let mut coupon = percentage_coupon(dec!(10)).unwrap();
        coupon.max_redemptions = Some(2);
        assert!(!coupon.is_exhausted());
        coupon.times_redeemed = 2;
        assert!(coupon.is_exhausted());
    }

    #[test]
    fn test_validation_serializes_boolean_flag() {
        let valid = CouponValidation::Valid {
            coupon_id: "cpn_1".into(),
            discount_amount: Cents(500),
            discount_display: "10% off".into(),
            final_amount: Cents(4500),
        };
        let json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json["valid"], serde_json::json!(true));
        assert_eq!(json["final_amount"], serde_json::json!(4500));

        let invalid = CouponValidation::Invalid {
            reason: CouponRejection::Expired,
        };
        let json = serde_json::to_value(&invalid).unwrap();
        assert_eq!(json["valid"], serde_json::json!(false));
        assert_eq!(json["reason"], serde_json::json!("expired"));

        let back: CouponValidation = serde_json::from_value(json).unwrap();
        assert_eq!(back, invalid);
    }

    #[test]
    fn test_product_scope() {
        let scope = ProductScope::Specific(vec!["prod_a".into()]);
        assert!(scope.covers("prod_a"));
        assert!(!scope.covers("prod_b"));
        assert!(ProductScope::All.covers("prod_b"));
    }
}
