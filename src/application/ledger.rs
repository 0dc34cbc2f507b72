use crate::domain::coupon::{CouponRedemption, CouponRejection, CouponValidation};
use crate::domain::money::Cents;
use crate::domain::ports::{ClockRef, CouponStoreRef, RedemptionOutcome};
use crate::error::{CheckoutError, Result};

/// Amounts captured on a redemption row for the audit log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedemptionAmounts {
    pub discount_applied: Cents,
    pub original_amount: Cents,
    pub final_amount: Cents,
}

/// Validates coupons and records redemptions.
///
/// Validation is read-only and returns a typed result; an invalid coupon is
/// an expected business condition, not an error. Redemption is at-most-once
/// per payment reference.
#[derive(Clone)]
pub struct CouponLedger {
    coupons: CouponStoreRef,
    clock: ClockRef,
}

impl CouponLedger {
    pub fn new(coupons: CouponStoreRef, clock: ClockRef) -> Self {
        Self { coupons, clock }
    }

    /// Runs the validation checks in order, short-circuiting on the first
    /// failure: existence/active, time window, global cap, per-customer cap,
    /// product scope. Only malformed input produces an `Err`.
    pub async fn validate(
        &self,
        code: &str,
        product_id: Option<&str>,
        cart_amount: Cents,
        customer_email: Option<&str>,
    ) -> Result<CouponValidation> {
        if code.trim().is_empty() {
            return Err(CheckoutError::Invalid("coupon code is empty".to_string()));
        }

        let Some(coupon) = self.coupons.by_code(code).await? else {
            return Ok(invalid(CouponRejection::UnknownCode));
        };
        if !coupon.is_active {
            return Ok(invalid(CouponRejection::Inactive));
        }

        let now = self.clock.now();
        if let Some(from) = coupon.redeemable_from
            && now < from
        {
            return Ok(invalid(CouponRejection::NotYetRedeemable));
        }
        if let Some(until) = coupon.expires_at
            && now > until
        {
            return Ok(invalid(CouponRejection::Expired));
        }

        if coupon.is_exhausted() {
            return Ok(invalid(CouponRejection::RedemptionCapReached));
        }

        if let Some(email) = customer_email
            && let Some(per_customer_cap) = coupon.max_redemptions_per_customer
        {
            let used = self
                .coupons
                .redemptions_by_customer(&coupon.id, email)
                .await?;
            if used >= per_customer_cap {
                return Ok(invalid(CouponRejection::CustomerCapReached));
            }
        }

        if let Some(product_id) = product_id
            && !coupon.product_scope.covers(product_id)
        {
            return Ok(invalid(CouponRejection::ProductNotCovered));
        }

        let discount_amount = coupon.discount_for(cart_amount);
        let final_amount = cart_amount.saturating_sub(discount_amount);
        tracing::debug!(
            code,
            discount = discount_amount.value(),
            "coupon validated"
        );
        Ok(CouponValidation::Valid {
            coupon_id: coupon.id.clone(),
            discount_amount,
            discount_display: coupon.discount_display(),
            final_amount,
        })
    }

    /// `redeem` keyed by code instead of id, for callers holding a quote's
    /// coupon code.
    pub async fn redeem_by_code(
        &self,
        code: &str,
        payment_reference: &str,
        customer_email: Option<&str>,
        amounts: RedemptionAmounts,
    ) -> Result<()> {
        let coupon = self
            .coupons
            .by_code(code)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("coupon", code.to_string()))?;
        self.redeem(&coupon.id, payment_reference, customer_email, amounts)
            .await
    }

    /// Records one redemption against a payment reference.
    ///
    /// The store performs the row insert and the counter increment as a
    /// single atomic read-modify-write; a retry with the same reference is a
    /// no-op, and an exhausted cap is a `Conflict`.
    pub async fn redeem(
        &self,
        coupon_id: &str,
        payment_reference: &str,
        customer_email: Option<&str>,
        amounts: RedemptionAmounts,
    ) -> Result<()> {
        let coupon = self
            .coupons
            .by_id(coupon_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("coupon", coupon_id.to_string()))?;

        let redemption = CouponRedemption {
            coupon_id: coupon.id.clone(),
            payment_reference: payment_reference.to_string(),
            customer_email: customer_email.map(str::to_string),
            discount_applied: amounts.discount_applied,
            original_amount: amounts.original_amount,
            final_amount: amounts.final_amount,
            redeemed_at: self.clock.now(),
        };

        match self.coupons.record_redemption(redemption).await? {
            RedemptionOutcome::Recorded => {
                tracing::info!(coupon_id, payment_reference, "coupon redeemed");
                Ok(())
            }
            RedemptionOutcome::Duplicate => {
                tracing::debug!(coupon_id, payment_reference, "duplicate redemption ignored");
                Ok(())
            }
            RedemptionOutcome::CapExhausted => Err(CheckoutError::Conflict(format!(
                "coupon {coupon_id} redemption cap reached"
            ))),
        }
    }
}

fn invalid(reason: CouponRejection) -> CouponValidation {
    CouponValidation::Invalid { reason }
}
