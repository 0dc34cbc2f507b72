use crate::application::ledger::CouponLedger;
use crate::domain::coupon::CouponValidation;
use crate::domain::money::Cents;
use crate::domain::ports::{CatalogStoreRef, ClockRef, QuoteStoreRef, TaxRateLookupRef};
use crate::domain::quote::{Cart, ChargeMode, LineItem, Quote};
use crate::error::{CheckoutError, Result};
use chrono::Duration;
use uuid::Uuid;

/// Prices carts into immutable, cached Quotes.
///
/// The cart hash is the idempotency contract: pricing an identical cart twice
/// returns the stored Quote, same id and same amounts, across page reloads
/// and double submits.
#[derive(Clone)]
pub struct QuoteCalculator {
    catalog: CatalogStoreRef,
    quotes: QuoteStoreRef,
    ledger: CouponLedger,
    tax_rates: TaxRateLookupRef,
    clock: ClockRef,
    quote_ttl: Option<Duration>,
}

impl QuoteCalculator {
    pub fn new(
        catalog: CatalogStoreRef,
        quotes: QuoteStoreRef,
        ledger: CouponLedger,
        tax_rates: TaxRateLookupRef,
        clock: ClockRef,
        quote_ttl: Option<Duration>,
    ) -> Self {
        Self {
            catalog,
            quotes,
            ledger,
            tax_rates,
            clock,
            quote_ttl,
        }
    }

    /// Prices a cart: base amount from plan tier or product price, plus
    /// selected order bumps, minus the validated coupon discount (clamped to
    /// the subtotal), plus tax on the post-discount subtotal.
    ///
    /// A fresh quote is only computed when the cache has no live quote for
    /// the cart hash; an expired cached quote is re-priced, never returned.
    pub async fn price(&self, cart: &Cart) -> Result<Quote> {
        let cart_hash = cart.hash();
        let now = self.clock.now();

        if let Some(existing) = self.quotes.by_cart_hash(&cart_hash).await?
            && !existing.is_expired(now)
        {
            tracing::debug!(cart_hash, quote_id = existing.id, "quote cache hit");
            return Ok(existing);
        }

        let (base_amount, mode, product_id, line_items) = self.resolve_base(cart).await?;

        let mut subtotal = base_amount;
        let mut items = line_items;
        for bump_id in &cart.order_bump_ids {
            let bump = self
                .catalog
                .order_bump(bump_id)
                .await?
                .ok_or_else(|| CheckoutError::NotFound("order bump", bump_id.clone()))?;
            if !bump.active {
                return Err(CheckoutError::Invalid(format!(
                    "order bump {bump_id} is not active"
                )));
            }
            let product = self
                .catalog
                .product(&bump.product_id)
                .await?
                .ok_or_else(|| CheckoutError::NotFound("product", bump.product_id.clone()))?;
            subtotal += product.price;
            items.push(LineItem {
                product_id: product.id.clone(),
                description: bump.headline.clone(),
                amount: product.price,
            });
        }

        let discount = match &cart.coupon_code {
            None => Cents::ZERO,
            Some(code) => {
                // The storefront validates before submitting; an invalid code
                // here is a malformed request, not a render-a-message case.
                match self
                    .ledger
                    .validate(code, Some(&product_id), subtotal, None)
                    .await?
                {
                    CouponValidation::Valid {
                        discount_amount, ..
                    } => discount_amount,
                    CouponValidation::Invalid { reason } => {
                        return Err(CheckoutError::Invalid(format!(
                            "coupon {code} rejected: {}",
                            reason.message()
                        )));
                    }
                }
            }
        };
        let discounted = subtotal.saturating_sub(discount);

        let tax = match &cart.tax_jurisdiction {
            Some(jurisdiction) => self
                .tax_rates
                .rate_for(jurisdiction)
                .map(|rate| discounted.apply_rate(rate))
                .unwrap_or(Cents::ZERO),
            None => Cents::ZERO,
        };

        let quote = Quote {
            id: format!("qt_{}", Uuid::new_v4()),
            cart_hash: cart_hash.clone(),
            product_id: cart.product_id.clone(),
            plan_id: cart.plan_id.clone(),
            order_bump_ids: cart.order_bump_ids.clone(),
            coupon_code: cart.coupon_code.clone(),
            currency: cart.currency,
            subtotal,
            discount,
            tax,
            total: discounted + tax,
            line_items: items,
            mode,
            created_at: now,
            expires_at: self.quote_ttl.map(|ttl| now + ttl),
        };

        // Put-if-absent: when two pricings race, both return the winner.
        let stored = self.quotes.insert_or_get(quote, now).await?;
        tracing::info!(
            cart_hash,
            quote_id = stored.id,
            total = stored.total.value(),
            "quote priced"
        );
        Ok(stored)
    }

    /// Fetches a quote that is still valid to charge. Expired quotes fail
    /// fast; the caller must re-price.
    pub async fn fetch_chargeable(&self, quote_id: &str) -> Result<Quote> {
        let quote = self
            .quotes
            .by_id(quote_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("quote", quote_id.to_string()))?;
        if quote.is_expired(self.clock.now()) {
            return Err(CheckoutError::Invalid(format!(
                "quote {quote_id} has expired; re-price the cart"
            )));
        }
        Ok(quote)
    }

    /// Base amount and mode from exactly one of plan (tiered) or product
    /// (flat).
    async fn resolve_base(
        &self,
        cart: &Cart,
    ) -> Result<(Cents, ChargeMode, String, Vec<LineItem>)> {
        match (&cart.product_id, &cart.plan_id) {
            (Some(_), Some(_)) | (None, None) => Err(CheckoutError::Invalid(
                "cart must reference exactly one of product or plan".to_string(),
            )),
            (Some(product_id), None) => {
                let product = self
                    .catalog
                    .product(product_id)
                    .await?
                    .ok_or_else(|| CheckoutError::NotFound("product", product_id.clone()))?;
                if !product.active {
                    return Err(CheckoutError::Invalid(format!(
                        "product {product_id} is not active"
                    )));
                }
                if product.currency != cart.currency {
                    return Err(CheckoutError::Invalid(format!(
                        "product {product_id} is priced in {}, cart is {}",
                        product.currency, cart.currency
                    )));
                }
                let item = LineItem {
                    product_id: product.id.clone(),
                    description: product.name.clone(),
                    amount: product.price,
                };
                Ok((product.price, ChargeMode::OneTime, product.id, vec![item]))
            }
            (None, Some(plan_id)) => {
                let plan = self
                    .catalog
                    .plan(plan_id)
                    .await?
                    .ok_or_else(|| CheckoutError::NotFound("plan", plan_id.clone()))?;
                if plan.currency != cart.currency {
                    return Err(CheckoutError::Invalid(format!(
                        "plan {plan_id} is priced in {}, cart is {}",
                        plan.currency, cart.currency
                    )));
                }
                let amount = plan.base_amount(cart.quantity).ok_or_else(|| {
                    CheckoutError::Invalid(format!("plan {plan_id} has no pricing tiers"))
                })?;
                let mode = match plan.interval {
                    Some(interval) => ChargeMode::Recurring { interval },
                    None => ChargeMode::OneTime,
                };
                let item = LineItem {
                    product_id: plan.product_id.clone(),
                    description: format!("plan {}", plan.id),
                    amount,
                };
                Ok((amount, mode, plan.product_id, vec![item]))
            }
        }
    }
}
