use crate::domain::catalog::Offer;
use crate::domain::money::{Cents, Currency};
use crate::domain::ports::{
    CatalogStoreRef, ClockRef, OffSessionOutcome, PaymentIntentRequest, PaymentProcessorRef,
    ProcessorCustomer, SubscriptionRequest,
};
use crate::domain::quote::{ChargeMode, Quote};
use crate::domain::session::CheckoutSession;
use crate::error::{CheckoutError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInfo {
    pub email: String,
    pub name: Option<String>,
}

/// Everything the storefront needs to hand the processor's client SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeHandle {
    pub intent_id: String,
    pub client_secret: String,
    pub customer_id: String,
    pub mode: ChargeMode,
}

/// Turns Quotes into processor-side charges or subscriptions.
///
/// Correlation runs through processor metadata: the quote id and offer/bump
/// ids ride along so an asynchronous confirmation can find its way back
/// without a database round trip.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    processor: PaymentProcessorRef,
    catalog: CatalogStoreRef,
    clock: ClockRef,
}

impl PaymentOrchestrator {
    pub fn new(processor: PaymentProcessorRef, catalog: CatalogStoreRef, clock: ClockRef) -> Self {
        Self {
            processor,
            catalog,
            clock,
        }
    }

    /// Charges a quote. Recurring when the quote priced a plan with an
    /// interval (subscription, first invoice's payment handle returned);
    /// one-time payment intent for `quote.total` otherwise.
    pub async fn charge(&self, quote: &Quote, customer: &CustomerInfo) -> Result<ChargeHandle> {
        if quote.is_expired(self.clock.now()) {
            return Err(CheckoutError::Invalid(format!(
                "quote {} has expired; re-price the cart",
                quote.id
            )));
        }

        let customer_record = self.lookup_or_create_customer(&customer.email).await?;
        let metadata = quote_metadata(quote);

        let handle = match quote.mode {
            ChargeMode::Recurring { interval } => {
                let plan_id = quote.plan_id.as_deref().ok_or_else(|| {
                    CheckoutError::Invalid(format!(
                        "quote {} is recurring but references no plan",
                        quote.id
                    ))
                })?;
                let plan = self
                    .catalog
                    .plan(plan_id)
                    .await?
                    .ok_or_else(|| CheckoutError::NotFound("plan", plan_id.to_string()))?;
                let subscription = self
                    .processor
                    .create_subscription(SubscriptionRequest {
                        customer_id: customer_record.id.clone(),
                        plan_id: plan.id.clone(),
                        amount: quote.total,
                        currency: quote.currency,
                        interval,
                        trial_days: plan.trial_days,
                        metadata,
                    })
                    .await?;
                ChargeHandle {
                    intent_id: subscription.first_invoice_intent.id,
                    client_secret: subscription.first_invoice_intent.client_secret,
                    customer_id: customer_record.id,
                    mode: quote.mode,
                }
            }
            ChargeMode::OneTime => {
                let intent = self
                    .processor
                    .create_payment_intent(PaymentIntentRequest {
                        amount: quote.total,
                        currency: quote.currency,
                        customer_id: customer_record.id.clone(),
                        metadata,
                    })
                    .await?;
                ChargeHandle {
                    intent_id: intent.id,
                    client_secret: intent.client_secret,
                    customer_id: customer_record.id,
                    mode: quote.mode,
                }
            }
        };

        tracing::info!(
            quote_id = quote.id,
            intent_id = handle.intent_id,
            mode = ?handle.mode,
            "charge created"
        );
        Ok(handle)
    }

    /// Charges a stored payment method off-session for a post-purchase offer.
    /// The idempotency key is derived from (session, offer), so funds for one
    /// offer are captured at most once per session no matter how many
    /// concurrent or retried accepts reach the processor. A decline comes
    /// back as a value and is never retried here; only
    /// `ProcessorUnavailable` errors are safe to retry.
    pub async fn charge_upsell_offer(
        &self,
        session: &CheckoutSession,
        offer: &Offer,
        payment_method: &str,
    ) -> Result<OffSessionOutcome> {
        if !offer.is_available(self.clock.now()) {
            return Err(CheckoutError::Invalid(format!(
                "offer {} is outside its availability window",
                offer.id
            )));
        }
        let email = session.customer_email.as_deref().ok_or_else(|| {
            CheckoutError::Invalid(format!("session {} has no customer email", session.id))
        })?;
        let customer = self.lookup_or_create_customer(email).await?;

        let idempotency_key = format!("offer|{}|{}", session.id, offer.id);
        let mut metadata = HashMap::new();
        metadata.insert("session_id".to_string(), session.id.clone());
        metadata.insert("offer_id".to_string(), offer.id.clone());

        let outcome = self
            .processor
            .charge_off_session(
                &customer.id,
                payment_method,
                offer.price,
                offer.currency,
                &idempotency_key,
                metadata,
            )
            .await?;
        if let OffSessionOutcome::Declined { reason } = &outcome {
            tracing::warn!(
                session_id = session.id,
                offer_id = offer.id,
                reason,
                "off-session charge declined"
            );
        }
        Ok(outcome)
    }

    /// Issues a processor-side refund for a captured payment.
    pub async fn refund(&self, payment_reference: &str) -> Result<()> {
        self.processor.refund(payment_reference).await
    }

    /// Customer lookup-or-create by email. The processor does not enforce
    /// email uniqueness, so zero or many matches are both normal; the
    /// tie-break is the most recently created record, then the largest id so
    /// equal timestamps still resolve deterministically.
    pub async fn lookup_or_create_customer(&self, email: &str) -> Result<ProcessorCustomer> {
        let mut matches = self.processor.customers_by_email(email).await?;
        matches.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        match matches.pop() {
            Some(existing) => Ok(existing),
            None => self.processor.create_customer(email).await,
        }
    }
}

fn quote_metadata(quote: &Quote) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("quote_id".to_string(), quote.id.clone());
    metadata.insert("cart_hash".to_string(), quote.cart_hash.clone());
    if !quote.order_bump_ids.is_empty() {
        metadata.insert(
            "order_bump_ids".to_string(),
            quote.order_bump_ids.join(","),
        );
    }
    if let Some(code) = &quote.coupon_code {
        metadata.insert("coupon_code".to_string(), code.clone());
    }
    metadata
}
