use crate::application::funnel_flow::{DecisionOutcome, FunnelFlow, SessionContext};
use crate::application::ledger::{CouponLedger, RedemptionAmounts};
use crate::application::orders::{ConfirmationOutcome, OrderRecorder, PaymentConfirmation};
use crate::application::payments::{ChargeHandle, CustomerInfo, PaymentOrchestrator};
use crate::application::pricing::QuoteCalculator;
use crate::domain::coupon::CouponValidation;
use crate::domain::money::{Cents, Currency};
use crate::domain::order::Order;
use crate::domain::ports::{
    CatalogStoreRef, ClockRef, CouponStoreRef, FunnelStoreRef, OrderStoreRef,
    PaymentProcessorRef, QuoteStoreRef, SessionStoreRef, TaxRateLookupRef,
};
use crate::domain::quote::{Cart, ChargeMode, TaxJurisdiction};
use crate::domain::session::PurchaseDelta;
use crate::error::{CheckoutError, Result};
use chrono::Duration;

/// Everything the checkout page submits to start a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutIntentRequest {
    pub checkout_id: String,
    pub email: String,
    pub product_id: Option<String>,
    pub plan_id: Option<String>,
    pub order_bump_ids: Vec<String>,
    pub coupon_code: Option<String>,
    pub currency: Currency,
    pub billing_country: Option<String>,
    pub vat_id: Option<String>,
    pub enable_tax: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutIntentResponse {
    pub session_id: String,
    pub quote_id: String,
    pub intent_id: String,
    pub client_secret: String,
    pub amount: Cents,
    pub discount_amount: Cents,
    pub mode: ChargeMode,
}

/// The processor's asynchronous confirmation, as delivered by its webhook.
/// May arrive more than once for the same payment reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmPaymentRequest {
    pub payment_reference: String,
    pub quote_id: String,
    pub session_id: String,
    pub succeeded: bool,
    pub decline_reason: Option<String>,
    pub payment_method: Option<String>,
    pub customer_email: Option<String>,
}

/// Every port the engine needs, gathered for assembly. The binary fills this
/// from CLI flags; tests fill it with in-memory stores and a fixed clock.
#[derive(Clone)]
pub struct EngineStores {
    pub catalog: CatalogStoreRef,
    pub coupons: CouponStoreRef,
    pub quotes: QuoteStoreRef,
    pub sessions: SessionStoreRef,
    pub orders: OrderStoreRef,
    pub funnels: FunnelStoreRef,
    pub processor: PaymentProcessorRef,
    pub tax_rates: TaxRateLookupRef,
    pub clock: ClockRef,
}

/// The RPC facade over the six core services. One instance per process;
/// every method is an independent request handler.
#[derive(Clone)]
pub struct CheckoutService {
    ledger: CouponLedger,
    calculator: QuoteCalculator,
    orchestrator: PaymentOrchestrator,
    flow: FunnelFlow,
    recorder: OrderRecorder,
    catalog: CatalogStoreRef,
    quotes: QuoteStoreRef,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: CouponLedger,
        calculator: QuoteCalculator,
        orchestrator: PaymentOrchestrator,
        flow: FunnelFlow,
        recorder: OrderRecorder,
        catalog: CatalogStoreRef,
        quotes: QuoteStoreRef,
    ) -> Self {
        Self {
            ledger,
            calculator,
            orchestrator,
            flow,
            recorder,
            catalog,
            quotes,
        }
    }

    /// Wires the six services over one set of stores.
    pub fn assemble(
        stores: EngineStores,
        quote_ttl: Option<Duration>,
        session_ttl: Duration,
    ) -> Self {
        let ledger = CouponLedger::new(stores.coupons.clone(), stores.clock.clone());
        let calculator = QuoteCalculator::new(
            stores.catalog.clone(),
            stores.quotes.clone(),
            ledger.clone(),
            stores.tax_rates.clone(),
            stores.clock.clone(),
            quote_ttl,
        );
        let orchestrator = PaymentOrchestrator::new(
            stores.processor.clone(),
            stores.catalog.clone(),
            stores.clock.clone(),
        );
        let recorder = OrderRecorder::new(stores.orders.clone(), stores.clock.clone());
        let flow = FunnelFlow::new(
            stores.sessions.clone(),
            stores.funnels.clone(),
            stores.catalog.clone(),
            stores.quotes.clone(),
            orchestrator.clone(),
            recorder.clone(),
            stores.clock.clone(),
            session_ttl,
        );
        Self::new(
            ledger,
            calculator,
            orchestrator,
            flow,
            recorder,
            stores.catalog,
            stores.quotes,
        )
    }

    /// `coupon.validate`. A plan id is resolved to its product id so scope
    /// checks see the product the coupon is linked to.
    pub async fn validate_coupon(
        &self,
        code: &str,
        product_id: Option<&str>,
        plan_id: Option<&str>,
        amount: Cents,
        customer_email: Option<&str>,
    ) -> Result<CouponValidation> {
        let resolved_product = match (product_id, plan_id) {
            (Some(product_id), _) => Some(product_id.to_string()),
            (None, Some(plan_id)) => {
                let plan = self
                    .catalog
                    .plan(plan_id)
                    .await?
                    .ok_or_else(|| CheckoutError::NotFound("plan", plan_id.to_string()))?;
                Some(plan.product_id)
            }
            (None, None) => None,
        };
        self.ledger
            .validate(code, resolved_product.as_deref(), amount, customer_email)
            .await
    }

    /// `payment.validateCoupon` — the legacy amount-only check kept for
    /// storefronts that have not migrated to the scoped variant.
    pub async fn validate_coupon_legacy(
        &self,
        code: &str,
        amount: Cents,
    ) -> Result<CouponValidation> {
        self.ledger.validate(code, None, amount, None).await
    }

    /// `coupon.redeem`.
    pub async fn redeem_coupon(
        &self,
        coupon_id: &str,
        payment_reference: &str,
        customer_email: Option<&str>,
        amounts: RedemptionAmounts,
    ) -> Result<()> {
        self.ledger
            .redeem(coupon_id, payment_reference, customer_email, amounts)
            .await
    }

    /// `payment.createCheckoutIntent`: price the cart, open a session, and
    /// start the processor-side charge.
    pub async fn create_checkout_intent(
        &self,
        request: CheckoutIntentRequest,
    ) -> Result<CheckoutIntentResponse> {
        let cart = Cart {
            product_id: request.product_id.clone(),
            plan_id: request.plan_id.clone(),
            order_bump_ids: request.order_bump_ids.clone(),
            coupon_code: request.coupon_code.clone(),
            currency: request.currency,
            quantity: 1,
            tax_jurisdiction: if request.enable_tax {
                request.billing_country.map(|country| TaxJurisdiction {
                    country,
                    vat_id: request.vat_id.clone(),
                })
            } else {
                None
            },
        };

        let quote = self.calculator.price(&cart).await?;
        let session = self
            .flow
            .create_session(&request.checkout_id, Some(request.email.clone()))
            .await?;
        let handle: ChargeHandle = self
            .orchestrator
            .charge(
                &quote,
                &CustomerInfo {
                    email: request.email,
                    name: None,
                },
            )
            .await?;

        Ok(CheckoutIntentResponse {
            session_id: session.id,
            quote_id: quote.id,
            intent_id: handle.intent_id,
            client_secret: handle.client_secret,
            amount: quote.total,
            discount_amount: quote.discount,
            mode: quote.mode,
        })
    }

    /// Processor confirmation handler. Safe under duplicate deliveries: the
    /// order insert is reference-unique, coupon redemption is keyed by the
    /// same reference, and re-entering the funnel is a no-op.
    pub async fn confirm_payment(&self, request: ConfirmPaymentRequest) -> Result<Order> {
        let quote = self
            .quotes
            .by_id(&request.quote_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("quote", request.quote_id.clone()))?;

        let outcome = if request.succeeded {
            ConfirmationOutcome::Succeeded
        } else {
            ConfirmationOutcome::Declined {
                reason: request
                    .decline_reason
                    .clone()
                    .unwrap_or_else(|| "declined".to_string()),
            }
        };
        let order = self
            .recorder
            .materialize(
                &quote,
                &PaymentConfirmation {
                    payment_reference: request.payment_reference.clone(),
                    outcome,
                    customer_email: request.customer_email.clone(),
                },
            )
            .await?;

        if !request.succeeded {
            return Ok(order);
        }

        if let Some(code) = &quote.coupon_code {
            self.ledger
                .redeem_by_code(
                    code,
                    &request.payment_reference,
                    request.customer_email.as_deref(),
                    RedemptionAmounts {
                        discount_applied: quote.discount,
                        original_amount: quote.subtotal,
                        final_amount: quote.total,
                    },
                )
                .await?;
        }

        let purchase = PurchaseDelta {
            products: quote
                .line_items
                .iter()
                .map(|item| item.product_id.clone())
                .collect(),
            bumps: quote.order_bump_ids.clone(),
            upsells: vec![],
            spent: quote.total,
            payment_method: request.payment_method.clone(),
        };
        self.flow.enter_funnel(&request.session_id, purchase).await?;

        Ok(order)
    }

    /// `checkout.getSession`.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionContext> {
        self.flow.get_session(session_id).await
    }

    /// `checkout.acceptUpsell`.
    pub async fn accept_upsell(
        &self,
        session_id: &str,
        offer_id: &str,
    ) -> Result<DecisionOutcome> {
        self.flow.accept(session_id, offer_id).await
    }

    /// `checkout.declineUpsell`.
    pub async fn decline_upsell(
        &self,
        session_id: &str,
        offer_id: &str,
    ) -> Result<DecisionOutcome> {
        self.flow.decline(session_id, offer_id).await
    }

    /// Refunds the processor charge, then records the lifecycle transition.
    pub async fn refund_order(&self, order_id: &str) -> Result<Order> {
        let order = self.recorder.get(order_id).await?;
        self.orchestrator.refund(&order.payment_reference).await?;
        self.recorder.refund(order_id).await
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<Order> {
        self.recorder.cancel(order_id).await
    }
}
