use crate::domain::catalog::{Offer, OrderBump, Plan, Product, RecurringInterval};
use crate::domain::coupon::{Coupon, CouponRedemption};
use crate::domain::funnel::Funnel;
use crate::domain::money::{Cents, Currency};
use crate::domain::order::Order;
use crate::domain::quote::{Quote, TaxJurisdiction};
use crate::domain::session::{CheckoutSession, PurchaseDelta, Step};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type CouponStoreRef = Arc<dyn CouponStore>;
pub type QuoteStoreRef = Arc<dyn QuoteStore>;
pub type SessionStoreRef = Arc<dyn SessionStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type FunnelStoreRef = Arc<dyn FunnelStore>;
pub type PaymentProcessorRef = Arc<dyn PaymentProcessor>;
pub type TaxRateLookupRef = Arc<dyn TaxRateLookup>;
pub type ClockRef = Arc<dyn Clock>;

/// Read-only access to the catalog the builder UI produces.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn product(&self, id: &str) -> Result<Option<Product>>;
    async fn plan(&self, id: &str) -> Result<Option<Plan>>;
    async fn order_bump(&self, id: &str) -> Result<Option<OrderBump>>;
    async fn offer(&self, id: &str) -> Result<Option<Offer>>;
}

/// What happened when a redemption row was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionOutcome {
    /// Row inserted and `times_redeemed` incremented by one.
    Recorded,
    /// A row for this payment reference already exists; nothing changed.
    Duplicate,
    /// The global cap was already met; nothing changed.
    CapExhausted,
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Fails with `Invalid` when the coupon breaks its own invariants and
    /// with `Conflict` on a duplicate code.
    async fn insert(&self, coupon: Coupon) -> Result<()>;
    async fn by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn by_id(&self, id: &str) -> Result<Option<Coupon>>;
    /// Atomically inserts the redemption row and increments `times_redeemed`,
    /// as one read-modify-write under the store's lock. Keyed by the row's
    /// payment reference for at-most-once semantics.
    async fn record_redemption(&self, redemption: CouponRedemption) -> Result<RedemptionOutcome>;
    /// Prior successful redemptions of a coupon by one customer email.
    async fn redemptions_by_customer(&self, coupon_id: &str, customer_email: &str) -> Result<u32>;
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn by_id(&self, id: &str) -> Result<Option<Quote>>;
    async fn by_cart_hash(&self, cart_hash: &str) -> Result<Option<Quote>>;
    /// Put-if-absent on the cart hash. When two pricings race, both callers
    /// get the quote that won the insert. An expired quote under the same
    /// hash is replaced rather than returned.
    async fn insert_or_get(&self, quote: Quote, now: DateTime<Utc>) -> Result<Quote>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: CheckoutSession) -> Result<()>;
    async fn get(&self, session_id: &str) -> Result<Option<CheckoutSession>>;
    /// Conditional write: the stored version must equal `expected_version`
    /// and the session must be neither expired nor completed at `now`.
    /// Fails with `Conflict` otherwise; never silently ignores.
    async fn advance(
        &self,
        session_id: &str,
        expected_version: u64,
        next_step: Step,
        delta: PurchaseDelta,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession>;
    /// Terminal transition to `ThankYou`, stamping `completed_at`. Same
    /// version and liveness checks as `advance`.
    async fn complete(
        &self,
        session_id: &str,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession>;
}

/// Result of an order insert against the payment-reference uniqueness guard.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderInsert {
    Inserted(Order),
    /// An order for this payment reference already exists; duplicate webhook
    /// deliveries land here.
    Existing(Order),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert guarded by uniqueness on `payment_reference`; the duplicate
    /// path returns the existing row rather than an error.
    async fn insert_unique(&self, order: Order) -> Result<OrderInsert>;
    async fn get(&self, order_id: &str) -> Result<Option<Order>>;
    async fn by_payment_reference(&self, payment_reference: &str) -> Result<Option<Order>>;
    async fn update(&self, order: Order) -> Result<()>;
}

#[async_trait]
pub trait FunnelStore: Send + Sync {
    async fn insert(&self, funnel: Funnel) -> Result<()>;
    async fn get(&self, funnel_id: &str) -> Result<Option<Funnel>>;
    async fn attach_to_checkout(&self, checkout_id: &str, funnel_id: &str) -> Result<()>;
    async fn for_checkout(&self, checkout_id: &str) -> Result<Option<Funnel>>;
}

/// A customer record on the processor side. The processor does NOT enforce
/// email uniqueness; lookups may return zero or many of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorCustomer {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntentRequest {
    pub amount: Cents,
    pub currency: Currency,
    pub customer_id: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    pub customer_id: String,
    pub plan_id: String,
    pub amount: Cents,
    pub currency: Currency,
    pub interval: RecurringInterval,
    pub trial_days: u32,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSubscription {
    pub id: String,
    /// Payment handle of the subscription's first invoice.
    pub first_invoice_intent: PaymentIntent,
}

/// Outcome of charging a stored payment method off-session. A decline is a
/// value here, not an error; the orchestrator never retries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffSessionOutcome {
    Succeeded { payment_reference: String },
    Declined { reason: String },
}

/// The external payment-capture service. Card data never crosses this
/// boundary; the engine only moves handles and metadata.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn customers_by_email(&self, email: &str) -> Result<Vec<ProcessorCustomer>>;
    async fn create_customer(&self, email: &str) -> Result<ProcessorCustomer>;
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent>;
    /// Reuses an active subscription for (customer, plan) when one exists.
    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<ProcessorSubscription>;
    /// At-most-once per `idempotency_key`: a repeated key replays the
    /// original captured payment reference instead of charging again.
    async fn charge_off_session(
        &self,
        customer_id: &str,
        payment_method: &str,
        amount: Cents,
        currency: Currency,
        idempotency_key: &str,
        metadata: HashMap<String, String>,
    ) -> Result<OffSessionOutcome>;
    async fn refund(&self, payment_reference: &str) -> Result<()>;
}

/// Pluggable tax rate lookup; real jurisdiction math lives outside the core.
/// `None` means no tax applies.
pub trait TaxRateLookup: Send + Sync {
    fn rate_for(&self, jurisdiction: &TaxJurisdiction) -> Option<Decimal>;
}

/// Time seam so expiry logic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
