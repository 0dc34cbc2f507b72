use crate::domain::catalog::{Offer, OrderBump, Plan, Product};
use crate::domain::coupon::{Coupon, CouponRedemption};
use crate::domain::funnel::Funnel;
use crate::domain::order::Order;
use crate::domain::ports::{
    CatalogStore, CouponStore, FunnelStore, OrderInsert, OrderStore, QuoteStore,
    RedemptionOutcome, SessionStore, TaxRateLookup,
};
use crate::domain::quote::{Quote, TaxJurisdiction};
use crate::domain::session::{CheckoutSession, PurchaseDelta, Step};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory catalog, filled by seed data or tests.
#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    inner: Arc<RwLock<CatalogInner>>,
}

#[derive(Default)]
struct CatalogInner {
    products: HashMap<String, Product>,
    plans: HashMap<String, Plan>,
    bumps: HashMap<String, OrderBump>,
    offers: HashMap<String, Offer>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_product(&self, product: Product) {
        self.inner.write().await.products.insert(product.id.clone(), product);
    }

    pub async fn put_plan(&self, plan: Plan) {
        self.inner.write().await.plans.insert(plan.id.clone(), plan);
    }

    pub async fn put_order_bump(&self, bump: OrderBump) {
        self.inner.write().await.bumps.insert(bump.id.clone(), bump);
    }

    pub async fn put_offer(&self, offer: Offer) {
        self.inner.write().await.offers.insert(offer.id.clone(), offer);
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.inner.read().await.products.get(id).cloned())
    }

    async fn plan(&self, id: &str) -> Result<Option<Plan>> {
        Ok(self.inner.read().await.plans.get(id).cloned())
    }

    async fn order_bump(&self, id: &str) -> Result<Option<OrderBump>> {
        Ok(self.inner.read().await.bumps.get(id).cloned())
    }

    async fn offer(&self, id: &str) -> Result<Option<Offer>> {
        Ok(self.inner.read().await.offers.get(id).cloned())
    }
}

/// Coupons plus their redemption rows behind one lock, so the cap check, the
/// row insert, and the counter increment are a single read-modify-write.
#[derive(Default, Clone)]
pub struct InMemoryCouponStore {
    inner: Arc<RwLock<CouponInner>>,
}

#[derive(Default)]
struct CouponInner {
    coupons: HashMap<String, Coupon>,
    code_index: HashMap<String, String>,
    /// Keyed by (coupon id, payment reference); one row per redemption.
    redemptions: HashMap<(String, String), CouponRedemption>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn insert(&self, coupon: Coupon) -> Result<()> {
        coupon.validate()?;
        let mut inner = self.inner.write().await;
        if inner.code_index.contains_key(&coupon.code) {
            return Err(CheckoutError::Conflict(format!(
                "coupon code {} already exists",
                coupon.code
            )));
        }
        inner.code_index.insert(coupon.code.clone(), coupon.id.clone());
        inner.coupons.insert(coupon.id.clone(), coupon);
        Ok(())
    }

    async fn by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let inner = self.inner.read().await;
        Ok(inner
            .code_index
            .get(code)
            .and_then(|id| inner.coupons.get(id))
            .cloned())
    }

    async fn by_id(&self, id: &str) -> Result<Option<Coupon>> {
        Ok(self.inner.read().await.coupons.get(id).cloned())
    }

    async fn record_redemption(&self, redemption: CouponRedemption) -> Result<RedemptionOutcome> {
        let mut inner = self.inner.write().await;
        let key = (
            redemption.coupon_id.clone(),
            redemption.payment_reference.clone(),
        );
        if inner.redemptions.contains_key(&key) {
            return Ok(RedemptionOutcome::Duplicate);
        }
        let coupon = inner
            .coupons
            .get_mut(&redemption.coupon_id)
            .ok_or_else(|| CheckoutError::NotFound("coupon", redemption.coupon_id.clone()))?;
        if coupon
            .max_redemptions
            .is_some_and(|cap| coupon.times_redeemed >= cap)
        {
            return Ok(RedemptionOutcome::CapExhausted);
        }
        coupon.times_redeemed += 1;
        inner.redemptions.insert(key, redemption);
        Ok(RedemptionOutcome::Recorded)
    }

    async fn redemptions_by_customer(&self, coupon_id: &str, customer_email: &str) -> Result<u32> {
        let inner = self.inner.read().await;
        let count = inner
            .redemptions
            .values()
            .filter(|r| {
                r.coupon_id == coupon_id && r.customer_email.as_deref() == Some(customer_email)
            })
            .count();
        Ok(count as u32)
    }
}

/// Quote cache keyed by id with a cart-hash index.
#[derive(Default, Clone)]
pub struct InMemoryQuoteStore {
    inner: Arc<RwLock<QuoteInner>>,
}

#[derive(Default)]
struct QuoteInner {
    by_id: HashMap<String, Quote>,
    hash_index: HashMap<String, String>,
}

impl InMemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn by_id(&self, id: &str) -> Result<Option<Quote>> {
        Ok(self.inner.read().await.by_id.get(id).cloned())
    }

    async fn by_cart_hash(&self, cart_hash: &str) -> Result<Option<Quote>> {
        let inner = self.inner.read().await;
        Ok(inner
            .hash_index
            .get(cart_hash)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn insert_or_get(&self, quote: Quote, now: DateTime<Utc>) -> Result<Quote> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .hash_index
            .get(&quote.cart_hash)
            .and_then(|id| inner.by_id.get(id))
            && !existing.is_expired(now)
        {
            return Ok(existing.clone());
        }
        // Expired quotes stay retrievable by id for audit; only the hash
        // index moves to the replacement.
        inner
            .hash_index
            .insert(quote.cart_hash.clone(), quote.id.clone());
        inner.by_id.insert(quote.id.clone(), quote.clone());
        Ok(quote)
    }
}

/// Sessions with version-checked conditional writes.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, CheckoutSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_writable(
        session: &CheckoutSession,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if session.is_expired(now) {
            return Err(CheckoutError::Conflict(format!(
                "session {} has expired",
                session.id
            )));
        }
        if session.is_completed() {
            return Err(CheckoutError::Conflict(format!(
                "session {} is already completed",
                session.id
            )));
        }
        if session.version != expected_version {
            return Err(CheckoutError::Conflict(format!(
                "session {} is at version {}, write expected {}",
                session.id, session.version, expected_version
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: CheckoutSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(CheckoutError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<CheckoutSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn advance(
        &self,
        session_id: &str,
        expected_version: u64,
        next_step: Step,
        delta: PurchaseDelta,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CheckoutError::NotFound("session", session_id.to_string()))?;
        Self::check_writable(session, expected_version, now)?;

        session.data.apply(&delta);
        if delta.payment_method.is_some() {
            session.payment_method = delta.payment_method;
        }
        session.current_step = next_step;
        session.version += 1;
        Ok(session.clone())
    }

    async fn complete(
        &self,
        session_id: &str,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CheckoutError::NotFound("session", session_id.to_string()))?;
        Self::check_writable(session, expected_version, now)?;

        session.current_step = Step::ThankYou;
        session.completed_at = Some(now);
        session.version += 1;
        Ok(session.clone())
    }
}

/// Orders with a payment-reference uniqueness index; duplicate webhook
/// deliveries are rejected here, at the storage layer.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    inner: Arc<RwLock<OrderInner>>,
}

#[derive(Default)]
struct OrderInner {
    by_id: HashMap<String, Order>,
    reference_index: HashMap<String, String>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_unique(&self, order: Order) -> Result<OrderInsert> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .reference_index
            .get(&order.payment_reference)
            .and_then(|id| inner.by_id.get(id))
        {
            return Ok(OrderInsert::Existing(existing.clone()));
        }
        inner
            .reference_index
            .insert(order.payment_reference.clone(), order.id.clone());
        inner.by_id.insert(order.id.clone(), order.clone());
        Ok(OrderInsert::Inserted(order))
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().await.by_id.get(order_id).cloned())
    }

    async fn by_payment_reference(&self, payment_reference: &str) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reference_index
            .get(payment_reference)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn update(&self, order: Order) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.by_id.contains_key(&order.id) {
            return Err(CheckoutError::NotFound("order", order.id.clone()));
        }
        inner.by_id.insert(order.id.clone(), order);
        Ok(())
    }
}

/// Funnel definitions plus the checkout-to-funnel attachment.
#[derive(Default, Clone)]
pub struct InMemoryFunnelStore {
    inner: Arc<RwLock<FunnelInner>>,
}

#[derive(Default)]
struct FunnelInner {
    funnels: HashMap<String, Funnel>,
    checkout_index: HashMap<String, String>,
}

impl InMemoryFunnelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FunnelStore for InMemoryFunnelStore {
    async fn insert(&self, funnel: Funnel) -> Result<()> {
        funnel.validate()?;
        self.inner
            .write()
            .await
            .funnels
            .insert(funnel.id.clone(), funnel);
        Ok(())
    }

    async fn get(&self, funnel_id: &str) -> Result<Option<Funnel>> {
        Ok(self.inner.read().await.funnels.get(funnel_id).cloned())
    }

    async fn attach_to_checkout(&self, checkout_id: &str, funnel_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.funnels.contains_key(funnel_id) {
            return Err(CheckoutError::NotFound("funnel", funnel_id.to_string()));
        }
        inner
            .checkout_index
            .insert(checkout_id.to_string(), funnel_id.to_string());
        Ok(())
    }

    async fn for_checkout(&self, checkout_id: &str) -> Result<Option<Funnel>> {
        let inner = self.inner.read().await;
        Ok(inner
            .checkout_index
            .get(checkout_id)
            .and_then(|id| inner.funnels.get(id))
            .cloned())
    }
}

/// Country-keyed flat tax rates. A present VAT id reverse-charges to no tax;
/// real jurisdiction math is someone else's product.
#[derive(Default, Clone)]
pub struct FlatTaxTable {
    rates: HashMap<String, Decimal>,
}

impl FlatTaxTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&mut self, country: &str, rate: Decimal) {
        self.rates.insert(country.to_uppercase(), rate);
    }
}

impl TaxRateLookup for FlatTaxTable {
    fn rate_for(&self, jurisdiction: &TaxJurisdiction) -> Option<Decimal> {
        if jurisdiction.vat_id.is_some() {
            return None;
        }
        self.rates.get(&jurisdiction.country.to_uppercase()).copied()
    }
}
