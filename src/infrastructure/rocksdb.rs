use crate::domain::coupon::{Coupon, CouponRedemption};
use crate::domain::funnel::Funnel;
use crate::domain::order::Order;
use crate::domain::ports::{
    CouponStore, FunnelStore, OrderInsert, OrderStore, QuoteStore, RedemptionOutcome,
    SessionStore,
};
use crate::domain::quote::Quote;
use crate::domain::session::{CheckoutSession, PurchaseDelta, Step};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for coupon definitions, keyed by coupon id.
pub const CF_COUPONS: &str = "coupons";
/// Column Family mapping coupon code -> coupon id.
pub const CF_COUPON_CODES: &str = "coupon_codes";
/// Column Family for redemption rows, keyed by `coupon_id/payment_reference`.
pub const CF_REDEMPTIONS: &str = "redemptions";
/// Column Family for quotes, keyed by quote id.
pub const CF_QUOTES: &str = "quotes";
/// Column Family mapping cart hash -> quote id.
pub const CF_QUOTE_HASHES: &str = "quote_hashes";
/// Column Family for checkout sessions, keyed by session id.
pub const CF_SESSIONS: &str = "sessions";
/// Column Family for orders, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping payment reference -> order id; this is the
/// uniqueness guard duplicate webhooks hit.
pub const CF_ORDER_REFS: &str = "order_refs";
/// Column Family for funnel definitions, keyed by funnel id.
pub const CF_FUNNELS: &str = "funnels";
/// Column Family mapping checkout id -> funnel id.
pub const CF_CHECKOUT_FUNNELS: &str = "checkout_funnels";

const ALL_CFS: &[&str] = &[
    CF_COUPONS,
    CF_COUPON_CODES,
    CF_REDEMPTIONS,
    CF_QUOTES,
    CF_QUOTE_HASHES,
    CF_SESSIONS,
    CF_ORDERS,
    CF_ORDER_REFS,
    CF_FUNNELS,
    CF_CHECKOUT_FUNNELS,
];

/// A persistent store backing every engine port that outlives a process.
///
/// Entities are JSON values in per-entity Column Families, with small index
/// families for the uniqueness guards (coupon codes, cart hashes, payment
/// references). `Clone` shares the underlying `Arc<DB>`. Compound
/// read-modify-writes (redemption counting, session CAS, order insert) are
/// serialized through one process-wide mutex; RocksDB calls inside it are
/// synchronous and short, so the guard is held only briefly.
#[derive(Clone)]
pub struct RocksDbEngineStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbEngineStore {
    /// Opens or creates a RocksDB instance at `path`, ensuring every column
    /// family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .map_err(|e| CheckoutError::InternalError(Box::new(e)))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            CheckoutError::InternalError(Box::new(std::io::Error::other(format!(
                "column family {name} not found"
            ))))
        })
    }

    fn put<T: Serialize>(&self, cf: &'static str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db
            .put_cf(self.cf(cf)?, key.as_bytes(), bytes)
            .map_err(|e| CheckoutError::InternalError(Box::new(e)))
    }

    fn get<T: DeserializeOwned>(&self, cf: &'static str, key: &str) -> Result<Option<T>> {
        let bytes = self
            .db
            .get_cf(self.cf(cf)?, key.as_bytes())
            .map_err(|e| CheckoutError::InternalError(Box::new(e)))?;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_index(&self, cf: &'static str, key: &str, target: &str) -> Result<()> {
        self.db
            .put_cf(self.cf(cf)?, key.as_bytes(), target.as_bytes())
            .map_err(|e| CheckoutError::InternalError(Box::new(e)))
    }

    fn get_index(&self, cf: &'static str, key: &str) -> Result<Option<String>> {
        let bytes = self
            .db
            .get_cf(self.cf(cf)?, key.as_bytes())
            .map_err(|e| CheckoutError::InternalError(Box::new(e)))?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }
}

#[async_trait]
impl CouponStore for RocksDbEngineStore {
    async fn insert(&self, coupon: Coupon) -> Result<()> {
        coupon.validate()?;
        let _guard = self.write_lock.lock().await;
        if self.get_index(CF_COUPON_CODES, &coupon.code)?.is_some() {
            return Err(CheckoutError::Conflict(format!(
                "coupon code {} already exists",
                coupon.code
            )));
        }
        self.put_index(CF_COUPON_CODES, &coupon.code, &coupon.id)?;
        self.put(CF_COUPONS, &coupon.id, &coupon)
    }

    async fn by_code(&self, code: &str) -> Result<Option<Coupon>> {
        match self.get_index(CF_COUPON_CODES, code)? {
            Some(id) => self.get(CF_COUPONS, &id),
            None => Ok(None),
        }
    }

    async fn by_id(&self, id: &str) -> Result<Option<Coupon>> {
        self.get(CF_COUPONS, id)
    }

    async fn record_redemption(&self, redemption: CouponRedemption) -> Result<RedemptionOutcome> {
        let _guard = self.write_lock.lock().await;
        let key = format!("{}/{}", redemption.coupon_id, redemption.payment_reference);
        if self
            .get::<CouponRedemption>(CF_REDEMPTIONS, &key)?
            .is_some()
        {
            return Ok(RedemptionOutcome::Duplicate);
        }
        let mut coupon: Coupon = self
            .get(CF_COUPONS, &redemption.coupon_id)?
            .ok_or_else(|| CheckoutError::NotFound("coupon", redemption.coupon_id.clone()))?;
        if coupon
            .max_redemptions
            .is_some_and(|cap| coupon.times_redeemed >= cap)
        {
            return Ok(RedemptionOutcome::CapExhausted);
        }
        coupon.times_redeemed += 1;
        self.put(CF_COUPONS, &coupon.id.clone(), &coupon)?;
        self.put(CF_REDEMPTIONS, &key, &redemption)?;
        Ok(RedemptionOutcome::Recorded)
    }

    async fn redemptions_by_customer(&self, coupon_id: &str, customer_email: &str) -> Result<u32> {
        let cf = self.cf(CF_REDEMPTIONS)?;
        let prefix = format!("{coupon_id}/");
        let mut count = 0u32;
        for entry in self.db.prefix_iterator_cf(cf, prefix.as_bytes()) {
            let (key, value) = entry.map_err(|e| CheckoutError::InternalError(Box::new(e)))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let redemption: CouponRedemption = serde_json::from_slice(&value)?;
            if redemption.customer_email.as_deref() == Some(customer_email) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl QuoteStore for RocksDbEngineStore {
    async fn by_id(&self, id: &str) -> Result<Option<Quote>> {
        self.get(CF_QUOTES, id)
    }

    async fn by_cart_hash(&self, cart_hash: &str) -> Result<Option<Quote>> {
        match self.get_index(CF_QUOTE_HASHES, cart_hash)? {
            Some(id) => self.get(CF_QUOTES, &id),
            None => Ok(None),
        }
    }

    async fn insert_or_get(&self, quote: Quote, now: DateTime<Utc>) -> Result<Quote> {
        let _guard = self.write_lock.lock().await;
        if let Some(id) = self.get_index(CF_QUOTE_HASHES, &quote.cart_hash)?
            && let Some(existing) = self.get::<Quote>(CF_QUOTES, &id)?
            && !existing.is_expired(now)
        {
            return Ok(existing);
        }
        self.put_index(CF_QUOTE_HASHES, &quote.cart_hash, &quote.id)?;
        self.put(CF_QUOTES, &quote.id.clone(), &quote)?;
        Ok(quote)
    }
}

#[async_trait]
impl SessionStore for RocksDbEngineStore {
    async fn insert(&self, session: CheckoutSession) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.get::<CheckoutSession>(CF_SESSIONS, &session.id)?.is_some() {
            return Err(CheckoutError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.put(CF_SESSIONS, &session.id.clone(), &session)
    }

    async fn get(&self, session_id: &str) -> Result<Option<CheckoutSession>> {
        self.get(CF_SESSIONS, session_id)
    }

    async fn advance(
        &self,
        session_id: &str,
        expected_version: u64,
        next_step: Step,
        delta: PurchaseDelta,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.writable_session(session_id, expected_version, now)?;
        session.data.apply(&delta);
        if delta.payment_method.is_some() {
            session.payment_method = delta.payment_method;
        }
        session.current_step = next_step;
        session.version += 1;
        self.put(CF_SESSIONS, session_id, &session)?;
        Ok(session)
    }

    async fn complete(
        &self,
        session_id: &str,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.writable_session(session_id, expected_version, now)?;
        session.current_step = Step::ThankYou;
        session.completed_at = Some(now);
        session.version += 1;
        self.put(CF_SESSIONS, session_id, &session)?;
        Ok(session)
    }
}

impl RocksDbEngineStore {
    fn writable_session(
        &self,
        session_id: &str,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession> {
        let session: CheckoutSession = self
            .get(CF_SESSIONS, session_id)?
            .ok_or_else(|| CheckoutError::NotFound("session", session_id.to_string()))?;
        if session.is_expired(now) {
            return Err(CheckoutError::Conflict(format!(
                "session {session_id} has expired"
            )));
        }
        if session.is_completed() {
            return Err(CheckoutError::Conflict(format!(
                "session {session_id} is already completed"
            )));
        }
        if session.version != expected_version {
            return Err(CheckoutError::Conflict(format!(
                "session {session_id} is at version {}, write expected {expected_version}",
                session.version
            )));
        }
        Ok(session)
    }
}

#[async_trait]
impl OrderStore for RocksDbEngineStore {
    async fn insert_unique(&self, order: Order) -> Result<OrderInsert> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing_id) = self.get_index(CF_ORDER_REFS, &order.payment_reference)?
            && let Some(existing) = self.get::<Order>(CF_ORDERS, &existing_id)?
        {
            return Ok(OrderInsert::Existing(existing));
        }
        self.put_index(CF_ORDER_REFS, &order.payment_reference, &order.id)?;
        self.put(CF_ORDERS, &order.id.clone(), &order)?;
        Ok(OrderInsert::Inserted(order))
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        self.get(CF_ORDERS, order_id)
    }

    async fn by_payment_reference(&self, payment_reference: &str) -> Result<Option<Order>> {
        match self.get_index(CF_ORDER_REFS, payment_reference)? {
            Some(id) => self.get(CF_ORDERS, &id),
            None => Ok(None),
        }
    }

    async fn update(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.get::<Order>(CF_ORDERS, &order.id)?.is_none() {
            return Err(CheckoutError::NotFound("order", order.id.clone()));
        }
        self.put(CF_ORDERS, &order.id.clone(), &order)
    }
}

#[async_trait]
impl FunnelStore for RocksDbEngineStore {
    async fn insert(&self, funnel: Funnel) -> Result<()> {
        funnel.validate()?;
        self.put(CF_FUNNELS, &funnel.id.clone(), &funnel)
    }

    async fn get(&self, funnel_id: &str) -> Result<Option<Funnel>> {
        self.get(CF_FUNNELS, funnel_id)
    }

    async fn attach_to_checkout(&self, checkout_id: &str, funnel_id: &str) -> Result<()> {
        if self.get::<Funnel>(CF_FUNNELS, funnel_id)?.is_none() {
            return Err(CheckoutError::NotFound("funnel", funnel_id.to_string()));
        }
        self.put_index(CF_CHECKOUT_FUNNELS, checkout_id, funnel_id)
    }

    async fn for_checkout(&self, checkout_id: &str) -> Result<Option<Funnel>> {
        match self.get_index(CF_CHECKOUT_FUNNELS, checkout_id)? {
            Some(id) => self.get(CF_FUNNELS, &id),
            None => Ok(None),
        }
    }
}
