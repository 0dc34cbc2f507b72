use crate::application::orders::{ConfirmationOutcome, OrderRecorder, PaymentConfirmation};
use crate::application::payments::PaymentOrchestrator;
use crate::domain::catalog::Offer;
use crate::domain::funnel::{Decision, Funnel, NodeKind, Resolution};
use crate::domain::money::Cents;
use crate::domain::ports::{
    CatalogStoreRef, ClockRef, FunnelStoreRef, OffSessionOutcome, QuoteStoreRef, SessionStoreRef,
};
use crate::domain::quote::{ChargeMode, LineItem, Quote};
use crate::domain::session::{CheckoutSession, PurchaseDelta, SessionData, Step};
use crate::error::{CheckoutError, Result};
use chrono::Duration;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Sentinel path returned once a session reaches the end of its funnel.
pub const THANK_YOU_PATH: &str = "thank-you";

/// Where the storefront should navigate after a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// The session moved; `next_path` is a node id or `thank-you`.
    Advanced {
        next_path: String,
        order_id: Option<String>,
    },
    /// The off-session charge was declined. The session did not move; the
    /// customer stays on the offer screen with the reason.
    ChargeDeclined { reason: String },
}

/// A session joined with its funnel position, as the storefront reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub session: CheckoutSession,
    pub funnel_id: Option<String>,
    pub current_offer: Option<Offer>,
}

/// Walks customers through the post-purchase offer graph, one independent
/// page load at a time. All session writes go through the store's
/// version-checked conditional update, so a stale tab retrying an old step
/// cannot regress a session that already moved on.
#[derive(Clone)]
pub struct FunnelFlow {
    sessions: SessionStoreRef,
    funnels: FunnelStoreRef,
    catalog: CatalogStoreRef,
    quotes: QuoteStoreRef,
    orchestrator: PaymentOrchestrator,
    recorder: OrderRecorder,
    clock: ClockRef,
    session_ttl: Duration,
}

impl FunnelFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: SessionStoreRef,
        funnels: FunnelStoreRef,
        catalog: CatalogStoreRef,
        quotes: QuoteStoreRef,
        orchestrator: PaymentOrchestrator,
        recorder: OrderRecorder,
        clock: ClockRef,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            funnels,
            catalog,
            quotes,
            orchestrator,
            recorder,
            clock,
            session_ttl,
        }
    }

    /// Opens a session at the `checkout` sentinel with a fixed TTL.
    pub async fn create_session(
        &self,
        checkout_id: &str,
        customer_email: Option<String>,
    ) -> Result<CheckoutSession> {
        let now = self.clock.now();
        let session = CheckoutSession {
            id: format!("cs_{}", Uuid::new_v4()),
            checkout_id: checkout_id.to_string(),
            current_step: Step::Checkout,
            data: SessionData::default(),
            version: 0,
            payment_method: None,
            customer_email,
            created_at: now,
            completed_at: None,
            expires_at: now + self.session_ttl,
        };
        self.sessions.insert(session.clone()).await?;
        tracing::info!(session_id = session.id, checkout_id, "session created");
        Ok(session)
    }

    /// Reads a session with its funnel context. Expired sessions fail fast.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionContext> {
        let session = self.fetch_live(session_id).await?;
        let funnel = self.funnels.for_checkout(&session.checkout_id).await?;

        let current_offer = match (&funnel, &session.current_step) {
            (Some(funnel), Step::Node(node_id)) => {
                let node = funnel
                    .node(node_id)
                    .ok_or_else(|| CheckoutError::NotFound("funnel node", node_id.clone()))?;
                match &node.offer_id {
                    Some(offer_id) => self.catalog.offer(offer_id).await?,
                    None => None,
                }
            }
            _ => None,
        };

        Ok(SessionContext {
            funnel_id: funnel.map(|f| f.id),
            session,
            current_offer,
        })
    }

    /// Moves a freshly-paid session off the `checkout` sentinel and onto the
    /// first funnel node, or straight to completion when no funnel is
    /// attached. The primary purchase lands in the session data here.
    pub async fn enter_funnel(
        &self,
        session_id: &str,
        purchase: PurchaseDelta,
    ) -> Result<CheckoutSession> {
        let session = self.fetch_live(session_id).await?;
        if session.current_step != Step::Checkout {
            // Duplicate confirmation for a session that already entered.
            return Ok(session);
        }

        let now = self.clock.now();
        let funnel = self.funnels.for_checkout(&session.checkout_id).await?;
        let resolution = match &funnel {
            None => Resolution::Complete,
            Some(funnel) => {
                let trigger = funnel.entry_node().ok_or_else(|| {
                    CheckoutError::Invalid(format!("funnel {} has no trigger node", funnel.id))
                })?;
                let mut data = session.data.clone();
                data.apply(&purchase);
                funnel.resolve_next(&trigger.id, Decision::Accept, &data)?
            }
        };

        match resolution {
            Resolution::Complete => {
                let advanced = self
                    .sessions
                    .advance(
                        session_id,
                        session.version,
                        Step::Checkout,
                        purchase,
                        now,
                    )
                    .await?;
                self.sessions
                    .complete(session_id, advanced.version, now)
                    .await
            }
            Resolution::Next(node_id) => {
                self.sessions
                    .advance(session_id, session.version, Step::Node(node_id), purchase, now)
                    .await
            }
        }
    }

    /// Accepts the offer at the session's current node: charges the stored
    /// payment method off-session, materializes the order, and advances.
    /// A processor decline leaves the session in place.
    pub async fn accept(&self, session_id: &str, offer_id: &str) -> Result<DecisionOutcome> {
        let (session, funnel, node_id) = self.position(session_id).await?;
        let offer = self.offer_at(&funnel, &node_id, offer_id).await?;

        let payment_method = session.payment_method.clone().ok_or_else(|| {
            CheckoutError::Invalid(format!(
                "session {session_id} has no stored payment method"
            ))
        })?;

        let outcome = self
            .orchestrator
            .charge_upsell_offer(&session, &offer, &payment_method)
            .await?;
        let payment_reference = match outcome {
            OffSessionOutcome::Declined { reason } => {
                return Ok(DecisionOutcome::ChargeDeclined { reason });
            }
            OffSessionOutcome::Succeeded { payment_reference } => payment_reference,
        };

        let quote = self.offer_quote(&session, &offer).await?;
        let order = self
            .recorder
            .materialize(
                &quote,
                &PaymentConfirmation {
                    payment_reference,
                    outcome: ConfirmationOutcome::Succeeded,
                    customer_email: session.customer_email.clone(),
                },
            )
            .await?;

        let delta = PurchaseDelta {
            products: vec![offer.product_id.clone()],
            bumps: vec![],
            upsells: vec![offer.id.clone()],
            spent: offer.price,
            payment_method: None,
        };
        let next_path = self
            .advance_from(&session, &funnel, &node_id, Decision::Accept, delta)
            .await?;
        Ok(DecisionOutcome::Advanced {
            next_path,
            order_id: Some(order.id),
        })
    }

    /// Declines the offer at the session's current node and advances along
    /// the decline edge. Nothing is charged.
    pub async fn decline(&self, session_id: &str, offer_id: &str) -> Result<DecisionOutcome> {
        let (session, funnel, node_id) = self.position(session_id).await?;
        // Validates the request matches the displayed screen even though a
        // decline charges nothing.
        self.offer_at(&funnel, &node_id, offer_id).await?;

        let next_path = self
            .advance_from(
                &session,
                &funnel,
                &node_id,
                Decision::Decline,
                PurchaseDelta::default(),
            )
            .await?;
        Ok(DecisionOutcome::Advanced {
            next_path,
            order_id: None,
        })
    }

    async fn fetch_live(&self, session_id: &str) -> Result<CheckoutSession> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("session", session_id.to_string()))?;
        if session.is_expired(self.clock.now()) {
            return Err(CheckoutError::Conflict(format!(
                "session {session_id} has expired"
            )));
        }
        Ok(session)
    }

    /// The session's current funnel node; decisions are only legal while the
    /// session sits on one.
    async fn position(&self, session_id: &str) -> Result<(CheckoutSession, Funnel, String)> {
        let session = self.fetch_live(session_id).await?;
        let node_id = match &session.current_step {
            Step::Node(node_id) => node_id.clone(),
            Step::Checkout => {
                return Err(CheckoutError::Conflict(format!(
                    "session {session_id} has not completed checkout yet"
                )));
            }
            Step::ThankYou => {
                return Err(CheckoutError::Conflict(format!(
                    "session {session_id} is already completed"
                )));
            }
        };
        let funnel = self
            .funnels
            .for_checkout(&session.checkout_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("funnel", session.checkout_id.clone()))?;
        Ok((session, funnel, node_id))
    }

    /// The offer the current node displays. A mismatched offer id means a
    /// stale client acting on a screen the session already left.
    async fn offer_at(&self, funnel: &Funnel, node_id: &str, offer_id: &str) -> Result<Offer> {
        let node = funnel
            .node(node_id)
            .ok_or_else(|| CheckoutError::NotFound("funnel node", node_id.to_string()))?;
        match &node.kind {
            NodeKind::Upsell | NodeKind::Downsell => {}
            other => {
                return Err(CheckoutError::Invalid(format!(
                    "node {node_id} ({other:?}) does not present an offer"
                )));
            }
        }
        let node_offer = node.offer_id.as_deref().ok_or_else(|| {
            CheckoutError::Invalid(format!("node {node_id} has no offer attached"))
        })?;
        if node_offer != offer_id {
            return Err(CheckoutError::Conflict(format!(
                "offer {offer_id} is not the current screen of node {node_id}"
            )));
        }
        self.catalog
            .offer(offer_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("offer", offer_id.to_string()))
    }

    async fn advance_from(
        &self,
        session: &CheckoutSession,
        funnel: &Funnel,
        node_id: &str,
        decision: Decision,
        delta: PurchaseDelta,
    ) -> Result<String> {
        // Predicates downstream see the purchase this decision just made.
        let mut data = session.data.clone();
        data.apply(&delta);
        let resolution = funnel.resolve_next(node_id, decision, &data)?;
        let now = self.clock.now();

        match resolution {
            Resolution::Next(next_node) => {
                self.sessions
                    .advance(
                        &session.id,
                        session.version,
                        Step::Node(next_node.clone()),
                        delta,
                        now,
                    )
                    .await?;
                Ok(next_node)
            }
            Resolution::Complete => {
                let advanced = self
                    .sessions
                    .advance(
                        &session.id,
                        session.version,
                        Step::Node(node_id.to_string()),
                        delta,
                        now,
                    )
                    .await?;
                self.sessions
                    .complete(&session.id, advanced.version, now)
                    .await?;
                Ok(THANK_YOU_PATH.to_string())
            }
        }
    }

    /// Upsell orders freeze their amounts through a Quote like everything
    /// else. The hash is derived from (session, offer), so a retried accept
    /// reuses the same quote instead of minting a second one.
    async fn offer_quote(&self, session: &CheckoutSession, offer: &Offer) -> Result<Quote> {
        let mut hasher = Sha256::new();
        hasher.update(b"offer|");
        hasher.update(&offer.id);
        hasher.update(b"|session|");
        hasher.update(&session.id);
        let cart_hash = hex::encode(hasher.finalize());

        let now = self.clock.now();
        let quote = Quote {
            id: format!("qt_{}", Uuid::new_v4()),
            cart_hash,
            product_id: Some(offer.product_id.clone()),
            plan_id: None,
            order_bump_ids: vec![],
            coupon_code: None,
            currency: offer.currency,
            subtotal: offer.price,
            discount: Cents::ZERO,
            tax: Cents::ZERO,
            total: offer.price,
            line_items: vec![LineItem {
                product_id: offer.product_id.clone(),
                description: format!("offer {}", offer.id),
                amount: offer.price,
            }],
            mode: ChargeMode::OneTime,
            created_at: now,
            expires_at: None,
        };
        self.quotes.insert_or_get(quote, now).await
    }
}
