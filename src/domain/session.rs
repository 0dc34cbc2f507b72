use crate::domain::money::Cents;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a customer currently is in the funnel. `Checkout` and `ThankYou`
/// are the sentinel endpoints; everything in between is a funnel node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "step", content = "node")]
pub enum Step {
    Checkout,
    Node(String),
    ThankYou,
}

/// What the customer has bought so far in this checkout attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub products_purchased: Vec<String>,
    pub bumps_accepted: Vec<String>,
    pub upsells_accepted: Vec<String>,
    pub total_spent: Cents,
}

/// Additions applied to session data when a funnel step lands.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PurchaseDelta {
    pub products: Vec<String>,
    pub bumps: Vec<String>,
    pub upsells: Vec<String>,
    pub spent: Cents,
    /// Stored payment method handle, attached once the primary payment
    /// confirms so later upsells can charge off-session.
    pub payment_method: Option<String>,
}

impl SessionData {
    pub fn apply(&mut self, delta: &PurchaseDelta) {
        self.products_purchased.extend(delta.products.iter().cloned());
        self.bumps_accepted.extend(delta.bumps.iter().cloned());
        self.upsells_accepted.extend(delta.upsells.iter().cloned());
        self.total_spent += delta.spent;
    }
}

/// One row per checkout attempt. Never deleted; a session either completes
/// or expires in place. `version` backs the compare-and-swap on every write
/// so a stale client retrying an old step cannot regress `current_step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_id: String,
    pub current_step: Step,
    pub data: SessionData,
    pub version: u64,
    pub payment_method: Option<String>,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl CheckoutSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some() || self.current_step == Step::ThankYou
    }
}
