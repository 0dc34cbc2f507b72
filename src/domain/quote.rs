use crate::domain::catalog::RecurringInterval;
use crate::domain::money::{Cents, Currency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The inputs that affect a price. Hashing this is the pricing idempotency
/// contract: an identical cart must resolve to the identical Quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub product_id: Option<String>,
    pub plan_id: Option<String>,
    pub order_bump_ids: Vec<String>,
    pub coupon_code: Option<String>,
    pub currency: Currency,
    pub quantity: u32,
    pub tax_jurisdiction: Option<TaxJurisdiction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxJurisdiction {
    pub country: String,
    pub vat_id: Option<String>,
}

impl Cart {
    /// Stable SHA-256 fingerprint over every price-affecting input.
    ///
    /// Bump ids are sorted so selection order does not change the hash; fields
    /// are written in a fixed order with explicit separators so adjacent
    /// values cannot collide.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.product_id.as_deref().unwrap_or(""));
        hasher.update(b"|");
        hasher.update(self.plan_id.as_deref().unwrap_or(""));
        hasher.update(b"|");
        let mut bumps = self.order_bump_ids.clone();
        bumps.sort();
        for bump in &bumps {
            hasher.update(bump);
            hasher.update(b",");
        }
        hasher.update(b"|");
        hasher.update(self.coupon_code.as_deref().unwrap_or(""));
        hasher.update(b"|");
        hasher.update(self.currency.to_string());
        hasher.update(b"|");
        hasher.update(self.quantity.to_be_bytes());
        hasher.update(b"|");
        if let Some(ref tax) = self.tax_jurisdiction {
            hasher.update(&tax.country);
            hasher.update(b"/");
            hasher.update(tax.vat_id.as_deref().unwrap_or(""));
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ChargeMode {
    OneTime,
    Recurring { interval: RecurringInterval },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub description: String,
    pub amount: Cents,
}

/// A cached, immutable price breakdown for one distinct cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub cart_hash: String,
    pub product_id: Option<String>,
    pub plan_id: Option<String>,
    pub order_bump_ids: Vec<String>,
    pub coupon_code: Option<String>,
    pub currency: Currency,
    pub subtotal: Cents,
    pub discount: Cents,
    pub tax: Cents,
    pub total: Cents,
    pub line_items: Vec<LineItem>,
    pub mode: ChargeMode,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}
