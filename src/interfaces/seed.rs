use crate::domain::catalog::{Offer, OrderBump, Plan, Product};
use crate::domain::coupon::Coupon;
use crate::domain::funnel::Funnel;
use crate::domain::ports::{CouponStoreRef, FunnelStoreRef};
use crate::error::{CheckoutError, Result};
use crate::infrastructure::in_memory::{FlatTaxTable, InMemoryCatalogStore};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use tracing::warn;

/// Catalog, coupon, funnel, and tax-rate fixtures loaded at startup.
///
/// The catalog is process-local and rebuilt from the seed on every run;
/// coupons and funnels go through their stores so a persistent backend keeps
/// redemption counters across restarts.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub products: Vec<Product>,
    pub plans: Vec<Plan>,
    pub order_bumps: Vec<OrderBump>,
    pub offers: Vec<Offer>,
    pub coupons: Vec<Coupon>,
    pub funnels: Vec<Funnel>,
    pub funnel_attachments: Vec<FunnelAttachment>,
    /// Country code -> flat rate, e.g. `{"DE": "0.19"}`.
    pub tax_rates: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunnelAttachment {
    pub checkout_id: String,
    pub funnel_id: String,
}

impl Seed {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    pub fn tax_table(&self) -> FlatTaxTable {
        let mut table = FlatTaxTable::new();
        for (country, rate) in &self.tax_rates {
            table.set_rate(country, *rate);
        }
        table
    }

    /// Loads the seed into the stores. A coupon whose code already exists in
    /// a persistent store is kept as stored, so counters survive reseeding.
    pub async fn apply(
        &self,
        catalog: &InMemoryCatalogStore,
        coupons: &CouponStoreRef,
        funnels: &FunnelStoreRef,
    ) -> Result<()> {
        for product in &self.products {
            catalog.put_product(product.clone()).await;
        }
        for plan in &self.plans {
            catalog.put_plan(plan.clone()).await;
        }
        for bump in &self.order_bumps {
            catalog.put_order_bump(bump.clone()).await;
        }
        for offer in &self.offers {
            catalog.put_offer(offer.clone()).await;
        }
        for coupon in &self.coupons {
            match coupons.insert(coupon.clone()).await {
                Ok(()) => {}
                Err(CheckoutError::Conflict(_)) => {
                    warn!(code = %coupon.code, "coupon already seeded, keeping stored state");
                }
                Err(err) => return Err(err),
            }
        }
        for funnel in &self.funnels {
            funnels.insert(funnel.clone()).await?;
        }
        for attachment in &self.funnel_attachments {
            funnels
                .attach_to_checkout(&attachment.checkout_id, &attachment.funnel_id)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CatalogStore, CouponStore, FunnelStore};
    use crate::domain::quote::TaxJurisdiction;
    use crate::domain::ports::TaxRateLookup;
    use crate::infrastructure::in_memory::{InMemoryCouponStore, InMemoryFunnelStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const SEED: &str = r#"{
        "products": [
            {"id": "prod_1", "name": "Course", "price": 5000, "currency": "usd", "active": true}
        ],
        "coupons": [
            {
                "id": "cpn_1", "code": "SAVE10",
                "kind": {"kind": "percentage", "value": "10"},
                "currency": "usd", "duration": {"duration": "once"},
                "max_redemptions": null, "max_redemptions_per_customer": null,
                "times_redeemed": 0, "product_scope": {"scope": "all"},
                "redeemable_from": null, "expires_at": null, "is_active": true
            }
        ],
        "funnels": [
            {
                "id": "fnl_1", "name": "Post-purchase",
                "nodes": [
                    {"id": "start", "type": "trigger", "offer_id": null},
                    {"id": "thanks", "type": "thankYou", "offer_id": null}
                ],
                "edges": [
                    {"source": "start", "target": "thanks", "condition": null}
                ]
            }
        ],
        "funnel_attachments": [
            {"checkout_id": "co_1", "funnel_id": "fnl_1"}
        ],
        "tax_rates": {"de": "0.19"}
    }"#;

    #[tokio::test]
    async fn test_seed_loads_every_section() {
        let seed = Seed::from_reader(SEED.as_bytes()).unwrap();
        let catalog = InMemoryCatalogStore::new();
        let coupons: CouponStoreRef = Arc::new(InMemoryCouponStore::new());
        let funnels: FunnelStoreRef = Arc::new(InMemoryFunnelStore::new());

        seed.apply(&catalog, &coupons, &funnels).await.unwrap();

        assert!(catalog.product("prod_1").await.unwrap().is_some());
        assert!(coupons.by_code("SAVE10").await.unwrap().is_some());
        assert!(funnels.for_checkout("co_1").await.unwrap().is_some());

        let table = seed.tax_table();
        let rate = table.rate_for(&TaxJurisdiction {
            country: "DE".into(),
            vat_id: None,
        });
        assert_eq!(rate, Some(dec!(0.19)));
    }

    #[tokio::test]
    async fn test_seed_rejects_out_of_range_percentage() {
        let bad = SEED.replace(r#""value": "10""#, r#""value": "150""#);
        let seed = Seed::from_reader(bad.as_bytes()).unwrap();
        let catalog = InMemoryCatalogStore::new();
        let coupons: CouponStoreRef = Arc::new(InMemoryCouponStore::new());
        let funnels: FunnelStoreRef = Arc::new(InMemoryFunnelStore::new());

        let err = seed.apply(&catalog, &coupons, &funnels).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Invalid(_)));
        assert!(coupons.by_code("SAVE10").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reseeding_keeps_stored_coupon_state() {
        let seed = Seed::from_reader(SEED.as_bytes()).unwrap();
        let catalog = InMemoryCatalogStore::new();
        let coupons: CouponStoreRef = Arc::new(InMemoryCouponStore::new());
        let funnels: FunnelStoreRef = Arc::new(InMemoryFunnelStore::new());

        seed.apply(&catalog, &coupons, &funnels).await.unwrap();
        // A second pass over the same stores must not error or reset coupons.
        seed.apply(&catalog, &coupons, &funnels).await.unwrap();

        let coupon = coupons.by_code("SAVE10").await.unwrap().unwrap();
        assert_eq!(coupon.times_redeemed, 0);
    }
}
