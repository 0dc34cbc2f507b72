use checkout_engine::application::checkout::{CheckoutService, EngineStores};
use checkout_engine::domain::catalog::{Offer, OfferContext, OrderBump, Product};
use checkout_engine::domain::coupon::{Coupon, CouponDuration, DiscountKind, ProductScope};
use checkout_engine::domain::money::{Cents, Currency};
use checkout_engine::domain::ports::{CouponStoreRef, FunnelStoreRef, OrderStoreRef, SystemClock};
use checkout_engine::infrastructure::in_memory::{
    FlatTaxTable, InMemoryCatalogStore, InMemoryCouponStore, InMemoryFunnelStore,
    InMemoryOrderStore, InMemoryQuoteStore, InMemorySessionStore,
};
use checkout_engine::infrastructure::processor::SimulatedProcessor;
use chrono::Duration;
use std::sync::Arc;

/// Fully wired engine over in-memory stores, with handles kept open for
/// seeding and assertions.
pub struct TestEngine {
    pub service: CheckoutService,
    pub catalog: InMemoryCatalogStore,
    pub processor: Arc<SimulatedProcessor>,
    pub coupons: CouponStoreRef,
    pub orders: OrderStoreRef,
    pub funnels: FunnelStoreRef,
}

#[allow(dead_code)]
pub fn engine() -> TestEngine {
    engine_with_tax(FlatTaxTable::new())
}

pub fn engine_with_tax(tax: FlatTaxTable) -> TestEngine {
    let catalog = InMemoryCatalogStore::new();
    let processor = Arc::new(SimulatedProcessor::new());
    let coupons: CouponStoreRef = Arc::new(InMemoryCouponStore::new());
    let orders: OrderStoreRef = Arc::new(InMemoryOrderStore::new());
    let funnels: FunnelStoreRef = Arc::new(InMemoryFunnelStore::new());

    let stores = EngineStores {
        catalog: Arc::new(catalog.clone()),
        coupons: coupons.clone(),
        quotes: Arc::new(InMemoryQuoteStore::new()),
        sessions: Arc::new(InMemorySessionStore::new()),
        orders: orders.clone(),
        funnels: funnels.clone(),
        processor: processor.clone(),
        tax_rates: Arc::new(tax),
        clock: Arc::new(SystemClock),
    };
    let service =
        CheckoutService::assemble(stores, Some(Duration::minutes(30)), Duration::hours(24));

    TestEngine {
        service,
        catalog,
        processor,
        coupons,
        orders,
        funnels,
    }
}

pub fn product(id: &str, price: i64) -> Product {
    Product {
        id: id.into(),
        name: format!("product {id}"),
        price: Cents(price),
        currency: Currency::Usd,
        active: true,
    }
}

#[allow(dead_code)]
pub fn order_bump(id: &str, product_id: &str) -> OrderBump {
    OrderBump {
        id: id.into(),
        product_id: product_id.into(),
        headline: "add this".into(),
        description: "goes well together".into(),
        active: true,
    }
}

#[allow(dead_code)]
pub fn upsell_offer(id: &str, product_id: &str, price: i64) -> Offer {
    Offer {
        id: id.into(),
        product_id: product_id.into(),
        context: OfferContext::Upsell,
        price: Cents(price),
        currency: Currency::Usd,
        coupon_id: None,
        max_redemptions: None,
        available_from: None,
        available_until: None,
    }
}

#[allow(dead_code)]
pub fn percentage_coupon(id: &str, code: &str, percent: i64) -> Coupon {
    Coupon::new(
        id,
        code,
        DiscountKind::Percentage(percent.into()),
        Currency::Usd,
        CouponDuration::Once,
        None,
        None,
        ProductScope::All,
    )
    .unwrap()
}
