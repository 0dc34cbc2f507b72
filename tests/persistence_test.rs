#![cfg(feature = "storage-rocksdb")]

mod common;

use checkout_engine::application::checkout::{
    CheckoutIntentRequest, CheckoutService, ConfirmPaymentRequest, EngineStores,
};
use checkout_engine::domain::money::{Cents, Currency};
use checkout_engine::domain::order::OrderStatus;
use checkout_engine::domain::ports::{CouponStore, OrderStore, SystemClock};
use checkout_engine::infrastructure::in_memory::{FlatTaxTable, InMemoryCatalogStore};
use checkout_engine::infrastructure::processor::SimulatedProcessor;
use checkout_engine::infrastructure::rocksdb::RocksDbEngineStore;
use chrono::Duration;
use common::{percentage_coupon, product};
use std::path::Path;
use std::sync::Arc;

async fn service_at(path: &Path) -> (CheckoutService, RocksDbEngineStore) {
    let store = RocksDbEngineStore::open(path).unwrap();
    let catalog = InMemoryCatalogStore::new();
    catalog.put_product(product("prod_1", 5000)).await;

    let stores = EngineStores {
        catalog: Arc::new(catalog),
        coupons: Arc::new(store.clone()),
        quotes: Arc::new(store.clone()),
        sessions: Arc::new(store.clone()),
        orders: Arc::new(store.clone()),
        funnels: Arc::new(store.clone()),
        processor: Arc::new(SimulatedProcessor::new()),
        tax_rates: Arc::new(FlatTaxTable::new()),
        clock: Arc::new(SystemClock),
    };
    let service =
        CheckoutService::assemble(stores, Some(Duration::minutes(30)), Duration::hours(24));
    (service, store)
}

#[tokio::test]
async fn test_orders_and_redemptions_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let (order_id, reference, quote_id, session_id);
    {
        let (service, store) = service_at(dir.path()).await;
        CouponStore::insert(&store, percentage_coupon("cpn_1", "SAVE10", 10))
            .await
            .unwrap();

        let response = service
            .create_checkout_intent(CheckoutIntentRequest {
                checkout_id: "co_1".into(),
                email: "buyer@example.com".into(),
                product_id: Some("prod_1".into()),
                plan_id: None,
                order_bump_ids: vec![],
                coupon_code: Some("SAVE10".into()),
                currency: Currency::Usd,
                billing_country: None,
                vat_id: None,
                enable_tax: false,
            })
            .await
            .unwrap();
        let order = service
            .confirm_payment(ConfirmPaymentRequest {
                payment_reference: response.intent_id.clone(),
                quote_id: response.quote_id.clone(),
                session_id: response.session_id.clone(),
                succeeded: true,
                decline_reason: None,
                payment_method: Some("pm_1".into()),
                customer_email: Some("buyer@example.com".into()),
            })
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        order_id = order.id;
        reference = response.intent_id;
        quote_id = response.quote_id;
        session_id = response.session_id;
    }

    let (service, store) = service_at(dir.path()).await;

    let order = OrderStore::get(&store, &order_id).await.unwrap().unwrap();
    assert_eq!(order.total, Cents(4500));
    let by_reference = store.by_payment_reference(&reference).await.unwrap().unwrap();
    assert_eq!(by_reference.id, order_id);

    let coupon = store.by_code("SAVE10").await.unwrap().unwrap();
    assert_eq!(coupon.times_redeemed, 1);

    // A webhook retry delivered after the restart still lands on the same
    // order and does not double count the redemption.
    let replayed = service
        .confirm_payment(ConfirmPaymentRequest {
            payment_reference: reference.clone(),
            quote_id,
            session_id,
            succeeded: true,
            decline_reason: None,
            payment_method: Some("pm_1".into()),
            customer_email: Some("buyer@example.com".into()),
        })
        .await
        .unwrap();
    assert_eq!(replayed.id, order_id);
    let coupon = store.by_code("SAVE10").await.unwrap().unwrap();
    assert_eq!(coupon.times_redeemed, 1);
}
