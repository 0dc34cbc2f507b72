mod common;

use checkout_engine::application::checkout::{CheckoutIntentRequest, ConfirmPaymentRequest};
use checkout_engine::application::funnel_flow::{DecisionOutcome, THANK_YOU_PATH};
use checkout_engine::domain::funnel::{
    Decision, Funnel, FunnelEdge, FunnelNode, NodeKind, Predicate,
};
use checkout_engine::domain::money::{Cents, Currency};
use checkout_engine::domain::order::OrderStatus;
use checkout_engine::domain::session::Step;
use checkout_engine::error::CheckoutError;
use common::{TestEngine, engine, product, upsell_offer};

fn node(id: &str, kind: NodeKind, offer_id: Option<&str>) -> FunnelNode {
    FunnelNode {
        id: id.into(),
        kind,
        offer_id: offer_id.map(Into::into),
    }
}

fn edge(source: &str, target: &str, condition: Option<Decision>) -> FunnelEdge {
    FunnelEdge {
        source: source.into(),
        target: target.into(),
        condition,
    }
}

/// trigger -> u1 (offer_a); accept -> thankYou, decline -> d1 (offer_b) -> thankYou.
fn upsell_downsell_funnel() -> Funnel {
    Funnel {
        id: "fnl_1".into(),
        name: "post-purchase".into(),
        nodes: vec![
            node("start", NodeKind::Trigger, None),
            node("u1", NodeKind::Upsell, Some("offer_a")),
            node("d1", NodeKind::Downsell, Some("offer_b")),
            node("end", NodeKind::ThankYou, None),
        ],
        edges: vec![
            edge("start", "u1", None),
            edge("u1", "end", Some(Decision::Accept)),
            edge("u1", "d1", Some(Decision::Decline)),
            edge("d1", "end", None),
        ],
    }
}

/// Primes a paid session sitting on the funnel's first node.
async fn paid_session(engine: &TestEngine, payment_method: &str) -> String {
    let response = engine
        .service
        .create_checkout_intent(CheckoutIntentRequest {
            checkout_id: "co_1".into(),
            email: "buyer@example.com".into(),
            product_id: Some("prod_1".into()),
            plan_id: None,
            order_bump_ids: vec![],
            coupon_code: None,
            currency: Currency::Usd,
            billing_country: None,
            vat_id: None,
            enable_tax: false,
        })
        .await
        .unwrap();
    engine
        .service
        .confirm_payment(ConfirmPaymentRequest {
            payment_reference: response.intent_id.clone(),
            quote_id: response.quote_id.clone(),
            session_id: response.session_id.clone(),
            succeeded: true,
            decline_reason: None,
            payment_method: Some(payment_method.into()),
            customer_email: Some("buyer@example.com".into()),
        })
        .await
        .unwrap();
    response.session_id
}

async fn seed_funnel_catalog(engine: &TestEngine) {
    engine.catalog.put_product(product("prod_1", 5000)).await;
    engine.catalog.put_product(product("prod_up", 3000)).await;
    engine.catalog.put_product(product("prod_down", 1500)).await;
    engine
        .catalog
        .put_offer(upsell_offer("offer_a", "prod_up", 2000))
        .await;
    engine
        .catalog
        .put_offer(upsell_offer("offer_b", "prod_down", 1000))
        .await;
    engine.funnels.insert(upsell_downsell_funnel()).await.unwrap();
    engine
        .funnels
        .attach_to_checkout("co_1", "fnl_1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_confirmation_lands_on_first_funnel_node() {
    let engine = engine();
    seed_funnel_catalog(&engine).await;

    let session_id = paid_session(&engine, "pm_1").await;
    let context = engine.service.get_session(&session_id).await.unwrap();

    assert_eq!(context.session.current_step, Step::Node("u1".into()));
    assert_eq!(context.funnel_id.as_deref(), Some("fnl_1"));
    assert_eq!(
        context.current_offer.map(|o| o.id),
        Some("offer_a".to_string())
    );
}

#[tokio::test]
async fn test_accept_charges_off_session_and_completes() {
    let engine = engine();
    seed_funnel_catalog(&engine).await;
    let session_id = paid_session(&engine, "pm_1").await;

    let outcome = engine
        .service
        .accept_upsell(&session_id, "offer_a")
        .await
        .unwrap();

    let DecisionOutcome::Advanced {
        next_path,
        order_id,
    } = outcome
    else {
        panic!("expected the session to advance");
    };
    assert_eq!(next_path, THANK_YOU_PATH);

    let order = engine.orders.get(&order_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.total, Cents(2000));

    let context = engine.service.get_session(&session_id).await.unwrap();
    assert!(context.session.is_completed());
    assert_eq!(context.session.data.upsells_accepted, vec!["offer_a"]);
    // 5000 primary + 2000 upsell.
    assert_eq!(context.session.data.total_spent, Cents(7000));
}

#[tokio::test]
async fn test_decline_routes_to_downsell_without_charging() {
    let engine = engine();
    seed_funnel_catalog(&engine).await;
    let session_id = paid_session(&engine, "pm_1").await;

    let outcome = engine
        .service
        .decline_upsell(&session_id, "offer_a")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DecisionOutcome::Advanced {
            next_path: "d1".into(),
            order_id: None,
        }
    );

    // Accepting the downsell then finishes the funnel.
    let outcome = engine
        .service
        .accept_upsell(&session_id, "offer_b")
        .await
        .unwrap();
    let DecisionOutcome::Advanced { next_path, .. } = outcome else {
        panic!("expected the session to advance");
    };
    assert_eq!(next_path, THANK_YOU_PATH);
}

#[tokio::test]
async fn test_declined_charge_keeps_session_in_place() {
    let engine = engine();
    seed_funnel_catalog(&engine).await;
    engine
        .processor
        .decline_payment_method("pm_bad", "insufficient_funds")
        .await;
    let session_id = paid_session(&engine, "pm_bad").await;

    let outcome = engine
        .service
        .accept_upsell(&session_id, "offer_a")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DecisionOutcome::ChargeDeclined {
            reason: "insufficient_funds".into(),
        }
    );

    // Still on the offer screen; nothing was recorded.
    let context = engine.service.get_session(&session_id).await.unwrap();
    assert_eq!(context.session.current_step, Step::Node("u1".into()));
    assert!(context.session.data.upsells_accepted.is_empty());
}

#[tokio::test]
async fn test_racing_accepts_capture_funds_once() {
    let engine = engine();
    seed_funnel_catalog(&engine).await;
    let session_id = paid_session(&engine, "pm_1").await;

    // Stall the capture so both tabs read the session before either moves it.
    engine
        .processor
        .set_off_session_delay(std::time::Duration::from_millis(50))
        .await;
    let intents_before = engine.processor.intent_count().await;

    let first = tokio::spawn({
        let service = engine.service.clone();
        let session_id = session_id.clone();
        async move { service.accept_upsell(&session_id, "offer_a").await }
    });
    let second = tokio::spawn({
        let service = engine.service.clone();
        let session_id = session_id.clone();
        async move { service.accept_upsell(&session_id, "offer_a").await }
    });
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    let accepted = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(accepted, 1);
    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, Err(CheckoutError::Conflict(_))))
    );
    // The double click produced exactly one processor-side capture.
    assert_eq!(engine.processor.intent_count().await - intents_before, 1);

    let context = engine.service.get_session(&session_id).await.unwrap();
    assert_eq!(context.session.data.upsells_accepted, vec!["offer_a"]);
    assert_eq!(context.session.data.total_spent, Cents(7000));
}

#[tokio::test]
async fn test_stale_decision_is_rejected() {
    let engine = engine();
    seed_funnel_catalog(&engine).await;
    let session_id = paid_session(&engine, "pm_1").await;

    engine
        .service
        .accept_upsell(&session_id, "offer_a")
        .await
        .unwrap();

    // A second tab replaying the same screen after completion.
    let err = engine
        .service
        .accept_upsell(&session_id, "offer_a")
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Conflict(_)));

    // So is acting on an offer that is not the current screen.
    let session_id = paid_session(&engine, "pm_1").await;
    let err = engine
        .service
        .accept_upsell(&session_id, "offer_b")
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Conflict(_)));
}

#[tokio::test]
async fn test_condition_node_routes_on_session_data() {
    let engine = engine();
    engine.catalog.put_product(product("prod_1", 5000)).await;
    engine.catalog.put_product(product("prod_vip", 9000)).await;
    engine.catalog.put_product(product("prod_basic", 900)).await;
    engine
        .catalog
        .put_offer(upsell_offer("offer_vip", "prod_vip", 8000))
        .await;
    engine
        .catalog
        .put_offer(upsell_offer("offer_basic", "prod_basic", 500))
        .await;

    // trigger -> condition(spent >= 100.00) -> vip on true, basic on false.
    let funnel = Funnel {
        id: "fnl_2".into(),
        name: "spend gate".into(),
        nodes: vec![
            node("start", NodeKind::Trigger, None),
            node(
                "gate",
                NodeKind::Condition {
                    predicate: Predicate::TotalSpentAtLeast {
                        cents: Cents(10_000),
                    },
                },
                None,
            ),
            node("vip", NodeKind::Upsell, Some("offer_vip")),
            node("basic", NodeKind::Upsell, Some("offer_basic")),
        ],
        edges: vec![
            edge("start", "gate", None),
            edge("gate", "vip", Some(Decision::Accept)),
            edge("gate", "basic", Some(Decision::Decline)),
        ],
    };
    engine.funnels.insert(funnel).await.unwrap();
    engine
        .funnels
        .attach_to_checkout("co_1", "fnl_2")
        .await
        .unwrap();

    // The primary purchase is 50.00, under the gate.
    let session_id = paid_session(&engine, "pm_1").await;
    let context = engine.service.get_session(&session_id).await.unwrap();
    assert_eq!(context.session.current_step, Step::Node("basic".into()));
}
