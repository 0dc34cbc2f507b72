use crate::domain::money::{Cents, Currency};
use crate::domain::ports::{
    OffSessionOutcome, PaymentIntent, PaymentIntentRequest, PaymentProcessor, ProcessorCustomer,
    ProcessorSubscription, SubscriptionRequest,
};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-process stand-in for the external payment service.
///
/// Mimics the behaviors the orchestrator has to survive: duplicate customer
/// records for one email, declining payment methods, and transient outages.
/// Used by tests and the CLI replay driver; a real deployment implements
/// `PaymentProcessor` against the processor's HTTP API instead.
#[derive(Default, Clone)]
pub struct SimulatedProcessor {
    inner: Arc<RwLock<ProcessorInner>>,
}

/// A payment intent as the processor holds it, metadata included.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: Cents,
    pub currency: Currency,
    pub customer_id: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Default)]
struct ProcessorInner {
    customers: Vec<ProcessorCustomer>,
    intents: HashMap<String, StoredIntent>,
    subscriptions: HashMap<String, SubscriptionRequest>,
    /// subscription id by (customer, plan), for reuse.
    subscription_index: HashMap<(String, String), String>,
    declining_methods: HashMap<String, String>,
    /// Captured payment reference by idempotency key.
    off_session_keys: HashMap<String, String>,
    refunds: Vec<String>,
    outage: bool,
    off_session_delay: Option<std::time::Duration>,
    sequence: u64,
}

impl ProcessorInner {
    fn next(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}_{}", self.sequence)
    }

    fn check_available(&self) -> Result<()> {
        if self.outage {
            return Err(CheckoutError::ProcessorUnavailable(
                "simulated outage".to_string(),
            ));
        }
        Ok(())
    }
}

impl SimulatedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `ProcessorUnavailable` until
    /// cleared.
    pub async fn set_outage(&self, outage: bool) {
        self.inner.write().await.outage = outage;
    }

    /// Registers a payment method that declines with the given reason.
    pub async fn decline_payment_method(&self, payment_method: &str, reason: &str) {
        self.inner
            .write()
            .await
            .declining_methods
            .insert(payment_method.to_string(), reason.to_string());
    }

    /// Stalls every off-session capture, widening race windows for tests.
    pub async fn set_off_session_delay(&self, delay: std::time::Duration) {
        self.inner.write().await.off_session_delay = Some(delay);
    }

    pub async fn intent(&self, intent_id: &str) -> Option<StoredIntent> {
        self.inner.read().await.intents.get(intent_id).cloned()
    }

    pub async fn intent_count(&self) -> usize {
        self.inner.read().await.intents.len()
    }

    pub async fn subscription_count(&self) -> usize {
        self.inner.read().await.subscriptions.len()
    }

    pub async fn refunded(&self, payment_reference: &str) -> bool {
        self.inner
            .read()
            .await
            .refunds
            .iter()
            .any(|r| r == payment_reference)
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    async fn customers_by_email(&self, email: &str) -> Result<Vec<ProcessorCustomer>> {
        let inner = self.inner.read().await;
        inner.check_available()?;
        Ok(inner
            .customers
            .iter()
            .filter(|c| c.email == email)
            .cloned()
            .collect())
    }

    async fn create_customer(&self, email: &str) -> Result<ProcessorCustomer> {
        let mut inner = self.inner.write().await;
        inner.check_available()?;
        let customer = ProcessorCustomer {
            id: inner.next("cus"),
            email: email.to_string(),
            created_at: Utc::now(),
        };
        inner.customers.push(customer.clone());
        Ok(customer)
    }

    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent> {
        let mut inner = self.inner.write().await;
        inner.check_available()?;
        let id = inner.next("pi");
        let client_secret = format!("{id}_secret");
        inner.intents.insert(
            id.clone(),
            StoredIntent {
                id: id.clone(),
                client_secret: client_secret.clone(),
                amount: request.amount,
                currency: request.currency,
                customer_id: request.customer_id,
                metadata: request.metadata,
            },
        );
        Ok(PaymentIntent { id, client_secret })
    }

    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<ProcessorSubscription> {
        let mut inner = self.inner.write().await;
        inner.check_available()?;

        let key = (request.customer_id.clone(), request.plan_id.clone());
        let subscription_id = match inner.subscription_index.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let id = inner.next("sub");
                inner.subscription_index.insert(key, id.clone());
                inner.subscriptions.insert(id.clone(), request.clone());
                id
            }
        };

        let intent_id = inner.next("pi");
        let client_secret = format!("{intent_id}_secret");
        inner.intents.insert(
            intent_id.clone(),
            StoredIntent {
                id: intent_id.clone(),
                client_secret: client_secret.clone(),
                amount: request.amount,
                currency: request.currency,
                customer_id: request.customer_id,
                metadata: request.metadata,
            },
        );
        Ok(ProcessorSubscription {
            id: subscription_id,
            first_invoice_intent: PaymentIntent {
                id: intent_id,
                client_secret,
            },
        })
    }

    async fn charge_off_session(
        &self,
        customer_id: &str,
        payment_method: &str,
        amount: Cents,
        currency: Currency,
        idempotency_key: &str,
        metadata: HashMap<String, String>,
    ) -> Result<OffSessionOutcome> {
        let delay = self.inner.read().await.off_session_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.write().await;
        inner.check_available()?;

        if let Some(existing) = inner.off_session_keys.get(idempotency_key) {
            return Ok(OffSessionOutcome::Succeeded {
                payment_reference: existing.clone(),
            });
        }
        if let Some(reason) = inner.declining_methods.get(payment_method) {
            return Ok(OffSessionOutcome::Declined {
                reason: reason.clone(),
            });
        }
        let id = inner.next("pi");
        inner.intents.insert(
            id.clone(),
            StoredIntent {
                id: id.clone(),
                client_secret: format!("{id}_secret"),
                amount,
                currency,
                customer_id: customer_id.to_string(),
                metadata,
            },
        );
        inner
            .off_session_keys
            .insert(idempotency_key.to_string(), id.clone());
        Ok(OffSessionOutcome::Succeeded {
            payment_reference: id,
        })
    }

    async fn refund(&self, payment_reference: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.check_available()?;
        if !inner.intents.contains_key(payment_reference) {
            return Err(CheckoutError::NotFound(
                "payment intent",
                payment_reference.to_string(),
            ));
        }
        inner.refunds.push(payment_reference.to_string());
        Ok(())
    }
}
