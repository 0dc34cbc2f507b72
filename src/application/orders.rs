use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{ClockRef, OrderInsert, OrderStoreRef};
use crate::domain::quote::Quote;
use crate::error::{CheckoutError, Result};
use uuid::Uuid;

/// What the processor told us about a payment, distilled from its webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub payment_reference: String,
    pub outcome: ConfirmationOutcome,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Succeeded,
    Declined { reason: String },
}

/// Materializes immutable Orders from Quotes once the processor confirms,
/// and walks their lifecycle afterwards.
#[derive(Clone)]
pub struct OrderRecorder {
    orders: OrderStoreRef,
    clock: ClockRef,
}

impl OrderRecorder {
    pub fn new(orders: OrderStoreRef, clock: ClockRef) -> Self {
        Self { orders, clock }
    }

    /// Freezes the quote's amounts into an Order. Idempotent on the payment
    /// reference: the storage uniqueness guard makes a duplicate webhook
    /// delivery return the already-materialized Order, same id, no error.
    pub async fn materialize(
        &self,
        quote: &Quote,
        confirmation: &PaymentConfirmation,
    ) -> Result<Order> {
        let now = self.clock.now();
        let mut order = Order::from_quote(
            format!("ord_{}", Uuid::new_v4()),
            quote,
            &confirmation.payment_reference,
            confirmation.customer_email.clone(),
            now,
        );
        match &confirmation.outcome {
            ConfirmationOutcome::Succeeded => order.transition(OrderStatus::Completed, now)?,
            ConfirmationOutcome::Declined { .. } => order.transition(OrderStatus::Failed, now)?,
        }

        match self.orders.insert_unique(order).await? {
            OrderInsert::Inserted(order) => {
                tracing::info!(
                    order_id = order.id,
                    payment_reference = order.payment_reference,
                    status = ?order.status,
                    "order materialized"
                );
                Ok(order)
            }
            OrderInsert::Existing(order) => {
                tracing::debug!(
                    order_id = order.id,
                    payment_reference = order.payment_reference,
                    "duplicate confirmation, returning existing order"
                );
                Ok(order)
            }
        }
    }

    pub async fn get(&self, order_id: &str) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("order", order_id.to_string()))
    }

    /// `completed -> refunded`; anything else is a `Conflict`.
    pub async fn refund(&self, order_id: &str) -> Result<Order> {
        self.transition(order_id, OrderStatus::Refunded).await
    }

    /// Any non-terminal state -> `cancelled`.
    pub async fn cancel(&self, order_id: &str) -> Result<Order> {
        self.transition(order_id, OrderStatus::Cancelled).await
    }

    async fn transition(&self, order_id: &str, next: OrderStatus) -> Result<Order> {
        let mut order = self.get(order_id).await?;
        order.transition(next, self.clock.now())?;
        self.orders.update(order.clone()).await?;
        tracing::info!(order_id, status = ?next, "order transitioned");
        Ok(order)
    }
}
