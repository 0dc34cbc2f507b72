use crate::domain::money::{Cents, Currency};
use crate::domain::quote::{LineItem, Quote};
use crate::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl OrderStatus {
    /// The lifecycle table. `Pending` is never re-entered; `Failed`,
    /// `Refunded` and `Cancelled` are terminal; only `Completed` can refund.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Completed, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Failed | OrderStatus::Refunded | OrderStatus::Cancelled
        )
    }
}

/// The durable record of a captured payment. Monetary fields are frozen from
/// the Quote at materialization time and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub quote_id: String,
    /// Processor-side payment reference; unique across all orders.
    pub payment_reference: String,
    pub status: OrderStatus,
    pub currency: Currency,
    pub subtotal: Cents,
    pub discount: Cents,
    pub tax: Cents,
    pub total: Cents,
    pub order_items: Vec<LineItem>,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn from_quote(
        id: impl Into<String>,
        quote: &Quote,
        payment_reference: impl Into<String>,
        customer_email: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            quote_id: quote.id.clone(),
            payment_reference: payment_reference.into(),
            status: OrderStatus::Pending,
            currency: quote.currency,
            subtotal: quote.subtotal,
            discount: quote.discount,
            tax: quote.tax,
            total: quote.total,
            order_items: quote.line_items.clone(),
            customer_email,
            created_at: now,
            completed_at: None,
            failed_at: None,
            refunded_at: None,
        }
    }

    /// Applies a lifecycle transition, stamping the matching timestamp.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CheckoutError::Conflict(format!(
                "order {} cannot transition {:?} -> {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        match next {
            OrderStatus::Completed => self.completed_at = Some(now),
            OrderStatus::Failed => self.failed_at = Some(now),
            OrderStatus::Refunded => self.refunded_at = Some(now),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: "ord_1".into(),
            quote_id: "qt_1".into(),
            payment_reference: "pi_1".into(),
            status,
            currency: Currency::Usd,
            subtotal: Cents(5000),
            discount: Cents(500),
            tax: Cents(0),
            total: Cents(4500),
            order_items: vec![],
            customer_email: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            refunded_at: None,
        }
    }

    #[test]
    fn test_pending_never_reentered() {
        for status in [
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Refunded,
            OrderStatus::Cancelled,
        ] {
            assert!(!status.can_transition_to(OrderStatus::Pending));
        }
    }

    #[test]
    fn test_terminal_states_stay_terminal() {
        for status in [
            OrderStatus::Failed,
            OrderStatus::Refunded,
            OrderStatus::Cancelled,
        ] {
            for next in [
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Completed,
                OrderStatus::Failed,
                OrderStatus::Refunded,
                OrderStatus::Cancelled,
            ] {
                assert!(!status.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_only_completed_can_refund() {
        assert!(OrderStatus::Completed.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let now = Utc::now();
        let mut ord = order(OrderStatus::Pending);
        ord.transition(OrderStatus::Completed, now).unwrap();
        assert_eq!(ord.completed_at, Some(now));

        ord.transition(OrderStatus::Refunded, now).unwrap();
        assert_eq!(ord.refunded_at, Some(now));
    }

    #[test]
    fn test_invalid_transition_is_conflict() {
        let mut ord = order(OrderStatus::Refunded);
        let err = ord.transition(OrderStatus::Completed, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::Conflict(_)));
    }
}
