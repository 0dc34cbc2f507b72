use crate::application::checkout::{
    CheckoutIntentRequest, CheckoutIntentResponse, CheckoutService, ConfirmPaymentRequest,
};
use crate::application::funnel_flow::{DecisionOutcome, SessionContext};
use crate::application::ledger::RedemptionAmounts;
use crate::domain::catalog::Offer;
use crate::domain::coupon::CouponValidation;
use crate::domain::money::{Cents, Currency};
use crate::domain::order::Order;
use crate::domain::quote::ChargeMode;
use crate::domain::session::CheckoutSession;
use crate::error::{CheckoutError, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::info;

/// One RPC call, as a storefront or the processor webhook would issue it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "params")]
pub enum Request {
    #[serde(rename = "coupon.validate")]
    ValidateCoupon {
        code: String,
        product_id: Option<String>,
        plan_id: Option<String>,
        amount: Cents,
        customer_email: Option<String>,
    },
    /// Amount-only validation kept for storefronts that predate scoping.
    #[serde(rename = "payment.validateCoupon")]
    ValidateCouponLegacy { code: String, amount: Cents },
    #[serde(rename = "coupon.redeem")]
    RedeemCoupon {
        coupon_id: String,
        payment_reference: String,
        customer_email: Option<String>,
        discount_applied: Cents,
        original_amount: Cents,
        final_amount: Cents,
    },
    #[serde(rename = "payment.createCheckoutIntent")]
    CreateCheckoutIntent {
        checkout_id: String,
        email: String,
        product_id: Option<String>,
        plan_id: Option<String>,
        #[serde(default)]
        order_bump_ids: Vec<String>,
        coupon_code: Option<String>,
        currency: Currency,
        billing_country: Option<String>,
        vat_id: Option<String>,
        #[serde(default)]
        enable_tax: bool,
    },
    /// The processor's confirmation webhook. Delivered at least once.
    #[serde(rename = "payment.confirm")]
    ConfirmPayment {
        payment_reference: String,
        quote_id: String,
        session_id: String,
        succeeded: bool,
        decline_reason: Option<String>,
        payment_method: Option<String>,
        customer_email: Option<String>,
    },
    #[serde(rename = "checkout.getSession")]
    GetSession { session_id: String },
    #[serde(rename = "checkout.acceptUpsell")]
    AcceptUpsell { session_id: String, offer_id: String },
    #[serde(rename = "checkout.declineUpsell")]
    DeclineUpsell { session_id: String, offer_id: String },
    #[serde(rename = "order.refund")]
    RefundOrder { order_id: String },
    #[serde(rename = "order.cancel")]
    CancelOrder { order_id: String },
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::ValidateCoupon { .. } => "coupon.validate",
            Request::ValidateCouponLegacy { .. } => "payment.validateCoupon",
            Request::RedeemCoupon { .. } => "coupon.redeem",
            Request::CreateCheckoutIntent { .. } => "payment.createCheckoutIntent",
            Request::ConfirmPayment { .. } => "payment.confirm",
            Request::GetSession { .. } => "checkout.getSession",
            Request::AcceptUpsell { .. } => "checkout.acceptUpsell",
            Request::DeclineUpsell { .. } => "checkout.declineUpsell",
            Request::RefundOrder { .. } => "order.refund",
            Request::CancelOrder { .. } => "order.cancel",
        }
    }
}

/// One line of output per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(flatten)]
        body: ResponseBody,
    },
    Error {
        kind: &'static str,
        message: String,
        retryable: bool,
    },
}

impl Response {
    pub fn ok(body: ResponseBody) -> Self {
        Response::Ok { body }
    }

    pub fn error(err: &CheckoutError) -> Self {
        let kind = match err {
            CheckoutError::NotFound(_, _) => "not_found",
            CheckoutError::Conflict(_) => "conflict",
            CheckoutError::Invalid(_) => "invalid",
            CheckoutError::ProcessorDeclined(_) => "processor_declined",
            CheckoutError::ProcessorUnavailable(_) => "processor_unavailable",
            CheckoutError::IoError(_)
            | CheckoutError::SerdeError(_)
            | CheckoutError::InternalError(_) => "internal",
        };
        Response::Error {
            kind,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Coupon(CouponValidation),
    Intent(IntentView),
    Session(SessionView),
    Decision(DecisionView),
    Order(Order),
    Ack { ok: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentView {
    pub session_id: String,
    pub quote_id: String,
    pub intent_id: String,
    pub client_secret: String,
    pub amount: Cents,
    pub discount_amount: Cents,
    #[serde(flatten)]
    pub mode: ChargeMode,
}

impl From<CheckoutIntentResponse> for IntentView {
    fn from(response: CheckoutIntentResponse) -> Self {
        Self {
            session_id: response.session_id,
            quote_id: response.quote_id,
            intent_id: response.intent_id,
            client_secret: response.client_secret,
            amount: response.amount,
            discount_amount: response.discount_amount,
            mode: response.mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session: CheckoutSession,
    pub funnel_id: Option<String>,
    pub current_offer: Option<Offer>,
}

impl From<SessionContext> for SessionView {
    fn from(context: SessionContext) -> Self {
        Self {
            session: context.session,
            funnel_id: context.funnel_id,
            current_offer: context.current_offer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DecisionView {
    Advanced {
        next_path: String,
        order_id: Option<String>,
    },
    Declined {
        reason: String,
    },
}

impl From<DecisionOutcome> for DecisionView {
    fn from(outcome: DecisionOutcome) -> Self {
        match outcome {
            DecisionOutcome::Advanced {
                next_path,
                order_id,
            } => DecisionView::Advanced {
                next_path,
                order_id,
            },
            DecisionOutcome::ChargeDeclined { reason } => DecisionView::Declined { reason },
        }
    }
}

/// Reads RPC requests from a JSON-lines source.
///
/// Wraps any `BufRead` and yields one `Result<Request>` per non-blank line,
/// so large replay files stream without loading into memory.
pub struct RequestReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn requests(self) -> impl Iterator<Item = Result<Request>> {
        self.source
            .lines()
            .map(|line| -> Result<Option<Request>> {
                let line = line?;
                if line.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_str(&line)?))
            })
            .filter_map(|result| result.transpose())
    }
}

/// Routes one request to its service method. Failures become error responses;
/// the replay loop never aborts on a bad request.
pub async fn dispatch(service: &CheckoutService, request: Request) -> Response {
    info!(op = request.op(), "dispatching request");
    let result = match request {
        Request::ValidateCoupon {
            code,
            product_id,
            plan_id,
            amount,
            customer_email,
        } => service
            .validate_coupon(
                &code,
                product_id.as_deref(),
                plan_id.as_deref(),
                amount,
                customer_email.as_deref(),
            )
            .await
            .map(ResponseBody::Coupon),
        Request::ValidateCouponLegacy { code, amount } => service
            .validate_coupon_legacy(&code, amount)
            .await
            .map(ResponseBody::Coupon),
        Request::RedeemCoupon {
            coupon_id,
            payment_reference,
            customer_email,
            discount_applied,
            original_amount,
            final_amount,
        } => service
            .redeem_coupon(
                &coupon_id,
                &payment_reference,
                customer_email.as_deref(),
                RedemptionAmounts {
                    discount_applied,
                    original_amount,
                    final_amount,
                },
            )
            .await
            .map(|()| ResponseBody::Ack { ok: true }),
        Request::CreateCheckoutIntent {
            checkout_id,
            email,
            product_id,
            plan_id,
            order_bump_ids,
            coupon_code,
            currency,
            billing_country,
            vat_id,
            enable_tax,
        } => service
            .create_checkout_intent(CheckoutIntentRequest {
                checkout_id,
                email,
                product_id,
                plan_id,
                order_bump_ids,
                coupon_code,
                currency,
                billing_country,
                vat_id,
                enable_tax,
            })
            .await
            .map(|response| ResponseBody::Intent(response.into())),
        Request::ConfirmPayment {
            payment_reference,
            quote_id,
            session_id,
            succeeded,
            decline_reason,
            payment_method,
            customer_email,
        } => service
            .confirm_payment(ConfirmPaymentRequest {
                payment_reference,
                quote_id,
                session_id,
                succeeded,
                decline_reason,
                payment_method,
                customer_email,
            })
            .await
            .map(ResponseBody::Order),
        Request::GetSession { session_id } => service
            .get_session(&session_id)
            .await
            .map(|context| ResponseBody::Session(context.into())),
        Request::AcceptUpsell {
            session_id,
            offer_id,
        } => service
            .accept_upsell(&session_id, &offer_id)
            .await
            .map(|outcome| ResponseBody::Decision(outcome.into())),
        Request::DeclineUpsell {
            session_id,
            offer_id,
        } => service
            .decline_upsell(&session_id, &offer_id)
            .await
            .map(|outcome| ResponseBody::Decision(outcome.into())),
        Request::RefundOrder { order_id } => service
            .refund_order(&order_id)
            .await
            .map(ResponseBody::Order),
        Request::CancelOrder { order_id } => service
            .cancel_order(&order_id)
            .await
            .map(ResponseBody::Order),
    };

    match result {
        Ok(body) => Response::ok(body),
        Err(err) => Response::error(&err),
    }
}
