use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{GatewayOutcome, Paise, SellerId};

/// The external payment gateway, as seen by the engine.
///
/// Calls only record an intent with the gateway. Whether money actually moved is reported later, either when the
/// settlement worker asks for it ([`PaymentGateway::refund_outcome`], [`PaymentGateway::payout_outcome`]) or when
/// the gateway's callback is passed to `RefundApi::reconcile_refund` or `PayoutApi::reconcile_disbursement`.
/// Implementations must treat `idempotency_token` as a de-duplication key: repeating a request with the same token
/// must not move money twice.
///
/// [`GatewayError::Rejected`] means the gateway will never accept the request. [`GatewayError::Unavailable`] means it
/// is worth trying again.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    async fn issue_refund(&self, request: GatewayRefundRequest) -> Result<GatewayReceipt, GatewayError>;

    async fn disburse_payout(&self, request: GatewayPayoutRequest) -> Result<GatewayReceipt, GatewayError>;

    /// The final outcome of the refund the gateway accepted as `reference`, or `None` while it is still in progress.
    async fn refund_outcome(&self, reference: &str) -> Result<Option<GatewayOutcome>, GatewayError>;

    /// The final outcome of the payout the gateway accepted as `reference`, or `None` while it is still in progress.
    async fn payout_outcome(&self, reference: &str) -> Result<Option<GatewayOutcome>, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefundRequest {
    pub idempotency_token: String,
    pub refund_id: i64,
    pub order_item_id: i64,
    pub amount: Paise,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayoutRequest {
    pub idempotency_token: String,
    pub payout_id: i64,
    pub seller_id: SellerId,
    pub amount: Paise,
}

/// Acknowledgement that the gateway accepted a request. `reference` is what it will report outcomes against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    pub reference: String,
}

impl GatewayReceipt {
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self { reference: reference.into() }
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The gateway refused the request: {0}")]
    Rejected(String),
    #[error("The gateway is unavailable: {0}")]
    Unavailable(String),
}
