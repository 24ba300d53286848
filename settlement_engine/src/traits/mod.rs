//! # Storage backend contracts
//!
//! The traits in this module define what a database backend must provide to support the settlement engine. The
//! public APIs are generic over these traits and never touch SQL themselves.
//!
//! * [`FulfillmentManagement`] stores order items, their payments and the order state machine side effects.
//! * [`ReturnManagement`] stores returns, their tracking trail and quality checks.
//! * [`RefundManagement`] stores refunds and their reconciliation with the payment gateway.
//! * [`LedgerManagement`] exposes the seller ledger and balance snapshots.
//! * [`PayoutManagement`] generates payouts and drives the approval workflow.
//! * [`SettlementDatabase`] ties these together.
//!
//! [`PaymentGateway`] is the one outbound collaborator: the bank/payment provider that actually moves money.
mod data_objects;
mod fulfillment_management;
mod ledger_management;
mod payment_gateway;
mod payout_management;
mod refund_management;
mod return_management;
mod settlement_database;

pub use data_objects::{
    BatchResult,
    CancellationResult,
    DeliveryResult,
    DispatchResult,
    InsertRefundResult,
    OrderItemChanged,
    PayoutDetail,
    PayoutGenerationResult,
    QualityCheckOutcome,
    ReconciliationResult,
    ReturnChanged,
    ReturnDetail,
    ReturnRequested,
};
pub use fulfillment_management::FulfillmentManagement;
pub use ledger_management::LedgerManagement;
pub use payment_gateway::{GatewayError, GatewayPayoutRequest, GatewayReceipt, GatewayRefundRequest, PaymentGateway};
pub use payout_management::PayoutManagement;
pub use refund_management::RefundManagement;
pub use return_management::ReturnManagement;
pub use settlement_database::{SettlementDatabase, SettlementError};
