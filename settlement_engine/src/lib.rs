//! Marketplace settlement engine
//!
//! The settlement engine follows an order item from placement to the moment its seller is paid for it, and keeps an
//! exact account of what every seller is owed along the way. It is storage-agnostic: the public APIs are generic
//! over the backend traits, and SQLite is the backend that ships with the crate.
//!
//! The library is divided into these sections:
//! 1. The entity types ([`db_types`]), with the transition table of every state machine. Status values are closed
//!    enums; an edge that is not in a table is refused.
//! 2. Pure money rules: the ledger arithmetic ([`ledger`]), payout totals ([`payout_batch`]) and the settlement hold
//!    and fee allocation policies ([`config`]). None of these do I/O.
//! 3. Storage backend contracts ([`traits`]) and the SQLite implementation ([`SqliteDatabase`]). Every state change,
//!    with all of its ledger side effects, commits as one transaction or not at all.
//! 4. The public API ([`mod@settlement_api`]): order flow, return flow, refunds, ledger queries and payouts.
//!
//! The engine also publishes events after state changes commit (an item changed status, a quality check completed, a
//! refund moved on, a payout changed status). Notification services subscribe to them through [`events`]; nothing
//! they do can undo the change that produced the event.
pub mod config;
pub mod db_types;
pub mod events;
pub mod ledger;
pub mod payout_batch;
pub mod settlement_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::{HoldPolicy, SettlementConfig};
pub use settlement_api::{
    ledger_api::LedgerApi,
    order_flow_api::OrderFlowApi,
    payout_api::{PayoutApi, GATEWAY_PAYMENT_METHOD},
    refund_api::RefundApi,
    return_flow_api::ReturnFlowApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    InsertRefundResult,
    PaymentGateway,
    PayoutGenerationResult,
    SettlementDatabase,
    SettlementError,
};
