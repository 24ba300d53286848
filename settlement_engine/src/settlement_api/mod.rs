//! # Settlement engine public API
//!
//! The `settlement_api` module exposes the programmatic API of the engine. It is split by workflow, so that clients
//! can pick what they need:
//!
//! * [`order_flow_api`] places order items and moves them through fulfillment, cancellation and return requests.
//! * [`return_flow_api`] takes returns through pickup and the quality check.
//! * [`refund_api`] records refunds, dispatches them to the payment gateway and reconciles the outcome.
//! * [`ledger_api`] reads and verifies seller balances and ledgers.
//! * [`payout_api`] generates payouts and runs the approval workflow.
//!
//! # API usage
//!
//! Every API is created from a backend that implements [`crate::traits::SettlementDatabase`]. The ones that move money
//! also take a [`crate::traits::PaymentGateway`], and the ones that change state take the [`crate::events::EventProducers`]
//! that notifications subscribe to.
//!
//! ```rust,ignore
//! use settlement_engine::{events::EventProducers, PayoutApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/settlement.db", 5).await?;
//! let api = PayoutApi::new(db, my_gateway, EventProducers::default());
//! let batch = api.generate_all(PayoutPeriod::containing(Utc::now()), Utc::now()).await?;
//! ```
pub mod ledger_api;
pub mod order_flow_api;
pub mod payout_api;
pub mod refund_api;
pub mod return_flow_api;
