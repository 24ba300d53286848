//! # Settlement worker
//! The long-running half of the settlement engine. It is responsible for:
//! * Running the payout batch on a timer. Generation is idempotent per seller and period, so a tick that finds the
//!   month's payout already generated does nothing.
//! * Sweeping refunds that never reached the payment gateway (e.g. because it was down) and sending them again.
//! * Logging seller-facing notifications as refunds and payouts change status.
//!
//! ## Configuration
//! The worker is configured via environment variables. See [config](config/index.html) for more information.
pub mod batch_worker;
pub mod cli;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod notifications;
pub mod worker;
