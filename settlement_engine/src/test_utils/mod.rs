//! Helpers for tests that need a real database and a payment gateway.
pub mod mock_gateway;
pub mod prepare_env;
