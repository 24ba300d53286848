use thiserror::Error;

use crate::traits::{
    FulfillmentManagement,
    GatewayError,
    LedgerManagement,
    PayoutManagement,
    RefundManagement,
    ReturnManagement,
};

/// This trait defines the highest level of behaviour for backends supporting the settlement engine.
///
/// Every method on the component traits that changes state must run as a single atomic unit: either every row it
/// touches is written, or none is.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase:
    Clone + FulfillmentManagement + ReturnManagement + RefundManagement + LedgerManagement + PayoutManagement
{
    /// The URL of the database
    fn url(&self) -> &str;
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Cannot move {entity} from {from} to {to}.")]
    InvalidTransition { entity: String, from: String, to: String },
    #[error("{0} was changed by someone else in the meantime.")]
    Conflict(String),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("Ledger invariant violated. {0}")]
    LedgerCorruption(String),
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("Payment gateway error. {0}")]
    GatewayError(String),
}

impl SettlementError {
    pub fn invalid_transition<E, F, T>(entity: E, from: F, to: T) -> Self
    where
        E: ToString,
        F: ToString,
        T: ToString,
    {
        Self::InvalidTransition { entity: entity.to_string(), from: from.to_string(), to: to.to_string() }
    }

    /// Only optimistic concurrency failures are worth retrying with fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// The explanation shown to a buyer, seller or admin. Internal details are never included.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidTransition { to, .. } => format!("This action ({to}) is not available at the moment."),
            Self::Conflict(_) => "This record was updated while you were working on it. Please refresh and try again."
                .to_string(),
            Self::ValidationError(msg) => msg.clone(),
            Self::NotFound(what) => format!("{what} could not be found."),
            Self::GatewayError(_) => "The payment provider could not be reached. We will retry automatically.".into(),
            Self::LedgerCorruption(_) | Self::DatabaseError(_) => {
                "Something went wrong on our side. Our team has been notified.".to_string()
            },
        }
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                SettlementError::Conflict(format!("A concurrent write created the same record ({db})"))
            },
            e => SettlementError::DatabaseError(e.to_string()),
        }
    }
}

impl From<GatewayError> for SettlementError {
    fn from(e: GatewayError) -> Self {
        SettlementError::GatewayError(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn user_messages_hide_internals() {
        let err = SettlementError::LedgerCorruption("seller s1: available 10 + pending 0 != 0".into());
        assert!(!err.user_message().contains("available"));
        assert!(!err.is_retryable());
        let err = SettlementError::Conflict("order item #3".into());
        assert!(err.user_message().contains("refresh"));
        assert!(err.is_retryable());
        let err = SettlementError::invalid_transition("order item #3", "pending", "delivered");
        assert_eq!(err.to_string(), "Cannot move order item #3 from pending to delivered.");
    }
}
