use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    db_types::GatewayOutcome,
    traits::{GatewayError, GatewayPayoutRequest, GatewayReceipt, GatewayRefundRequest, PaymentGateway},
};

/// An in-memory payment gateway. It accepts everything unless told to be unavailable or to refuse, and honours
/// idempotency tokens: a repeated token gets the first reference back and is not counted as a new transfer.
///
/// Accepted requests stay in progress until a test settles them with [`MockGateway::settle`].
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockGatewayState>>,
}

#[derive(Default)]
struct MockGatewayState {
    offline: bool,
    refusal: Option<String>,
    references: HashMap<String, String>,
    outcomes: HashMap<String, GatewayOutcome>,
    refunds: Vec<GatewayRefundRequest>,
    payouts: Vec<GatewayPayoutRequest>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every request fails with [`GatewayError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().expect("poisoned").offline = offline;
    }

    /// While a refusal reason is set, every new request fails with [`GatewayError::Rejected`].
    pub fn set_refusing(&self, reason: Option<&str>) {
        self.state.lock().expect("poisoned").refusal = reason.map(String::from);
    }

    /// Records the final outcome of the request the gateway knows as `reference`.
    pub fn settle(&self, reference: &str, outcome: GatewayOutcome) {
        self.state.lock().expect("poisoned").outcomes.insert(reference.to_string(), outcome);
    }

    /// The distinct refund requests the gateway accepted.
    pub fn refunds(&self) -> Vec<GatewayRefundRequest> {
        self.state.lock().expect("poisoned").refunds.clone()
    }

    /// The distinct payout requests the gateway accepted.
    pub fn payouts(&self) -> Vec<GatewayPayoutRequest> {
        self.state.lock().expect("poisoned").payouts.clone()
    }

    fn accept(&self, token: &str, prefix: &str, id: i64) -> Result<(GatewayReceipt, bool), GatewayError> {
        let mut state = self.state.lock().expect("poisoned");
        if state.offline {
            return Err(GatewayError::Unavailable("mock gateway is offline".into()));
        }
        if let Some(reference) = state.references.get(token) {
            return Ok((GatewayReceipt::new(reference.clone()), false));
        }
        if let Some(reason) = &state.refusal {
            return Err(GatewayError::Rejected(reason.clone()));
        }
        let reference = format!("{prefix}-{id}");
        state.references.insert(token.to_string(), reference.clone());
        Ok((GatewayReceipt::new(reference), true))
    }

    fn outcome(&self, reference: &str) -> Result<Option<GatewayOutcome>, GatewayError> {
        let state = self.state.lock().expect("poisoned");
        if state.offline {
            return Err(GatewayError::Unavailable("mock gateway is offline".into()));
        }
        if !state.references.values().any(|r| r == reference) {
            return Err(GatewayError::Rejected(format!("unknown reference {reference}")));
        }
        Ok(state.outcomes.get(reference).cloned())
    }
}

impl PaymentGateway for MockGateway {
    async fn issue_refund(&self, request: GatewayRefundRequest) -> Result<GatewayReceipt, GatewayError> {
        let (receipt, is_new) = self.accept(&request.idempotency_token, "gw-refund", request.refund_id)?;
        if is_new {
            self.state.lock().expect("poisoned").refunds.push(request);
        }
        Ok(receipt)
    }

    async fn disburse_payout(&self, request: GatewayPayoutRequest) -> Result<GatewayReceipt, GatewayError> {
        let (receipt, is_new) = self.accept(&request.idempotency_token, "gw-payout", request.payout_id)?;
        if is_new {
            self.state.lock().expect("poisoned").payouts.push(request);
        }
        Ok(receipt)
    }

    async fn refund_outcome(&self, reference: &str) -> Result<Option<GatewayOutcome>, GatewayError> {
        self.outcome(reference)
    }

    async fn payout_outcome(&self, reference: &str) -> Result<Option<GatewayOutcome>, GatewayError> {
        self.outcome(reference)
    }
}
