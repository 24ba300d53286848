//! A [`PaymentGateway`] that talks to the payment provider's REST API.
//!
//! Refunds are posted to `/refunds` and payouts to `/payouts`, each with the engine's idempotency token in the
//! `Idempotency-Key` header, so the provider can recognise a request the worker sends twice. Their progress is read
//! back from `/refunds/{reference}` and `/payouts/{reference}`.
use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use settlement_engine::{
    db_types::GatewayOutcome,
    traits::{
        GatewayError,
        GatewayPayoutRequest,
        GatewayReceipt,
        GatewayRefundRequest,
        PaymentGateway,
    },
};

use crate::{config::GatewayConfig, errors::WorkerError};

#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    client: Arc<Client>,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, WorkerError> {
        let mut headers = HeaderMap::with_capacity(2);
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| WorkerError::InitializeError(format!("Invalid gateway API key. {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| WorkerError::InitializeError(e.to_string()))?;
        let base_url = config.url.trim_end_matches('/').to_string();
        Ok(Self { base_url, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        idempotency_token: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        trace!("💳️ POST {url} [{idempotency_token}]");
        let response = self
            .client
            .post(url)
            .header("Idempotency-Key", idempotency_token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        read_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = self.url(path);
        trace!("💳️ GET {url}");
        let response = self.client.get(url).send().await.map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        read_response(response).await
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        response.json::<T>().await.map_err(|e| GatewayError::Unavailable(format!("Unreadable response. {e}")))
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(classify_failure(status, message))
    }
}

/// The provider's view of a refund or payout it accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    Processing,
    Completed { reference: Option<String> },
    Failed { reason: Option<String> },
}

impl TransferStatus {
    /// `None` while the transfer is still in progress.
    pub fn into_outcome(self) -> Option<GatewayOutcome> {
        match self {
            TransferStatus::Processing => None,
            TransferStatus::Completed { reference } => Some(GatewayOutcome::Completed { reference }),
            TransferStatus::Failed { reason } => {
                Some(GatewayOutcome::Failed { reason: reason.unwrap_or_else(|| "No reason given".into()) })
            },
        }
    }
}

/// Client errors are final. Anything else is worth trying again later.
pub fn classify_failure(status: StatusCode, message: String) -> GatewayError {
    let message = format!("{status}. {message}");
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Rejected(message)
    } else {
        GatewayError::Unavailable(message)
    }
}

impl PaymentGateway for HttpGateway {
    async fn issue_refund(&self, request: GatewayRefundRequest) -> Result<GatewayReceipt, GatewayError> {
        debug!("💳️ Sending refund #{} of {} to the gateway", request.refund_id, request.amount);
        let receipt = self.post::<GatewayReceipt, _>("/refunds", &request.idempotency_token, &request).await?;
        info!("💳️ Gateway accepted refund #{} as {}", request.refund_id, receipt.reference);
        Ok(receipt)
    }

    async fn disburse_payout(&self, request: GatewayPayoutRequest) -> Result<GatewayReceipt, GatewayError> {
        debug!("💳️ Sending payout #{} of {} to {}", request.payout_id, request.amount, request.seller_id);
        let receipt = self.post::<GatewayReceipt, _>("/payouts", &request.idempotency_token, &request).await?;
        info!("💳️ Gateway accepted payout #{} as {}", request.payout_id, receipt.reference);
        Ok(receipt)
    }

    async fn refund_outcome(&self, reference: &str) -> Result<Option<GatewayOutcome>, GatewayError> {
        let status = self.get::<TransferStatus>(&format!("/refunds/{reference}")).await?;
        trace!("💳️ Refund {reference} is {status:?}");
        Ok(status.into_outcome())
    }

    async fn payout_outcome(&self, reference: &str) -> Result<Option<GatewayOutcome>, GatewayError> {
        let status = self.get::<TransferStatus>(&format!("/payouts/{reference}")).await?;
        trace!("💳️ Payout {reference} is {status:?}");
        Ok(status.into_outcome())
    }
}

#[cfg(test)]
mod test {
    use settlement_common::Secret;

    use super::*;

    #[test]
    fn failures_are_classified() {
        assert!(matches!(classify_failure(StatusCode::BAD_REQUEST, "bad".into()), GatewayError::Rejected(_)));
        assert!(matches!(classify_failure(StatusCode::UNPROCESSABLE_ENTITY, "".into()), GatewayError::Rejected(_)));
        assert!(matches!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "".into()), GatewayError::Unavailable(_)));
        assert!(matches!(classify_failure(StatusCode::BAD_GATEWAY, "".into()), GatewayError::Unavailable(_)));
    }

    #[test]
    fn transfer_statuses_become_outcomes() {
        let parse = |json: &str| serde_json::from_str::<TransferStatus>(json).unwrap().into_outcome();
        assert_eq!(parse(r#"{"status":"processing"}"#), None);
        assert_eq!(
            parse(r#"{"status":"completed","reference":"UTR-42"}"#),
            Some(GatewayOutcome::Completed { reference: Some("UTR-42".into()) })
        );
        assert_eq!(parse(r#"{"status":"completed"}"#), Some(GatewayOutcome::Completed { reference: None }));
        assert_eq!(
            parse(r#"{"status":"failed","reason":"account closed"}"#),
            Some(GatewayOutcome::Failed { reason: "account closed".into() })
        );
        assert!(serde_json::from_str::<TransferStatus>(r#"{"status":"lost"}"#).is_err());
    }

    #[test]
    fn urls_ignore_trailing_slashes() {
        let config = GatewayConfig { url: "https://pay.example.com/v1/".into(), api_key: Secret::new("k".into()) };
        let gateway = HttpGateway::new(&config).unwrap();
        assert_eq!(gateway.url("/refunds"), "https://pay.example.com/v1/refunds");
    }

    #[tokio::test]
    async fn unreachable_gateway_is_unavailable() {
        let config = GatewayConfig { url: "http://127.0.0.1:9".into(), api_key: Secret::new("k".into()) };
        let gateway = HttpGateway::new(&config).unwrap();
        let request = GatewayRefundRequest {
            idempotency_token: "refund:item:1:cancellation".into(),
            refund_id: 1,
            order_item_id: 1,
            amount: settlement_common::Paise::from(100),
            method: "original_payment".into(),
        };
        let err = gateway.issue_refund(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }
}
