//! Hosted-checkout payment provider integration.
//!
//! The provider is an external collaborator: we create a hosted session with
//! the order id embedded in its metadata, the shopper pays on the provider's
//! page, and the provider reports back through webhook events
//! ([`events::ProviderEvent`]). Correlation always runs through that order
//! id, regardless of event ordering or duplication.

pub mod events;

use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Line item forwarded to the hosted payment page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
    pub shipping_amount: i64,
    pub success_url: String,
    pub cancel_url: String,
    /// Carried verbatim on every event the provider emits for this session.
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSession {
    pub session_id: String,
    pub redirect_url: String,
}

/// External payment provider. Session creation failures must leave the
/// already-persisted pending order untouched, so implementations only talk
/// to the provider and never to storage.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError>;
}

/// reqwest-backed gateway client for the provider's session API.
#[derive(Clone)]
pub struct HostedCheckoutGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionApiResponse {
    id: String,
    url: String,
}

impl HostedCheckoutGateway {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let url = format!("{}/v1/checkout/sessions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayUnavailable(format!(
                "session creation returned {status}: {body}"
            )));
        }

        let session: SessionApiResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("malformed session response: {e}")))?;

        info!(session_id = %session.id, "payment session created");

        Ok(PaymentSession {
            session_id: session.id,
            redirect_url: session.url,
        })
    }
}
