//! Outbound order notifications.
//!
//! The notifier is a fire-and-forget collaborator: reconciliation and
//! fulfillment publish events, the event loop calls the notifier, and a
//! delivery failure is logged without ever touching order state. The HTTP
//! implementation posts signed JSON events to a configured endpoint with a
//! bounded retry.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("delivery failed after {attempts} attempts: {last_error}")]
    Delivery { attempts: u32, last_error: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_order_paid(&self, order_id: Uuid) -> Result<(), NotificationError>;
    async fn notify_order_shipped(
        &self,
        order_id: Uuid,
        tracking_number: Option<&str>,
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NotificationEvent {
    OrderPaid {
        order_id: Uuid,
    },
    OrderShipped {
        order_id: Uuid,
        tracking_number: Option<String>,
    },
}

/// HMAC signer for outbound notification payloads.
struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Posts notification events to a webhook endpoint (the mail/ops relay).
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    signature_generator: Option<SignatureGenerator>,
    max_retries: u32,
}

impl HttpNotifier {
    pub fn new(endpoint: String, secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
            endpoint,
            signature_generator: secret.map(|secret| SignatureGenerator { secret }),
            max_retries: 3,
        }
    }

    async fn deliver(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        let body = serde_json::to_string(&event)?;
        let timestamp = chrono::Utc::now().to_rfc3339();
        let signature = self
            .signature_generator
            .as_ref()
            .map(|gen| gen.sign_payload(&timestamp, &body));

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            let mut request = self
                .client
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .header("Timestamp", &timestamp)
                .body(body.clone());
            if let Some(ref sig) = signature {
                request = request.header("Storefront-Signature", sig);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!(endpoint = %self.endpoint, "notification delivered");
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("status {}", response.status());
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        max_retries = self.max_retries,
                        status = %response.status(),
                        "notification delivery rejected"
                    );
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "notification delivery error"
                    );
                }
            }

            if attempt < self.max_retries {
                let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(NotificationError::Delivery {
            attempts: self.max_retries,
            last_error,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_order_paid(&self, order_id: Uuid) -> Result<(), NotificationError> {
        self.deliver(NotificationEvent::OrderPaid { order_id }).await
    }

    async fn notify_order_shipped(
        &self,
        order_id: Uuid,
        tracking_number: Option<&str>,
    ) -> Result<(), NotificationError> {
        self.deliver(NotificationEvent::OrderShipped {
            order_id,
            tracking_number: tracking_number.map(str::to_string),
        })
        .await
    }
}

/// Used when no notification endpoint is configured.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_order_paid(&self, order_id: Uuid) -> Result<(), NotificationError> {
        info!(order_id = %order_id, "order paid (notifications disabled)");
        Ok(())
    }

    async fn notify_order_shipped(
        &self,
        order_id: Uuid,
        _tracking_number: Option<&str>,
    ) -> Result<(), NotificationError> {
        info!(order_id = %order_id, "order shipped (notifications disabled)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_event_serialization() {
        let event = NotificationEvent::OrderPaid {
            order_id: Uuid::nil(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("order_paid"));

        let event = NotificationEvent::OrderShipped {
            order_id: Uuid::nil(),
            tracking_number: Some("TRK-1".into()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("order_shipped"));
        assert!(json.contains("TRK-1"));
    }

    #[test]
    fn signature_is_hex_sha256() {
        let generator = SignatureGenerator {
            secret: "test_secret".to_string(),
        };
        let sig = generator.sign_payload("2025-01-01T00:00:00Z", r#"{"type":"order_paid"}"#);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
