use crate::{errors::ServiceError, payments::events::ProviderEvent, AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

/// Inbound payment provider events.
///
/// Always answers 200 for events we deliberately drop (unknown kind,
/// unknown order, replayed delivery); a non-2xx response is reserved for
/// malformed or unauthenticated payloads and for transient failures where
/// the provider's retry is wanted.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = state.config.payment.webhook_secret.as_deref() {
        let tolerance = state.config.payment.webhook_tolerance_secs;
        if !verify_signature(&headers, &body, secret, tolerance) {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let event: ProviderEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {e}")))?;

    let outcome = state.services.reconciliation.reconcile(&event).await?;
    if outcome.transitioned {
        info!("webhook performed first transition to paid");
    }

    Ok((StatusCode::OK, "ok"))
}

/// HMAC over `"{timestamp}.{body}"` with `x-timestamp`/`x-signature`
/// headers, rejected outside the configured timestamp tolerance.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, ts: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{ts}.{body}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature_within_tolerance() {
        let body = Bytes::from_static(b"{\"type\":\"payment.succeeded\"}");
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign("secret", &ts, std::str::from_utf8(&body).unwrap());

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());

        assert!(verify_signature(&headers, &body, "secret", 300));
        assert!(!verify_signature(&headers, &body, "other-secret", 300));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = Bytes::from_static(b"{}");
        let ts = (chrono::Utc::now().timestamp() - 3600).to_string();
        let sig = sign("secret", &ts, "{}");

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());

        assert!(!verify_signature(&headers, &body, "secret", 300));
    }

    #[test]
    fn rejects_missing_headers() {
        let body = Bytes::from_static(b"{}");
        assert!(!verify_signature(&HeaderMap::new(), &body, "secret", 300));
    }
}
