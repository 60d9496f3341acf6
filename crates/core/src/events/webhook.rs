//! Webhook event delivery.
//!
//! POSTs each event as a JSON document to a configured endpoint. When a
//! signing secret is set, the request carries an `X-Chronicle-Signature`
//! header holding the hex HMAC-SHA-256 of the request body.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};

use super::{Event, EventPublisher};
use crate::errors::EventError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA-256 signature of the body.
pub const SIGNATURE_HEADER: &str = "X-Chronicle-Signature";

/// Webhook publisher delivering events over HTTP POST.
pub struct WebhookPublisher {
    url: String,
    secret: Option<String>,
    http: reqwest::blocking::Client,
}

impl WebhookPublisher {
    /// Create a publisher targeting the given endpoint.
    pub fn new(url: String, secret: Option<String>, timeout: Duration) -> Result<Self, EventError> {
        info!("initializing webhook publisher");
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EventError::HttpError)?;
        Ok(Self { url, secret, http })
    }

    /// Hex HMAC-SHA-256 of the body, when a secret is configured.
    fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                warn!("failed to create HMAC for webhook signature");
                return None;
            }
        };
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

impl EventPublisher for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    fn publish(&self, event: &Event) -> Result<(), EventError> {
        let body = serde_json::to_vec(event)?;
        debug!(topic = %event.topic, len = body.len(), "sending webhook event");

        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(signature) = self.sign(&body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let resp = request.body(body).send().map_err(EventError::HttpError)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            warn!(status, body = %body, "webhook endpoint returned error");
            return Err(EventError::WebhookRejected { status, body });
        }

        debug!(topic = %event.topic, "webhook event delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_publisher_construction() {
        let publisher = WebhookPublisher::new(
            "https://hooks.example.com/chronicle".into(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(publisher.url, "https://hooks.example.com/chronicle");
        assert!(publisher.secret.is_none());
    }

    #[test]
    fn test_signature_is_stable_hex() {
        let publisher = WebhookPublisher::new(
            "https://hooks.example.com/chronicle".into(),
            Some("my-secret".into()),
            Duration::from_secs(5),
        )
        .unwrap();

        let first = publisher.sign(b"payload").unwrap();
        let second = publisher.sign(b"payload").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

        // A different body produces a different signature.
        assert_ne!(publisher.sign(b"other").unwrap(), first);
    }

    #[test]
    fn test_no_signature_without_secret() {
        let publisher = WebhookPublisher::new(
            "https://hooks.example.com/chronicle".into(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(publisher.sign(b"payload").is_none());
    }
}
