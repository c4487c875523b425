use crate::error::{AppError, AppResult};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// `data.object` of `checkout.session.completed`.
#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub subscription: Option<String>,
    pub customer: Option<String>,
}

/// `data.object` of `customer.subscription.*`.
#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| AppError::ValidationError(format!("Malformed webhook payload: {e}")))
    }

    pub fn object<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            AppError::ValidationError(format!(
                "Unexpected object for {}: {e}",
                self.event_type
            ))
        })
    }
}

/// Checks the `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`,
/// where each `v1` is HMAC-SHA256 of `"<t>.<payload>"` keyed by the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> AppResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<Vec<u8>> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = v.parse().ok(),
                Some(("v1", v)) => {
                    if let Ok(bytes) = hex::decode(v) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::ValidationError("Signature timestamp missing".into()))?;
        if signatures.is_empty() {
            return Err(AppError::ValidationError("No v1 signature present".into()));
        }
        if (now - timestamp).abs() > self.tolerance_secs {
            return Err(AppError::ValidationError(
                "Signature timestamp outside tolerance".into(),
            ));
        }

        let matched = signatures.iter().any(|candidate| {
            let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
                return false;
            };
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.verify_slice(candidate).is_ok()
        });

        if matched {
            Ok(())
        } else {
            Err(AppError::ValidationError("Signature mismatch".into()))
        }
    }
}

#[cfg(test)]
pub(crate) fn sign_for_test(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
