//! Stripe REST client and webhook signature verification.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::StripeSettings;
use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
const TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;

/// Metadata key linking Stripe objects back to a local user id.
pub const USER_ID_METADATA_KEY: &str = "user_id";

#[derive(Clone, Debug)]
pub struct StripeClient {
    http_client: Client,
    base_url: String,
    secret_key: Secret<String>,
    webhook_secret: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub cancel_at: Option<i64>,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub trial_start: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    pub items: StripeSubscriptionItems,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub price: StripePrice,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

impl StripeSubscription {
    pub fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items.data.first()
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item().map(|item| item.price.id.as_str())
    }

    /// Newer API versions moved the period bounds onto the items.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| self.first_item().and_then(|i| i.current_period_start))
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeBillingPortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionParams<'a> {
    pub customer_id: &'a str,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    error: StripeApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeApiErrorDetail {
    message: String,
}

pub fn timestamp_to_datetime(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

impl StripeClient {
    pub fn new(settings: &StripeSettings) -> Self {
        Self {
            http_client: Client::new(),
            base_url: settings.base_url.clone(),
            secret_key: settings.secret_key.clone(),
            webhook_secret: settings.webhook_secret.clone(),
        }
    }

    #[tracing::instrument(name = "Create Stripe customer", skip(self, email))]
    pub async fn create_customer(&self, email: &str, user_id: &str) -> Result<StripeCustomer, AppError> {
        let form = vec![
            ("email".to_string(), email.to_string()),
            (format!("metadata[{}]", USER_ID_METADATA_KEY), user_id.to_string()),
        ];
        self.post_form("customers", &form).await
    }

    #[tracing::instrument(name = "Create Stripe checkout session", skip(self, params), fields(customer_id = %params.customer_id, price_id = %params.price_id))]
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> Result<StripeCheckoutSession, AppError> {
        let form = checkout_form(params);
        self.post_form("checkout/sessions", &form).await
    }

    #[tracing::instrument(name = "Create Stripe billing portal session", skip(self))]
    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<StripeBillingPortalSession, AppError> {
        let form = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        self.post_form("billing_portal/sessions", &form).await
    }

    /// Checks the `stripe-signature` header against the raw payload and parses
    /// the event.
    pub fn construct_event(&self, payload: &str, signature: &str) -> Result<StripeEvent, AppError> {
        verify_signature(
            payload,
            signature,
            self.webhook_secret.expose_secret(),
            Utc::now().timestamp(),
        )?;
        serde_json::from_str(payload)
            .map_err(|e| AppError::Webhook(format!("Invalid event payload: {}", e)))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(String, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));
            tracing::error!(endpoint = endpoint, status = %status, message = %message, "Stripe API error");
            return Err(AppError::ExternalService(anyhow::anyhow!(
                "Stripe API error: {}",
                message
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            AppError::ExternalService(anyhow::Error::new(e).context("Failed to parse Stripe response"))
        })
    }
}

fn checkout_form(params: &CheckoutSessionParams<'_>) -> Vec<(String, String)> {
    vec![
        ("customer".to_string(), params.customer_id.to_string()),
        ("mode".to_string(), "subscription".to_string()),
        ("line_items[0][price]".to_string(), params.price_id.to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), params.success_url.to_string()),
        ("cancel_url".to_string(), params.cancel_url.to_string()),
        (
            format!("subscription_data[metadata][{}]", USER_ID_METADATA_KEY),
            params.user_id.to_string(),
        ),
    ]
}

/// Verifies a `t=<unix>,v1=<hex>[,v1=<hex>...]` header.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), AppError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| AppError::Webhook("Missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(AppError::Webhook("Missing signature".to_string()));
    }

    let timestamp_secs: i64 = timestamp
        .parse()
        .map_err(|_| AppError::Webhook("Invalid timestamp".to_string()))?;

    let signed_payload = format!("{}.{}", timestamp, payload);
    let matched = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(signed_payload.as_bytes());
        mac.verify_slice(&expected).is_ok()
    });

    if !matched {
        return Err(AppError::Webhook(
            "No signatures found matching the expected signature for payload".to_string(),
        ));
    }

    if (now - timestamp_secs).abs() > TIMESTAMP_TOLERANCE_SECONDS {
        return Err(AppError::Webhook("Timestamp outside the tolerance zone".to_string()));
    }

    Ok(())
}

/// Produces a header value the way Stripe signs webhooks.
#[cfg(test)]
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_test_secret";

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::new(&StripeSettings {
            base_url: server.uri(),
            secret_key: Secret::new("sk_test_123".into()),
            webhook_secret: Secret::new(SECRET.into()),
            founder_price_id: "price_founder".into(),
            pro_price_id: "price_pro".into(),
        })
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = r#"{"id":"evt_1","type":"customer.created","data":{"object":{}}}"#;
        let header = sign_payload(payload, SECRET, 1_700_000_000);
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn any_matching_v1_entry_is_enough() {
        let payload = "{}";
        let good = sign_payload(payload, SECRET, 1_700_000_000);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), good_sig);
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = sign_payload(r#"{"amount":1}"#, SECRET, 1_700_000_000);
        let err = verify_signature(r#"{"amount":2}"#, &header, SECRET, 1_700_000_000).unwrap_err();
        assert!(matches!(err, AppError::Webhook(_)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = sign_payload("{}", "whsec_other", 1_700_000_000);
        assert!(verify_signature("{}", &header, SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign_payload("{}", SECRET, 1_700_000_000);
        let err = verify_signature("{}", &header, SECRET, 1_700_000_301).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(verify_signature("{}", "v1=abcd", SECRET, 0).is_err());
        assert!(verify_signature("{}", "t=1700000000", SECRET, 1_700_000_000).is_err());
        assert!(verify_signature("{}", "t=soon,v1=abcd", SECRET, 0).is_err());
        assert!(verify_signature("{}", "garbage", SECRET, 0).is_err());
    }

    #[test]
    fn checkout_form_uses_bracketed_keys() {
        let form = checkout_form(&CheckoutSessionParams {
            customer_id: "cus_1",
            price_id: "price_pro",
            success_url: "https://app.test/dashboard?success=true",
            cancel_url: "https://app.test/plans?canceled=true",
            user_id: "user-1",
        });
        let lookup: HashMap<_, _> = form.into_iter().collect();
        assert_eq!(lookup["mode"], "subscription");
        assert_eq!(lookup["line_items[0][price]"], "price_pro");
        assert_eq!(lookup["line_items[0][quantity]"], "1");
        assert_eq!(lookup["subscription_data[metadata][user_id]"], "user-1");
    }

    #[test]
    fn subscription_period_falls_back_to_item() {
        let sub: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "cancel_at_period_end": false,
            "items": {"data": [{
                "price": {"id": "price_pro"},
                "quantity": 1,
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000
            }]}
        }))
        .unwrap();

        assert_eq!(sub.price_id(), Some("price_pro"));
        assert_eq!(sub.period_start(), Some(1_700_000_000));
        assert_eq!(sub.period_end(), Some(1_702_592_000));
        assert_eq!(
            timestamp_to_datetime(sub.period_end()).unwrap().to_rfc3339(),
            "2023-12-14T22:13:20+00:00"
        );
    }

    #[tokio::test]
    async fn create_customer_posts_form_with_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/customers"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("metadata%5Buser_id%5D=user-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cus_123",
                "email": "a@b.test",
                "metadata": {"user_id": "user-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let customer = client(&server).create_customer("a@b.test", "user-1").await.unwrap();
        assert_eq!(customer.id, "cus_123");
    }

    #[tokio::test]
    async fn api_errors_carry_stripe_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/billing_portal/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "No such customer: 'cus_missing'"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_portal_session("cus_missing", "https://app.test/dashboard")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
        assert!(err.to_string().contains("No such customer"));
    }

    #[tokio::test]
    async fn construct_event_parses_signed_payload() {
        let server = MockServer::start().await;
        let payload = json!({
            "id": "evt_1",
            "type": "customer.subscription.deleted",
            "data": {"object": {"id": "sub_1"}}
        })
        .to_string();
        let header = sign_payload(&payload, SECRET, Utc::now().timestamp());

        let event = client(&server).construct_event(&payload, &header).unwrap();
        assert_eq!(event.event_type, "customer.subscription.deleted");
        assert_eq!(event.data.object["id"], "sub_1");
    }
}
