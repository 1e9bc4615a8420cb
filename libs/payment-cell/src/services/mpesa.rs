// libs/payment-cell/src/services/mpesa.rs
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{CheckoutResult, PaymentError, StkPushAccepted};

/// The external collaborator that moves money. Implemented by the M-Pesa
/// Daraja client; tests substitute their own.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts an STK push prompt on the customer's phone.
    async fn initiate_stk_push(
        &self,
        phone: &str,
        amount: i64,
        reference: &str,
        description: &str,
    ) -> Result<StkPushAccepted, PaymentError>;

    /// `None` while the customer has not answered the prompt yet.
    async fn query_checkout(&self, checkout_request_id: &str) -> Result<Option<CheckoutResult>, PaymentError>;
}

/// Stands in when Daraja credentials are absent; every call is refused so
/// payments fail cleanly instead of the server refusing to start.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn initiate_stk_push(
        &self,
        _phone: &str,
        _amount: i64,
        _reference: &str,
        _description: &str,
    ) -> Result<StkPushAccepted, PaymentError> {
        Err(PaymentError::GatewayNotConfigured)
    }

    async fn query_checkout(&self, _checkout_request_id: &str) -> Result<Option<CheckoutResult>, PaymentError> {
        Err(PaymentError::GatewayNotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct OAuthResponse {
    access_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    response_description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkQueryResponse {
    result_code: Option<String>,
    result_desc: Option<String>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Daraja API client (OAuth, STK push, STK query).
pub struct MpesaClient {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    callback_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl MpesaClient {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_mpesa_configured() {
            return Err(PaymentError::GatewayNotConfigured);
        }

        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.mpesa_base_url.trim_end_matches('/').to_string(),
            consumer_key: config.mpesa_consumer_key.clone(),
            consumer_secret: config.mpesa_consumer_secret.clone(),
            shortcode: config.mpesa_shortcode.clone(),
            passkey: config.mpesa_passkey.clone(),
            callback_url: config.mpesa_callback_url.clone(),
            token: Mutex::new(None),
        })
    }

    /// Daraja expects East Africa Time, `YYYYMMDDHHmmss`.
    fn timestamp(now: DateTime<Utc>) -> String {
        match FixedOffset::east_opt(3 * 3600) {
            Some(eat) => now.with_timezone(&eat).format("%Y%m%d%H%M%S").to_string(),
            None => now.format("%Y%m%d%H%M%S").to_string(),
        }
    }

    fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!("{}{}{}", self.shortcode, self.passkey, timestamp))
    }

    async fn access_token(&self) -> Result<String, PaymentError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.token.clone());
            }
        }

        let url = format!("{}/oauth/v1/generate?grant_type=client_credentials", self.base_url);
        debug!("Requesting M-Pesa access token");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            error!("M-Pesa OAuth failed: {} - {}", status, text);
            return Err(PaymentError::Gateway(format!("OAuth HTTP {}", status)));
        }

        let body: OAuthResponse = response.json().await?;
        let lifetime = body.expires_in.parse::<i64>().unwrap_or(3599);
        // Renew a minute early.
        *cached = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime - 60),
        });

        Ok(body.access_token)
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    async fn initiate_stk_push(
        &self,
        phone: &str,
        amount: i64,
        reference: &str,
        description: &str,
    ) -> Result<StkPushAccepted, PaymentError> {
        let token = self.access_token().await?;
        let timestamp = Self::timestamp(Utc::now());
        // AccountReference is capped at 12 characters.
        let reference: String = reference.chars().take(12).collect();

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.base_url);
        info!("Initiating STK push of KES {} to {}", amount, phone);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "BusinessShortCode": self.shortcode,
                "Password": self.password(&timestamp),
                "Timestamp": timestamp,
                "TransactionType": "CustomerPayBillOnline",
                "Amount": amount,
                "PartyA": phone,
                "PartyB": self.shortcode,
                "PhoneNumber": phone,
                "CallBackURL": self.callback_url,
                "AccountReference": reference,
                "TransactionDesc": description,
            }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("STK push failed: {} - {}", status, text);
            return Err(PaymentError::Gateway(format!("STK push HTTP {}: {}", status, text)));
        }

        let body: StkPushResponse = serde_json::from_str(&text)
            .map_err(|e| PaymentError::Gateway(format!("Unreadable STK push response: {}", e)))?;
        if body.response_code != "0" {
            warn!("STK push rejected: {}", body.response_description);
            return Err(PaymentError::Gateway(body.response_description));
        }

        Ok(StkPushAccepted {
            checkout_request_id: body.checkout_request_id,
            merchant_request_id: body.merchant_request_id,
        })
    }

    async fn query_checkout(&self, checkout_request_id: &str) -> Result<Option<CheckoutResult>, PaymentError> {
        let token = self.access_token().await?;
        let timestamp = Self::timestamp(Utc::now());

        let url = format!("{}/mpesa/stkpushquery/v1/query", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "BusinessShortCode": self.shortcode,
                "Password": self.password(&timestamp),
                "Timestamp": timestamp,
                "CheckoutRequestID": checkout_request_id,
            }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            // Daraja answers with an error while the prompt is still open.
            debug!("STK query for {} not final: {} - {}", checkout_request_id, status, text);
            return Ok(None);
        }

        let body: StkQueryResponse = serde_json::from_str(&text)
            .map_err(|e| PaymentError::Gateway(format!("Unreadable STK query response: {}", e)))?;

        let result_code = match body.result_code.as_deref().map(str::parse::<i64>) {
            Some(Ok(code)) => code,
            _ => return Ok(None),
        };

        Ok(Some(CheckoutResult {
            checkout_request_id: checkout_request_id.to_string(),
            result_code,
            result_desc: body.result_desc.unwrap_or_default(),
            transaction_id: None,
        }))
    }
}
