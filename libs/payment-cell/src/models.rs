// =====================================================================================
// PAYMENT MODELS
// =====================================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::ServiceType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    ServiceAccess,
    CallRecharge,
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentType::ServiceAccess => write!(f, "service_access"),
            PaymentType::CallRecharge => write!(f, "call_recharge"),
        }
    }
}

/// `pending` moves once, to `completed` or `failed`, and never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub payment_type: PaymentType,
    pub patient_session_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub service_type: Option<ServiceType>,
    pub package_id: Option<String>,
    pub additional_minutes: Option<i32>,
    pub amount: i64,
    pub phone_number: String,
    pub status: PaymentStatus,
    pub idempotency_key: String,
    pub mpesa_checkout_request_id: Option<String>,
    /// Set just before the STK push is sent.
    #[serde(default)]
    pub push_requested_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub grant_applied: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub payment_type: PaymentType,
    /// Service tier, for `service_access`.
    pub service_type: Option<String>,
    /// Recharge package, for `call_recharge`.
    pub package_id: Option<String>,
    pub consultation_id: Option<Uuid>,
    pub phone_number: String,
    pub idempotency_key: String,
}

/// What the caller is paying for, after price lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Purchase {
    ServiceAccess {
        service_type: ServiceType,
        amount: i64,
    },
    CallRecharge {
        consultation_id: Uuid,
        package_id: String,
        minutes: i32,
        amount: i64,
    },
}

impl Purchase {
    pub fn amount(&self) -> i64 {
        match self {
            Purchase::ServiceAccess { amount, .. } | Purchase::CallRecharge { amount, .. } => *amount,
        }
    }

    pub fn payment_type(&self) -> PaymentType {
        match self {
            Purchase::ServiceAccess { .. } => PaymentType::ServiceAccess,
            Purchase::CallRecharge { .. } => PaymentType::CallRecharge,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Purchase::ServiceAccess { service_type, .. } => format!("{} consultation access", service_type),
            Purchase::CallRecharge { minutes, .. } => format!("{} call minutes", minutes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateOutcome {
    pub payment: Payment,
    pub created: bool,
}

// ==============================================================================
// GATEWAY
// ==============================================================================

/// Accepted STK push.
#[derive(Debug, Clone, PartialEq)]
pub struct StkPushAccepted {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
}

/// Final result of a checkout, as reported by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutResult {
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub transaction_id: Option<String>,
}

impl CheckoutResult {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

/// M-Pesa STK callback envelope: `{"Body":{"stkCallback":{...}}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<Value>,
}

impl From<StkCallback> for CheckoutResult {
    fn from(callback: StkCallback) -> Self {
        let transaction_id = callback
            .callback_metadata
            .as_ref()
            .and_then(|meta| meta.items.iter().find(|item| item.name == "MpesaReceiptNumber"))
            .and_then(|item| item.value.as_ref())
            .and_then(|value| value.as_str().map(str::to_string));

        Self {
            checkout_request_id: callback.checkout_request_id,
            result_code: callback.result_code,
            result_desc: callback.result_desc,
            transaction_id,
        }
    }
}

/// Acknowledgement returned to the gateway for every callback.
pub fn callback_ack() -> Value {
    serde_json::json!({ "ResultCode": 0, "ResultDesc": "Accepted" })
}

// ==============================================================================
// OUTCOMES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    UnknownCheckout,
    AlreadyProcessed,
    Completed,
    Failed,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconciliationReport {
    pub examined: usize,
    pub completed: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    pub still_pending: usize,
    /// Pushed but without a checkout id; left pending for manual matching.
    pub unresolved: Vec<Uuid>,
    pub grants_repaired: Vec<Uuid>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),

    #[error("Consultation is not open for recharge")]
    ConsultationNotRechargeable,

    #[error("Payment not found")]
    NotFound,

    #[error("Idempotency key already used by another session")]
    KeyReused,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway is not configured")]
    GatewayNotConfigured,

    #[error("Patient session is not active")]
    SessionInactive,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Gateway(err.to_string())
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(_) | PaymentError::ConsultationNotRechargeable => {
                AppError::Validation(err.to_string())
            }
            PaymentError::NotFound => AppError::NotFound(err.to_string()),
            PaymentError::KeyReused => AppError::Conflict(err.to_string()),
            PaymentError::Gateway(_) | PaymentError::GatewayNotConfigured => AppError::Upstream(err.to_string()),
            PaymentError::SessionInactive => AppError::Unauthorized(err.to_string()),
            PaymentError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn callback_extracts_receipt_number() {
        let envelope: StkCallbackEnvelope = serde_json::from_value(json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": { "Item": [
                    { "Name": "Amount", "Value": 500 },
                    { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                    { "Name": "Balance" }
                ]}
            }}
        }))
        .unwrap();

        let result = CheckoutResult::from(envelope.body.stk_callback);
        assert!(result.is_success());
        assert_eq!(result.transaction_id.as_deref(), Some("NLJ7RT61SV"));
    }

    #[test]
    fn cancelled_callback_has_no_metadata() {
        let envelope: StkCallbackEnvelope = serde_json::from_value(json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }}
        }))
        .unwrap();

        let result = CheckoutResult::from(envelope.body.stk_callback);
        assert!(!result.is_success());
        assert_eq!(result.transaction_id, None);
    }
}
