// libs/payment-cell/src/services/pricing.rs
use regex::Regex;
use uuid::Uuid;

use shared_models::ServiceType;

use crate::models::{InitiatePaymentRequest, PaymentError, PaymentType, Purchase};

const PHONE_PATTERN: &str = r"^254(7|1)\d{8}$";

pub const MIN_IDEMPOTENCY_KEY_LEN: usize = 8;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 64;

/// A prepaid block of call minutes for an ongoing consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RechargePackage {
    pub id: &'static str,
    pub minutes: i32,
    pub amount: i64,
}

pub const RECHARGE_PACKAGES: [RechargePackage; 3] = [
    RechargePackage {
        id: "minutes_10",
        minutes: 10,
        amount: 200,
    },
    RechargePackage {
        id: "minutes_20",
        minutes: 20,
        amount: 350,
    },
    RechargePackage {
        id: "minutes_30",
        minutes: 30,
        amount: 500,
    },
];

pub struct PricingService;

impl PricingService {
    /// Access price in KES per service tier.
    pub fn service_price(service_type: ServiceType) -> i64 {
        match service_type {
            ServiceType::Nurse => 500,
            ServiceType::ClinicalOfficer => 800,
            ServiceType::Pharmacist => 500,
            ServiceType::Gp => 1000,
            ServiceType::Specialist => 2500,
            ServiceType::Psychologist => 2000,
        }
    }

    pub fn recharge_package(package_id: &str) -> Option<RechargePackage> {
        RECHARGE_PACKAGES.iter().copied().find(|package| package.id == package_id)
    }

    pub fn validate_phone(phone: &str) -> bool {
        Regex::new(PHONE_PATTERN)
            .map(|pattern| pattern.is_match(phone))
            .unwrap_or(false)
    }

    pub fn validate_idempotency_key(key: &str) -> bool {
        (MIN_IDEMPOTENCY_KEY_LEN..=MAX_IDEMPOTENCY_KEY_LEN).contains(&key.len())
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Validates the request and prices it. Amounts always come from the
    /// table, never from the client.
    pub fn quote(request: &InitiatePaymentRequest) -> Result<Purchase, PaymentError> {
        if !Self::validate_phone(&request.phone_number) {
            return Err(PaymentError::Validation(
                "Phone number must look like 2547XXXXXXXX or 2541XXXXXXXX".to_string(),
            ));
        }
        if !Self::validate_idempotency_key(&request.idempotency_key) {
            return Err(PaymentError::Validation(format!(
                "Idempotency key must be {} to {} characters of letters, digits, '-' or '_'",
                MIN_IDEMPOTENCY_KEY_LEN, MAX_IDEMPOTENCY_KEY_LEN
            )));
        }

        match request.payment_type {
            PaymentType::ServiceAccess => {
                let service_type = request
                    .service_type
                    .as_deref()
                    .ok_or_else(|| PaymentError::Validation("service_type is required".to_string()))?
                    .parse::<ServiceType>()
                    .map_err(PaymentError::Validation)?;

                Ok(Purchase::ServiceAccess {
                    service_type,
                    amount: Self::service_price(service_type),
                })
            }
            PaymentType::CallRecharge => {
                let consultation_id: Uuid = request
                    .consultation_id
                    .ok_or_else(|| PaymentError::Validation("consultation_id is required".to_string()))?;
                let package_id = request
                    .package_id
                    .as_deref()
                    .ok_or_else(|| PaymentError::Validation("package_id is required".to_string()))?;
                let package = Self::recharge_package(package_id)
                    .ok_or_else(|| PaymentError::Validation(format!("Unknown recharge package: {}", package_id)))?;

                Ok(Purchase::CallRecharge {
                    consultation_id,
                    package_id: package.id.to_string(),
                    minutes: package.minutes,
                    amount: package.amount,
                })
            }
        }
    }
}
