// =====================================================================================
// PAYMENT ORCHESTRATOR
// =====================================================================================
//
// initiate  -> pending row (unique idempotency key) -> push_requested_at -> STK push
//              -> checkout id (retried, logged to event_logs if it never lands)
// reconcile -> pending -> completed | failed, exactly once per payment, then the
//              entitlement grant (unique on payment_id) and the patient notice
// sweep     -> resolves stale pending payments and re-applies missing grants; a row
//              whose push went out but whose checkout id was lost is left pending
//
// =====================================================================================

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use consultation_cell::{ConsultationService, ConsultationStatus};
use notification_cell::{Notification, NotificationTarget, Notifier};
use patient_cell::SessionService;
use security_cell::{EventLevel, EventLogEntry, EventLogService};
use shared_config::AppConfig;
use shared_database::{filter_timestamp, SupabaseClient, Transition};

use crate::models::{
    CheckoutResult, InitiateOutcome, InitiatePaymentRequest, Payment, PaymentError, PaymentStatus, PaymentType,
    Purchase, ReconcileOutcome, ReconciliationReport, StkPushAccepted,
};
use crate::services::mpesa::PaymentGateway;
use crate::services::pricing::PricingService;

const TABLE: &str = "payments";
const SWEEP_BATCH: usize = 100;
const CHECKOUT_WRITE_ATTEMPTS: u32 = 3;
const CHECKOUT_WRITE_BACKOFF: StdDuration = StdDuration::from_millis(100);

pub struct PaymentService {
    supabase: SupabaseClient,
    events: EventLogService,
    sessions: SessionService,
    consultations: ConsultationService,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    service_access_hours: i64,
    reconcile_after_minutes: i64,
}

impl PaymentService {
    pub fn new(config: &AppConfig, gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            events: EventLogService::new(config),
            sessions: SessionService::new(config),
            consultations: ConsultationService::new(config, notifier.clone()),
            gateway,
            notifier,
            service_access_hours: config.service_access_hours,
            reconcile_after_minutes: config.payment_reconcile_after_minutes,
        }
    }

    async fn find_by_key(&self, idempotency_key: &str) -> Result<Option<Payment>, PaymentError> {
        let path = format!(
            "/rest/v1/{}?idempotency_key=eq.{}",
            TABLE,
            urlencoding::encode(idempotency_key)
        );
        Ok(self.supabase.select_one(&path).await?)
    }

    async fn find_by_checkout(&self, checkout_request_id: &str) -> Result<Option<Payment>, PaymentError> {
        let path = format!(
            "/rest/v1/{}?mpesa_checkout_request_id=eq.{}",
            TABLE,
            urlencoding::encode(checkout_request_id)
        );
        Ok(self.supabase.select_one(&path).await?)
    }

    /// A repeated key returns the original payment, but only to its owner.
    fn replay(existing: Payment, session_id: Uuid) -> Result<InitiateOutcome, PaymentError> {
        if existing.patient_session_id != session_id {
            return Err(PaymentError::KeyReused);
        }
        debug!("Replaying payment {} for repeated idempotency key", existing.id);
        Ok(InitiateOutcome {
            payment: existing,
            created: false,
        })
    }

    // ==============================================================================
    // INITIATE
    // ==============================================================================

    #[instrument(skip(self, request), fields(session_id = %session_id))]
    pub async fn initiate(
        &self,
        session_id: Uuid,
        request: InitiatePaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<InitiateOutcome, PaymentError> {
        let purchase = PricingService::quote(&request)?;

        self.sessions
            .require_active(session_id, now)
            .await
            .map_err(|_| PaymentError::SessionInactive)?;

        if let Purchase::CallRecharge { consultation_id, .. } = &purchase {
            let consultation = self
                .consultations
                .get(*consultation_id)
                .await
                .map_err(|_| PaymentError::ConsultationNotRechargeable)?;
            let open_for_calls = matches!(
                consultation.status,
                ConsultationStatus::Active | ConsultationStatus::InProgress
            );
            if consultation.patient_session_id != session_id || !open_for_calls {
                return Err(PaymentError::ConsultationNotRechargeable);
            }
        }

        if let Some(existing) = self.find_by_key(&request.idempotency_key).await? {
            return Self::replay(existing, session_id);
        }

        let (service_type, consultation_id, package_id, minutes) = match &purchase {
            Purchase::ServiceAccess { service_type, .. } => (Some(*service_type), None, None, None),
            Purchase::CallRecharge {
                consultation_id,
                package_id,
                minutes,
                ..
            } => (None, Some(*consultation_id), Some(package_id.clone()), Some(*minutes)),
        };

        let inserted = self
            .supabase
            .insert::<Payment>(
                TABLE,
                json!({
                    "payment_type": purchase.payment_type(),
                    "patient_session_id": session_id,
                    "consultation_id": consultation_id,
                    "service_type": service_type,
                    "package_id": package_id,
                    "additional_minutes": minutes,
                    "amount": purchase.amount(),
                    "phone_number": request.phone_number,
                    "status": PaymentStatus::Pending,
                    "idempotency_key": request.idempotency_key,
                    "grant_applied": false,
                }),
            )
            .await;

        let payment = match inserted {
            Ok(payment) => payment,
            // A concurrent request with the same key got there first.
            Err(e) if e.is_conflict() => {
                let existing = self
                    .find_by_key(&request.idempotency_key)
                    .await?
                    .ok_or(PaymentError::Store(e))?;
                return Self::replay(existing, session_id);
            }
            Err(e) => return Err(e.into()),
        };

        // Marks the point after which money may move. Without it the sweep
        // cannot tell a push that never went out from a lost checkout id.
        let marked = format!("/rest/v1/{}?id=eq.{}&status=eq.pending", TABLE, payment.id);
        if let Err(e) = self
            .supabase
            .update::<Value>(&marked, json!({ "push_requested_at": now.to_rfc3339() }))
            .await
        {
            error!("Could not mark payment {} as pushed: {}", payment.id, e);
            self.fail_unpushed(&payment, "Push request could not be recorded").await;
            return Err(e.into());
        }

        let accepted = match self
            .gateway
            .initiate_stk_push(
                &payment.phone_number,
                payment.amount,
                &payment.idempotency_key,
                &purchase.description(),
            )
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("STK push for payment {} failed: {}", payment.id, e);
                self.fail_unpushed(&payment, &e.to_string()).await;
                return Err(e);
            }
        };

        let payment = self.record_checkout(payment, &accepted, now).await?;

        info!(
            "Initiated {} payment {} (KES {})",
            payment.payment_type, payment.id, payment.amount
        );
        Ok(InitiateOutcome {
            payment,
            created: true,
        })
    }

    /// Polling endpoint for the owning session.
    pub async fn status(&self, session_id: Uuid, checkout_request_id: &str) -> Result<Payment, PaymentError> {
        match self.find_by_checkout(checkout_request_id).await? {
            Some(payment) if payment.patient_session_id == session_id => Ok(payment),
            _ => Err(PaymentError::NotFound),
        }
    }

    async fn fail_unpushed(&self, payment: &Payment, reason: &str) {
        let transition = Transition::new(TABLE, payment.id, &[PaymentStatus::Pending], PaymentStatus::Failed)
            .set("failure_reason", json!(reason));
        if let Err(store) = transition.apply::<Payment>(&self.supabase).await {
            error!("Could not mark payment {} failed: {}", payment.id, store);
        }
    }

    /// Stores the checkout id the gateway accepted, with a bounded retry.
    /// When every attempt fails the id is written to the event log so the
    /// payment can be matched by hand; the row stays pending.
    async fn record_checkout(
        &self,
        payment: Payment,
        accepted: &StkPushAccepted,
        now: DateTime<Utc>,
    ) -> Result<Payment, PaymentError> {
        let path = format!("/rest/v1/{}?id=eq.{}&status=eq.pending", TABLE, payment.id);
        let body = json!({
            "mpesa_checkout_request_id": accepted.checkout_request_id,
            "updated_at": now.to_rfc3339(),
        });

        let mut attempt = 1;
        loop {
            match self.supabase.update::<Payment>(&path, body.clone()).await {
                Ok(updated) => {
                    return Ok(updated.into_iter().next().unwrap_or(Payment {
                        mpesa_checkout_request_id: Some(accepted.checkout_request_id.clone()),
                        ..payment
                    }));
                }
                Err(e) if attempt < CHECKOUT_WRITE_ATTEMPTS => {
                    warn!(
                        "Checkout id write for payment {} failed (attempt {}): {}",
                        payment.id, attempt, e
                    );
                    tokio::time::sleep(CHECKOUT_WRITE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    let entry = EventLogEntry::new("payments/initiate", EventLevel::Error, "checkout_id_unrecorded")
                        .with_identity(Some(payment.patient_session_id.to_string()))
                        .with_metadata(json!({
                            "payment_id": payment.id,
                            "checkout_request_id": accepted.checkout_request_id,
                            "merchant_request_id": accepted.merchant_request_id,
                            "error": e.to_string(),
                        }));
                    if let Err(log) = self.events.record(entry).await {
                        error!("Could not log unrecorded checkout for payment {}: {}", payment.id, log);
                    }
                    return Err(e.into());
                }
            }
        }
    }

    // ==============================================================================
    // RECONCILE
    // ==============================================================================

    /// Applies a gateway result. Only the first delivery for a checkout can
    /// change anything; later ones find the payment no longer pending.
    #[instrument(skip(self, result), fields(checkout = %result.checkout_request_id))]
    pub async fn reconcile(&self, result: CheckoutResult, now: DateTime<Utc>) -> Result<ReconcileOutcome, PaymentError> {
        let payment = match self.find_by_checkout(&result.checkout_request_id).await? {
            Some(payment) => payment,
            None => {
                warn!("Callback for unknown checkout {}", result.checkout_request_id);
                return Ok(ReconcileOutcome::UnknownCheckout);
            }
        };

        if payment.status != PaymentStatus::Pending {
            debug!("Payment {} already {}", payment.id, payment.status);
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        self.settle(payment, &result, now).await
    }

    async fn settle(
        &self,
        payment: Payment,
        result: &CheckoutResult,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, PaymentError> {
        if result.is_success() {
            let transition = Transition::new(TABLE, payment.id, &[PaymentStatus::Pending], PaymentStatus::Completed)
                .set("transaction_id", json!(result.transaction_id));

            let completed = match transition.apply::<Payment>(&self.supabase).await? {
                Some(completed) => completed,
                None => return Ok(ReconcileOutcome::AlreadyProcessed),
            };

            // A failed grant leaves grant_applied = false for the sweep to retry.
            if let Err(e) = self.apply_grant(&completed, now).await {
                error!("Grant for payment {} not applied: {}", completed.id, e);
            }

            self.notify_patient(
                &completed,
                "Payment Successful",
                format!("Your payment of KES {} was received", completed.amount),
            )
            .await;
            info!("Payment {} completed", completed.id);
            Ok(ReconcileOutcome::Completed)
        } else {
            let transition = Transition::new(TABLE, payment.id, &[PaymentStatus::Pending], PaymentStatus::Failed)
                .set("failure_reason", json!(result.result_desc));

            let failed = match transition.apply::<Payment>(&self.supabase).await? {
                Some(failed) => failed,
                None => return Ok(ReconcileOutcome::AlreadyProcessed),
            };

            self.notify_patient(
                &failed,
                "Payment Failed",
                format!("Your payment did not go through: {}", result.result_desc),
            )
            .await;
            info!("Payment {} failed: {}", failed.id, result.result_desc);
            Ok(ReconcileOutcome::Failed)
        }
    }

    /// Creates the entitlement for a completed payment. Both grant tables are
    /// unique on `payment_id`, so calling this again is harmless.
    pub async fn apply_grant(&self, payment: &Payment, now: DateTime<Utc>) -> Result<(), PaymentError> {
        match payment.payment_type {
            PaymentType::ServiceAccess => {
                let service_type = payment
                    .service_type
                    .ok_or_else(|| PaymentError::Validation("Service access payment without service type".to_string()))?;
                let expires_at = now + Duration::hours(self.service_access_hours);

                let written: Vec<Value> = self
                    .supabase
                    .insert_ignore_duplicates(
                        "service_access_payments",
                        "payment_id",
                        json!({
                            "payment_id": payment.id,
                            "patient_session_id": payment.patient_session_id,
                            "service_type": service_type,
                            "amount": payment.amount,
                            "expires_at": expires_at.to_rfc3339(),
                            "access_granted": true,
                        }),
                    )
                    .await?;
                debug!("Service access grant for {}: {} new rows", payment.id, written.len());
            }
            PaymentType::CallRecharge => {
                let consultation_id = payment
                    .consultation_id
                    .ok_or_else(|| PaymentError::Validation("Recharge payment without consultation".to_string()))?;

                let applied: Value = self
                    .supabase
                    .rpc(
                        "apply_call_recharge",
                        json!({
                            "p_payment_id": payment.id,
                            "p_patient_session_id": payment.patient_session_id,
                            "p_consultation_id": consultation_id,
                            "p_additional_minutes": payment.additional_minutes.unwrap_or(0),
                            "p_amount": payment.amount,
                        }),
                    )
                    .await?;
                debug!("Call recharge for {}: {}", payment.id, applied);
            }
        }

        let path = format!("/rest/v1/{}?id=eq.{}", TABLE, payment.id);
        let _: Vec<Value> = self
            .supabase
            .update(&path, json!({ "grant_applied": true }))
            .await?;
        Ok(())
    }

    async fn notify_patient(&self, payment: &Payment, title: &str, body: String) {
        self.notifier
            .notify(
                Notification::new(NotificationTarget::Session(payment.patient_session_id), title, body, "payment")
                    .with_metadata(json!({
                        "payment_id": payment.id,
                        "payment_type": payment.payment_type,
                        "status": payment.status,
                        "service_type": payment.service_type,
                        "consultation_id": payment.consultation_id,
                    })),
            )
            .await;
    }

    // ==============================================================================
    // RECONCILIATION SWEEP
    // ==============================================================================

    /// Catches what a lost or failed callback left behind.
    #[instrument(skip(self))]
    pub async fn reconcile_pending(&self, now: DateTime<Utc>) -> Result<ReconciliationReport, PaymentError> {
        let cutoff = now - Duration::minutes(self.reconcile_after_minutes);
        let path = format!(
            "/rest/v1/{}?status=eq.pending&created_at=lt.{}&order=created_at.asc&limit={}",
            TABLE,
            filter_timestamp(cutoff),
            SWEEP_BATCH
        );
        let stale: Vec<Payment> = self.supabase.select(&path).await?;

        let mut report = ReconciliationReport {
            examined: stale.len(),
            ..ReconciliationReport::default()
        };

        for payment in stale {
            let id = payment.id;
            let result = match payment.mpesa_checkout_request_id.as_deref() {
                None if payment.push_requested_at.is_none() => CheckoutResult {
                    checkout_request_id: String::new(),
                    result_code: -1,
                    result_desc: "Checkout was never created".to_string(),
                    transaction_id: None,
                },
                // The push may have been accepted; only an operator can match it.
                None => {
                    warn!("Payment {} was pushed but has no checkout id", id);
                    self.events.record_detached(
                        EventLogEntry::new("payments/reconcile", EventLevel::Warn, "checkout_unknown")
                            .with_identity(Some(payment.patient_session_id.to_string()))
                            .with_metadata(json!({ "payment_id": id })),
                    );
                    report.unresolved.push(id);
                    continue;
                }
                Some(checkout_request_id) => match self.gateway.query_checkout(checkout_request_id).await {
                    Ok(Some(result)) => result,
                    Ok(None) => {
                        report.still_pending += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!("Status query for payment {} failed: {}", id, e);
                        report.still_pending += 1;
                        continue;
                    }
                },
            };

            match self.settle(payment, &result, now).await {
                Ok(ReconcileOutcome::Completed) => report.completed.push(id),
                Ok(ReconcileOutcome::Failed) => report.failed.push(id),
                Ok(_) => {}
                Err(e) => error!("Reconciling payment {} failed: {}", id, e),
            }
        }

        let path = format!(
            "/rest/v1/{}?status=eq.completed&grant_applied=eq.false&limit={}",
            TABLE, SWEEP_BATCH
        );
        let ungranted: Vec<Payment> = self.supabase.select(&path).await?;
        for payment in ungranted {
            match self.apply_grant(&payment, now).await {
                Ok(()) => report.grants_repaired.push(payment.id),
                Err(e) => error!("Grant repair for payment {} failed: {}", payment.id, e),
            }
        }

        info!(
            "Payment sweep: {} examined, {} completed, {} failed, {} unresolved, {} grants repaired",
            report.examined,
            report.completed.len(),
            report.failed.len(),
            report.unresolved.len(),
            report.grants_repaired.len()
        );
        Ok(report)
    }
}
