// libs/appointment-cell/src/services/scheduler.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use doctor_cell::{DoctorError, DoctorService};
use notification_cell::{Notification, NotificationTarget, Notifier};
use patient_cell::SessionService;
use shared_config::AppConfig;
use shared_database::{SupabaseClient, Transition};
use shared_models::auth::Identity;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest, RescheduleAppointmentRequest,
    RescheduleOutcome, DEFAULT_GRACE_PERIOD_MINUTES, MAX_GRACE_PERIOD_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

pub(crate) const TABLE: &str = "appointments";

pub struct AppointmentService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    sessions: SessionService,
    lifecycle: AppointmentLifecycleService,
    notifier: Arc<dyn Notifier>,
}

impl AppointmentService {
    pub fn new(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            sessions: SessionService::new(config),
            lifecycle: AppointmentLifecycleService::new(),
            notifier,
        }
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/{}?id=eq.{}", TABLE, appointment_id);
        self.supabase
            .select_one(&path)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn get_for(&self, identity: &Identity, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.get(appointment_id).await?;
        if !is_participant(identity, &appointment) {
            return Err(AppointmentError::Unauthorized);
        }
        Ok(appointment)
    }

    // ==============================================================================
    // CREATE
    // ==============================================================================

    /// A doctor scheduling for a patient session creates a `confirmed` row;
    /// a patient booking with a doctor creates a `booked` one.
    #[instrument(skip(self, identity, request))]
    pub async fn create(
        &self,
        identity: &Identity,
        request: CreateAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        if request.scheduled_at <= now {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be scheduled in the future".to_string(),
            ));
        }

        let grace = request.grace_period_minutes.unwrap_or(DEFAULT_GRACE_PERIOD_MINUTES);
        if !(0..=MAX_GRACE_PERIOD_MINUTES).contains(&grace) {
            return Err(AppointmentError::Validation(format!(
                "Grace period must be between 0 and {} minutes",
                MAX_GRACE_PERIOD_MINUTES
            )));
        }

        let (doctor_id, session_id, status) = match identity {
            Identity::Doctor { user_id } => {
                let session_id = request.patient_session_id.ok_or_else(|| {
                    AppointmentError::Validation("patient_session_id is required".to_string())
                })?;
                (*user_id, session_id, AppointmentStatus::Confirmed)
            }
            Identity::Patient { session_id } => {
                let doctor_id = request
                    .doctor_id
                    .ok_or_else(|| AppointmentError::Validation("doctor_id is required".to_string()))?;
                (doctor_id, *session_id, AppointmentStatus::Booked)
            }
            _ => return Err(AppointmentError::Unauthorized),
        };

        self.sessions
            .require_active(session_id, now)
            .await
            .map_err(|_| AppointmentError::SessionInactive)?;

        let doctor = self
            .doctors
            .get_doctor(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound)?;
        if !doctor.is_verified {
            return Err(DoctorError::NotVerified.into());
        }
        if doctor.is_suspended {
            return Err(DoctorError::Suspended.into());
        }

        ConflictDetectionService::new(&self.supabase)
            .ensure_free(doctor_id, request.scheduled_at, None)
            .await?;

        let appointment: Appointment = self
            .supabase
            .insert(
                TABLE,
                json!({
                    "doctor_id": doctor_id,
                    "patient_session_id": session_id,
                    "consultation_id": request.consultation_id,
                    "scheduled_at": request.scheduled_at.to_rfc3339(),
                    "grace_period_minutes": grace,
                    "status": status,
                    "reminders_sent": [],
                    "notes": request.notes,
                }),
            )
            .await?;

        info!("Created {} appointment {} at {}", appointment.status, appointment.id, appointment.scheduled_at);

        let (target, title, body) = match status {
            AppointmentStatus::Confirmed => (
                NotificationTarget::Session(session_id),
                "Appointment Scheduled",
                format!("Your appointment is scheduled for {}", format_time(appointment.scheduled_at)),
            ),
            _ => (
                NotificationTarget::User(doctor_id),
                "New Appointment Request",
                format!("A patient booked {}", format_time(appointment.scheduled_at)),
            ),
        };
        self.notify(target, title, body, &appointment).await;

        Ok(appointment)
    }

    // ==============================================================================
    // TRANSITIONS
    // ==============================================================================

    async fn apply(
        &self,
        transition: Transition,
        appointment: &Appointment,
        to: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        transition
            .apply::<Appointment>(&self.supabase)
            .await?
            .ok_or(AppointmentError::InvalidStatusTransition(appointment.status, to))
    }

    pub async fn confirm(&self, identity: &Identity, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_for(identity, appointment_id).await?;
        if matches!(identity, Identity::Patient { .. }) {
            return Err(AppointmentError::Unauthorized);
        }
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Confirmed)?;

        let transition = Transition::new(
            TABLE,
            appointment_id,
            &[AppointmentStatus::Booked],
            AppointmentStatus::Confirmed,
        );
        let confirmed = self
            .apply(transition, &appointment, AppointmentStatus::Confirmed)
            .await?;

        self.notify(
            NotificationTarget::Session(confirmed.patient_session_id),
            "Appointment Confirmed",
            format!("Your appointment on {} is confirmed", format_time(confirmed.scheduled_at)),
            &confirmed,
        )
        .await;
        Ok(confirmed)
    }

    pub async fn start(
        &self,
        identity: &Identity,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_for(identity, appointment_id).await?;
        self.lifecycle.ensure_can_start(&appointment, now)?;

        let transition = Transition::new(
            TABLE,
            appointment_id,
            &[AppointmentStatus::Confirmed],
            AppointmentStatus::InProgress,
        );
        let started = self
            .apply(transition, &appointment, AppointmentStatus::InProgress)
            .await?;

        let target = counterpart(identity, &started);
        self.notify(target, "Appointment Started", "Your appointment has started".to_string(), &started)
            .await;
        Ok(started)
    }

    pub async fn complete(&self, identity: &Identity, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_for(identity, appointment_id).await?;
        if matches!(identity, Identity::Patient { .. }) {
            return Err(AppointmentError::Unauthorized);
        }
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;

        let transition = Transition::new(
            TABLE,
            appointment_id,
            &[AppointmentStatus::InProgress],
            AppointmentStatus::Completed,
        );
        let completed = self
            .apply(transition, &appointment, AppointmentStatus::Completed)
            .await?;

        self.notify(
            NotificationTarget::Session(completed.patient_session_id),
            "Appointment Completed",
            "Your appointment has been completed".to_string(),
            &completed,
        )
        .await;
        Ok(completed)
    }

    pub async fn cancel(
        &self,
        identity: &Identity,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_for(identity, appointment_id).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let transition = Transition::new(
            TABLE,
            appointment_id,
            &AppointmentStatus::UPCOMING,
            AppointmentStatus::Cancelled,
        )
        .set("cancellation_reason", json!(reason));
        let cancelled = self
            .apply(transition, &appointment, AppointmentStatus::Cancelled)
            .await?;

        let body = match &reason {
            Some(reason) => format!(
                "The appointment on {} was cancelled: {}",
                format_time(cancelled.scheduled_at),
                reason
            ),
            None => format!("The appointment on {} was cancelled", format_time(cancelled.scheduled_at)),
        };
        self.notify(counterpart(identity, &cancelled), "Appointment Cancelled", body, &cancelled)
            .await;
        Ok(cancelled)
    }

    // ==============================================================================
    // RESCHEDULE
    // ==============================================================================

    /// Creates the replacement row and supersedes the original in one
    /// database transaction. The procedure returns no row when the original
    /// was not reschedulable any more (already moved by someone else).
    #[instrument(skip(self, identity, request))]
    pub async fn reschedule(
        &self,
        identity: &Identity,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<RescheduleOutcome, AppointmentError> {
        let doctor_id = match identity {
            Identity::Doctor { user_id } => *user_id,
            _ => return Err(AppointmentError::Unauthorized),
        };

        let appointment = self.get(appointment_id).await?;
        if appointment.doctor_id != doctor_id {
            return Err(AppointmentError::Unauthorized);
        }
        if request.new_scheduled_at <= now {
            return Err(AppointmentError::InvalidTime(
                "New time must be in the future".to_string(),
            ));
        }
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Rescheduled)?;

        ConflictDetectionService::new(&self.supabase)
            .ensure_free(doctor_id, request.new_scheduled_at, Some(appointment_id))
            .await?;

        let rows: Vec<RescheduleOutcome> = self
            .supabase
            .rpc(
                "reschedule_appointment",
                json!({
                    "p_appointment_id": appointment_id,
                    "p_doctor_id": doctor_id,
                    "p_new_scheduled_at": request.new_scheduled_at.to_rfc3339(),
                    "p_reason": request.reason,
                }),
            )
            .await?;

        let outcome = rows.into_iter().next().ok_or(AppointmentError::InvalidStatusTransition(
            appointment.status,
            AppointmentStatus::Rescheduled,
        ))?;

        info!(
            "Rescheduled appointment {} to {} as {}",
            appointment_id, request.new_scheduled_at, outcome.new_appointment_id
        );

        let body = match &request.reason {
            Some(reason) => format!(
                "Your appointment has been moved to {}. Reason: {}",
                format_time(request.new_scheduled_at),
                reason
            ),
            None => format!(
                "Your appointment has been moved to {}",
                format_time(request.new_scheduled_at)
            ),
        };
        self.notifier
            .notify(
                Notification::new(
                    NotificationTarget::Session(appointment.patient_session_id),
                    "Appointment Rescheduled",
                    body,
                    "appointment_rescheduled",
                )
                .with_metadata(json!({
                    "original_appointment_id": outcome.original_appointment_id,
                    "appointment_id": outcome.new_appointment_id,
                    "scheduled_at": request.new_scheduled_at,
                })),
            )
            .await;

        Ok(outcome)
    }

    async fn notify(&self, target: NotificationTarget, title: &str, body: String, appointment: &Appointment) {
        self.notifier
            .notify(
                Notification::new(target, title, body, "appointment_update").with_metadata(json!({
                    "appointment_id": appointment.id,
                    "status": appointment.status,
                    "scheduled_at": appointment.scheduled_at,
                })),
            )
            .await;
    }
}

pub(crate) fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn is_participant(identity: &Identity, appointment: &Appointment) -> bool {
    match identity {
        Identity::Patient { session_id } => appointment.patient_session_id == *session_id,
        Identity::Doctor { user_id } => appointment.doctor_id == *user_id,
        Identity::Admin { .. } => true,
        _ => false,
    }
}

fn counterpart(actor: &Identity, appointment: &Appointment) -> NotificationTarget {
    match actor {
        Identity::Patient { .. } => NotificationTarget::User(appointment.doctor_id),
        _ => NotificationTarget::Session(appointment.patient_session_id),
    }
}
