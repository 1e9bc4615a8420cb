// =====================================================================================
// CONSULTATION STATE MACHINE
// =====================================================================================
//
// pending -> active -> in_progress -> completed, with cancelled reachable from
// every open state. Each move is a conditional update on the current status.
//
// =====================================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::DoctorService;
use notification_cell::{Notification, NotificationTarget, Notifier};
use shared_config::AppConfig;
use shared_database::{filter_timestamp, SupabaseClient, Transition};
use shared_models::auth::Identity;
use shared_models::ServiceType;

use crate::models::{
    Consultation, ConsultationError, ConsultationStatus, CreateConsultationRequest, CreateOutcome, NewConsultation,
};

const TABLE: &str = "consultations";

pub struct ConsultationService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    notifier: Arc<dyn Notifier>,
}

impl ConsultationService {
    pub fn new(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            notifier,
        }
    }

    pub async fn has_active_access(
        &self,
        session_id: Uuid,
        service_type: ServiceType,
        now: DateTime<Utc>,
    ) -> Result<bool, ConsultationError> {
        let path = format!(
            "/rest/v1/service_access_payments?select=id&patient_session_id=eq.{}&service_type=eq.{}&access_granted=eq.true&expires_at=gt.{}&limit=1",
            session_id,
            service_type,
            filter_timestamp(now)
        );
        let rows: Vec<Value> = self.supabase.select(&path).await?;
        Ok(!rows.is_empty())
    }

    pub async fn find_open(&self, session_id: Uuid) -> Result<Option<Consultation>, ConsultationError> {
        let path = format!(
            "/rest/v1/{}?patient_session_id=eq.{}&status=in.(pending,active,in_progress)&order=created_at.desc&limit=1",
            TABLE, session_id
        );
        Ok(self.supabase.select_one(&path).await?)
    }

    pub async fn get(&self, consultation_id: Uuid) -> Result<Consultation, ConsultationError> {
        let path = format!("/rest/v1/{}?id=eq.{}", TABLE, consultation_id);
        self.supabase
            .select_one(&path)
            .await?
            .ok_or(ConsultationError::NotFound)
    }

    #[instrument(skip(self, request), fields(session_id = %session_id))]
    pub async fn create(
        &self,
        session_id: Uuid,
        request: CreateConsultationRequest,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, ConsultationError> {
        let new = NewConsultation::try_from(request)?;

        if !self.has_active_access(session_id, new.service_type, now).await? {
            return Err(ConsultationError::NoActiveAccess(new.service_type));
        }

        if let Some(doctor_id) = new.doctor_id {
            self.doctors.verify_can_serve(doctor_id, new.service_type).await?;
        }

        if let Some(existing) = self.find_open(session_id).await? {
            debug!("Session already has open consultation {}", existing.id);
            return Ok(CreateOutcome {
                consultation: existing,
                created: false,
            });
        }

        let status = if new.doctor_id.is_some() {
            ConsultationStatus::Active
        } else {
            ConsultationStatus::Pending
        };

        let inserted = self
            .supabase
            .insert::<Consultation>(
                TABLE,
                json!({
                    "patient_session_id": session_id,
                    "doctor_id": new.doctor_id,
                    "service_type": new.service_type,
                    "consultation_type": new.consultation_type,
                    "status": status,
                    "chief_complaint": new.chief_complaint,
                    "remaining_call_minutes": 0,
                }),
            )
            .await;

        let consultation = match inserted {
            Ok(consultation) => consultation,
            // The partial unique index on open consultations fired: a
            // concurrent create for this session won.
            Err(e) if e.is_conflict() => {
                let existing = self.find_open(session_id).await?.ok_or(ConsultationError::Store(e))?;
                return Ok(CreateOutcome {
                    consultation: existing,
                    created: false,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!("Created consultation {} ({})", consultation.id, consultation.status);

        match consultation.doctor_id {
            None => {
                self.notifier
                    .notify(
                        Notification::new(
                            NotificationTarget::Doctors(consultation.service_type),
                            "New Consultation Request",
                            format!("A patient is waiting for a {} consultation", consultation.service_type),
                            "consultation_request",
                        )
                        .with_metadata(json!({ "consultation_id": consultation.id })),
                    )
                    .await;
            }
            Some(doctor_id) => {
                self.notifier
                    .notify(
                        Notification::new(
                            NotificationTarget::User(doctor_id),
                            "New Consultation Assigned",
                            "A patient has started a consultation with you",
                            "consultation_assigned",
                        )
                        .with_metadata(json!({ "consultation_id": consultation.id })),
                    )
                    .await;
            }
        }

        Ok(CreateOutcome {
            consultation,
            created: true,
        })
    }

    // ==============================================================================
    // ACCESS CHECKS
    // ==============================================================================

    fn is_participant(identity: &Identity, consultation: &Consultation) -> bool {
        match identity {
            Identity::Patient { session_id } => consultation.patient_session_id == *session_id,
            Identity::Doctor { user_id } => match consultation.doctor_id {
                Some(doctor_id) => doctor_id == *user_id,
                // Unclaimed requests are visible to doctors so they can accept them.
                None => consultation.status == ConsultationStatus::Pending,
            },
            Identity::Admin { .. } => true,
            Identity::Hr { .. } | Identity::Finance { .. } | Identity::Audit { .. } => false,
        }
    }

    pub async fn get_for(&self, identity: &Identity, consultation_id: Uuid) -> Result<Consultation, ConsultationError> {
        let consultation = self.get(consultation_id).await?;
        if !Self::is_participant(identity, &consultation) {
            return Err(ConsultationError::NotParticipant);
        }
        Ok(consultation)
    }

    async fn apply(
        &self,
        transition: Transition,
        consultation: &Consultation,
        to: ConsultationStatus,
    ) -> Result<Consultation, ConsultationError> {
        transition
            .apply::<Consultation>(&self.supabase)
            .await?
            .ok_or(ConsultationError::InvalidTransition(consultation.status, to))
    }

    async fn notify(&self, target: NotificationTarget, title: &str, body: &str, consultation: &Consultation) {
        self.notifier
            .notify(
                Notification::new(target, title, body, "consultation_update").with_metadata(json!({
                    "consultation_id": consultation.id,
                    "status": consultation.status,
                })),
            )
            .await;
    }

    // ==============================================================================
    // TRANSITIONS
    // ==============================================================================

    /// A doctor claims a pending consultation. Only one doctor can win: the
    /// update also requires `doctor_id` to still be empty.
    #[instrument(skip(self, identity))]
    pub async fn accept(&self, identity: &Identity, consultation_id: Uuid) -> Result<Consultation, ConsultationError> {
        let doctor_id = match identity {
            Identity::Doctor { user_id } => *user_id,
            _ => return Err(ConsultationError::NotParticipant),
        };

        let consultation = self.get(consultation_id).await?;
        self.doctors
            .verify_can_serve(doctor_id, consultation.service_type)
            .await?;

        let transition = Transition::new(
            TABLE,
            consultation_id,
            &[ConsultationStatus::Pending],
            ConsultationStatus::Active,
        )
        .guard("doctor_id", "is.null")
        .set("doctor_id", json!(doctor_id));

        let accepted = self
            .apply(transition, &consultation, ConsultationStatus::Active)
            .await?;

        info!("Doctor {} accepted consultation {}", doctor_id, consultation_id);
        self.notify(
            NotificationTarget::Session(accepted.patient_session_id),
            "Consultation Accepted",
            "A doctor has accepted your consultation",
            &accepted,
        )
        .await;

        Ok(accepted)
    }

    #[instrument(skip(self, identity))]
    pub async fn start(&self, identity: &Identity, consultation_id: Uuid, now: DateTime<Utc>) -> Result<Consultation, ConsultationError> {
        let consultation = self.get_for(identity, consultation_id).await?;
        if consultation.doctor_id.is_none() {
            return Err(ConsultationError::InvalidTransition(
                consultation.status,
                ConsultationStatus::InProgress,
            ));
        }

        let transition = Transition::new(
            TABLE,
            consultation_id,
            &[ConsultationStatus::Active],
            ConsultationStatus::InProgress,
        )
        .set("started_at", json!(now.to_rfc3339()));

        let started = self
            .apply(transition, &consultation, ConsultationStatus::InProgress)
            .await?;

        if let Some(target) = Self::counterpart(identity, &started) {
            self.notify(target, "Consultation Started", "Your consultation has started", &started)
                .await;
        }
        Ok(started)
    }

    #[instrument(skip(self, identity))]
    pub async fn complete(&self, identity: &Identity, consultation_id: Uuid, now: DateTime<Utc>) -> Result<Consultation, ConsultationError> {
        let consultation = self.get_for(identity, consultation_id).await?;
        if matches!(identity, Identity::Patient { .. }) {
            return Err(ConsultationError::NotParticipant);
        }

        let transition = Transition::new(
            TABLE,
            consultation_id,
            &[ConsultationStatus::InProgress],
            ConsultationStatus::Completed,
        )
        .set("ended_at", json!(now.to_rfc3339()));

        let completed = self
            .apply(transition, &consultation, ConsultationStatus::Completed)
            .await?;

        self.notify(
            NotificationTarget::Session(completed.patient_session_id),
            "Consultation Completed",
            "Your consultation has been completed",
            &completed,
        )
        .await;
        Ok(completed)
    }

    #[instrument(skip(self, identity, reason))]
    pub async fn cancel(
        &self,
        identity: &Identity,
        consultation_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Consultation, ConsultationError> {
        let consultation = self.get_for(identity, consultation_id).await?;
        if consultation.doctor_id.is_none() && matches!(identity, Identity::Doctor { .. }) {
            // Unclaimed requests are visible to doctors but not theirs to cancel.
            return Err(ConsultationError::NotParticipant);
        }

        let transition = Transition::new(
            TABLE,
            consultation_id,
            &ConsultationStatus::OPEN,
            ConsultationStatus::Cancelled,
        )
        .set("cancellation_reason", json!(reason))
        .set("ended_at", json!(now.to_rfc3339()));

        let cancelled = self
            .apply(transition, &consultation, ConsultationStatus::Cancelled)
            .await?;

        match Self::counterpart(identity, &cancelled) {
            Some(target) => {
                self.notify(target, "Consultation Cancelled", "A consultation was cancelled", &cancelled)
                    .await
            }
            None => warn!("Cancelled consultation {} has no one to notify", consultation_id),
        }
        Ok(cancelled)
    }

    /// The other party of a consultation from the actor's point of view.
    fn counterpart(actor: &Identity, consultation: &Consultation) -> Option<NotificationTarget> {
        match actor {
            Identity::Patient { .. } => consultation.doctor_id.map(NotificationTarget::User),
            _ => Some(NotificationTarget::Session(consultation.patient_session_id)),
        }
    }
}
