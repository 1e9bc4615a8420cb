use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::{filter_timestamp, SupabaseClient};

use crate::models::{Appointment, AppointmentError, SLOT_MINUTES};

pub struct ConflictDetectionService<'a> {
    supabase: &'a SupabaseClient,
}

impl<'a> ConflictDetectionService<'a> {
    pub fn new(supabase: &'a SupabaseClient) -> Self {
        Self { supabase }
    }

    /// Upcoming appointments of `doctor_id` within one slot of `at`.
    pub async fn doctor_clashes(
        &self,
        doctor_id: Uuid,
        at: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let slot = Duration::minutes(SLOT_MINUTES);
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(booked,confirmed,in_progress)&scheduled_at=gt.{}&scheduled_at=lt.{}",
            doctor_id,
            filter_timestamp(at - slot),
            filter_timestamp(at + slot)
        );
        debug!("Checking conflicts for doctor {} around {}", doctor_id, at);

        let existing: Vec<Appointment> = self.supabase.select(&path).await?;
        let clashes: Vec<Appointment> = existing
            .into_iter()
            .filter(|appointment| Some(appointment.id) != exclude_appointment_id)
            .collect();

        if !clashes.is_empty() {
            warn!("Conflict detected for doctor {} - {} clashing appointments", doctor_id, clashes.len());
        }
        Ok(clashes)
    }

    pub async fn ensure_free(
        &self,
        doctor_id: Uuid,
        at: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        if self.doctor_clashes(doctor_id, at, exclude_appointment_id).await?.is_empty() {
            Ok(())
        } else {
            Err(AppointmentError::ConflictDetected)
        }
    }
}
