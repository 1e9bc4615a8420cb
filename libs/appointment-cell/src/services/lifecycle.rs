// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Pure transition rules. Stored state is only ever changed through a
/// conditional update that re-checks the source status.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition(current_status, new_status));
        }

        debug!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        if current_status.is_terminal() {
            return vec![];
        }

        match current_status {
            AppointmentStatus::Booked => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Missed,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Missed,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::InProgress => vec![AppointmentStatus::Completed],
            _ => vec![],
        }
    }

    /// Confirmed appointments open `EARLY_START_MINUTES` before the slot and
    /// close at the grace deadline.
    pub fn ensure_can_start(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        self.validate_status_transition(appointment.status, AppointmentStatus::InProgress)?;

        let (earliest, latest) = (appointment.earliest_start(), appointment.deadline());
        if now < earliest || now > latest {
            return Err(AppointmentError::OutsideStartWindow(earliest, latest));
        }
        Ok(())
    }

    /// Whether the missed sweep should try to close this appointment.
    pub fn is_past_deadline(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        AppointmentStatus::UPCOMING.contains(&appointment.status) && now >= appointment.deadline()
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn appointment(status: AppointmentStatus, scheduled_at: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_session_id: Uuid::new_v4(),
            consultation_id: None,
            scheduled_at,
            grace_period_minutes: 15,
            status,
            reminders_sent: vec![],
            superseded_by: None,
            reschedule_reason: None,
            cancellation_reason: None,
            notes: None,
            created_at: scheduled_at,
            updated_at: scheduled_at,
        }
    }

    #[test]
    fn start_window_runs_from_early_start_to_grace_deadline() {
        let lifecycle = AppointmentLifecycleService::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();
        let confirmed = appointment(AppointmentStatus::Confirmed, at);

        assert!(lifecycle.ensure_can_start(&confirmed, at - Duration::minutes(16)).is_err());
        assert!(lifecycle.ensure_can_start(&confirmed, at - Duration::minutes(15)).is_ok());
        assert!(lifecycle.ensure_can_start(&confirmed, at + Duration::minutes(15)).is_ok());
        assert!(lifecycle.ensure_can_start(&confirmed, at + Duration::minutes(16)).is_err());

        let booked = appointment(AppointmentStatus::Booked, at);
        assert!(matches!(
            lifecycle.ensure_can_start(&booked, at),
            Err(AppointmentError::InvalidStatusTransition(..))
        ));
    }

    #[test]
    fn deadline_includes_grace_period() {
        let lifecycle = AppointmentLifecycleService::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();
        let confirmed = appointment(AppointmentStatus::Confirmed, at);

        assert!(!lifecycle.is_past_deadline(&confirmed, at + Duration::minutes(14)));
        assert!(lifecycle.is_past_deadline(&confirmed, at + Duration::minutes(15)));
        assert!(!lifecycle.is_past_deadline(&appointment(AppointmentStatus::Completed, at), at + Duration::hours(2)));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.get_valid_transitions(AppointmentStatus::Cancelled).is_empty());
        assert!(lifecycle.get_valid_transitions(AppointmentStatus::Rescheduled).is_empty());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Missed, AppointmentStatus::Confirmed)
            .is_err());
    }
}
