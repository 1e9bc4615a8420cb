// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::DoctorError;
use shared_database::StoreError;
use shared_models::error::AppError;

pub const DEFAULT_GRACE_PERIOD_MINUTES: i32 = 15;
pub const MAX_GRACE_PERIOD_MINUTES: i32 = 60;

/// How early before `scheduled_at` a participant may start the session.
pub const EARLY_START_MINUTES: i64 = 15;

/// Two appointments of the same doctor closer than this clash.
pub const SLOT_MINUTES: i64 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_session_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub grace_period_minutes: i32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reminders_sent: Vec<String>,
    pub superseded_by: Option<Uuid>,
    pub reschedule_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// After this instant an unstarted appointment counts as missed.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.grace_period_minutes as i64)
    }

    pub fn earliest_start(&self) -> DateTime<Utc> {
        self.scheduled_at - Duration::minutes(EARLY_START_MINUTES)
    }

    pub fn has_reminder(&self, label: &str) -> bool {
        self.reminders_sent.iter().any(|sent| sent == label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Confirmed,
    InProgress,
    Completed,
    Missed,
    Cancelled,
    /// Replaced by a newer row through reschedule; terminal.
    Rescheduled,
}

impl AppointmentStatus {
    /// Statuses the missed sweep and reschedule act on.
    pub const UPCOMING: [AppointmentStatus; 2] = [AppointmentStatus::Booked, AppointmentStatus::Confirmed];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Missed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Rescheduled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "booked"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Missed => write!(f, "missed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

/// Fixed reminder windows ahead of `scheduled_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderWindow {
    DayBefore,
    HourBefore,
    QuarterHourBefore,
}

impl ReminderWindow {
    pub const ALL: [ReminderWindow; 3] = [
        ReminderWindow::DayBefore,
        ReminderWindow::HourBefore,
        ReminderWindow::QuarterHourBefore,
    ];

    /// Half-width of the match window around `now + lead`.
    pub const TOLERANCE_MINUTES: i64 = 5;

    pub fn label(&self) -> &'static str {
        match self {
            ReminderWindow::DayBefore => "24h",
            ReminderWindow::HourBefore => "1h",
            ReminderWindow::QuarterHourBefore => "15min",
        }
    }

    pub fn lead(&self) -> Duration {
        match self {
            ReminderWindow::DayBefore => Duration::hours(24),
            ReminderWindow::HourBefore => Duration::hours(1),
            ReminderWindow::QuarterHourBefore => Duration::minutes(15),
        }
    }

    /// `[now + lead - 5min, now + lead + 5min]`
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let center = now + self.lead();
        let tolerance = Duration::minutes(Self::TOLERANCE_MINUTES);
        (center - tolerance, center + tolerance)
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            ReminderWindow::DayBefore => "tomorrow",
            ReminderWindow::HourBefore => "in 1 hour",
            ReminderWindow::QuarterHourBefore => "in 15 minutes",
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Required when a doctor schedules for a patient.
    pub patient_session_id: Option<Uuid>,
    /// Required when a patient books with a doctor.
    pub doctor_id: Option<Uuid>,
    pub consultation_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub grace_period_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_scheduled_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

/// Ids returned by the `reschedule_appointment` procedure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RescheduleOutcome {
    pub original_appointment_id: Uuid,
    pub new_appointment_id: Uuid,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub transitioned: Vec<Uuid>,
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReminderReport {
    /// `(window label, appointment id)` for every reminder sent.
    pub sent: Vec<(String, Uuid)>,
    pub failed: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Patient session is not active")]
    SessionInactive,

    #[error(transparent)]
    Doctor(#[from] DoctorError),

    #[error("Doctor already has an appointment near this time")]
    ConflictDetected,

    #[error("Appointment is {0} and cannot move to {1}")]
    InvalidStatusTransition(AppointmentStatus, AppointmentStatus),

    #[error("Appointment can only be started between {0} and {1}")]
    OutsideStartWindow(DateTime<Utc>, DateTime<Utc>),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound(err.to_string()),
            AppointmentError::InvalidTime(_)
            | AppointmentError::Validation(_)
            | AppointmentError::SessionInactive
            | AppointmentError::OutsideStartWindow(..) => AppError::Validation(err.to_string()),
            AppointmentError::Doctor(e) => e.into(),
            AppointmentError::ConflictDetected | AppointmentError::InvalidStatusTransition(..) => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reminder_bounds_are_centered_on_lead() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let (lo, hi) = ReminderWindow::HourBefore.bounds(now);
        assert_eq!(lo, Utc.with_ymd_and_hms(2025, 1, 10, 9, 55, 0).unwrap());
        assert_eq!(hi, Utc.with_ymd_and_hms(2025, 1, 10, 10, 5, 0).unwrap());
        assert_eq!(ReminderWindow::DayBefore.label(), "24h");
    }

    #[test]
    fn superseded_and_missed_are_terminal() {
        assert!(AppointmentStatus::Rescheduled.is_terminal());
        assert!(AppointmentStatus::Missed.is_terminal());
        assert!(!AppointmentStatus::Confirmed.is_terminal());
        assert_eq!(AppointmentStatus::InProgress.to_string(), "in_progress");
    }
}
