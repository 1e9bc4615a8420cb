// libs/appointment-cell/src/services/sweeps.rs
//
// Time-driven transitions, triggered by the scheduler on a fixed cadence.
// Both sweeps are safe to re-run and to run concurrently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use notification_cell::{Notification, NotificationError, NotificationTarget, Notifier};
use shared_config::AppConfig;
use shared_database::{filter_timestamp, SupabaseClient, Transition};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, ReminderReport, ReminderWindow, SweepReport};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::scheduler::{format_time, TABLE};

pub struct AppointmentSweeper {
    supabase: SupabaseClient,
    lifecycle: AppointmentLifecycleService,
    notifier: Arc<dyn Notifier>,
}

impl AppointmentSweeper {
    pub fn new(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: AppointmentLifecycleService::new(),
            notifier,
        }
    }

    /// Moves every booked or confirmed appointment past its grace deadline to
    /// `missed`. The status-conditioned update lets exactly one concurrent
    /// sweeper win per appointment; only the winner notifies.
    #[instrument(skip(self))]
    pub async fn mark_missed(&self, now: DateTime<Utc>) -> Result<SweepReport, AppointmentError> {
        let path = format!(
            "/rest/v1/{}?status=in.(booked,confirmed)&scheduled_at=lt.{}&order=scheduled_at.asc",
            TABLE,
            filter_timestamp(now)
        );
        let candidates: Vec<Appointment> = self.supabase.select(&path).await?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for appointment in candidates {
            if !self.lifecycle.is_past_deadline(&appointment, now) {
                report.skipped += 1;
                continue;
            }

            let transition = Transition::new(
                TABLE,
                appointment.id,
                &AppointmentStatus::UPCOMING,
                AppointmentStatus::Missed,
            );

            let missed = match transition.apply::<Appointment>(&self.supabase).await {
                Ok(Some(missed)) => missed,
                Ok(None) => {
                    debug!("Appointment {} already transitioned elsewhere", appointment.id);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!("Failed to mark appointment {} missed: {}", appointment.id, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let when = format_time(missed.scheduled_at);
            for (target, body) in [
                (
                    NotificationTarget::User(missed.doctor_id),
                    format!("The appointment on {} was missed", when),
                ),
                (
                    NotificationTarget::Session(missed.patient_session_id),
                    format!("Your appointment on {} was missed", when),
                ),
            ] {
                self.notifier
                    .notify(
                        Notification::new(target, "Appointment Missed", body, "appointment_missed")
                            .with_metadata(json!({ "appointment_id": missed.id })),
                    )
                    .await;
            }

            report.transitioned.push(missed.id);
        }

        info!(
            "Missed sweep: {} examined, {} marked missed",
            report.examined,
            report.transitioned.len()
        );
        Ok(report)
    }

    /// Sends the 24h / 1h / 15min reminders. The window label is appended
    /// only after both in-app records were written, so a failure or crash in
    /// between leads to a repeat reminder on the next run rather than a lost one.
    #[instrument(skip(self))]
    pub async fn send_reminders(&self, now: DateTime<Utc>) -> Result<ReminderReport, AppointmentError> {
        let mut report = ReminderReport::default();

        for window in ReminderWindow::ALL {
            let (from, to) = window.bounds(now);
            let path = format!(
                "/rest/v1/{}?status=eq.confirmed&scheduled_at=gte.{}&scheduled_at=lte.{}&reminders_sent=not.cs.%7B{}%7D",
                TABLE,
                filter_timestamp(from),
                filter_timestamp(to),
                window.label()
            );
            let due: Vec<Appointment> = self.supabase.select(&path).await?;

            for appointment in due.into_iter().filter(|a| !a.has_reminder(window.label())) {
                if let Err(e) = self.remind(&appointment, window).await {
                    warn!("{} reminder for {} not delivered: {}", window.label(), appointment.id, e);
                    report.failed += 1;
                    continue;
                }

                let mut labels = appointment.reminders_sent.clone();
                labels.push(window.label().to_string());

                let update = format!("/rest/v1/{}?id=eq.{}", TABLE, appointment.id);
                match self
                    .supabase
                    .update::<Appointment>(&update, json!({ "reminders_sent": labels }))
                    .await
                {
                    Ok(_) => report.sent.push((window.label().to_string(), appointment.id)),
                    Err(e) => {
                        error!("Failed to record {} reminder for {}: {}", window.label(), appointment.id, e);
                        report.failed += 1;
                    }
                }
            }
        }

        info!("Reminder sweep: {} sent, {} failed", report.sent.len(), report.failed);
        Ok(report)
    }

    /// Delivers to both parties, attempting the second even when the first fails.
    async fn remind(&self, appointment: &Appointment, window: ReminderWindow) -> Result<(), NotificationError> {
        let body = format!(
            "Your appointment is {} ({})",
            window.phrase(),
            format_time(appointment.scheduled_at)
        );

        let mut outcome = Ok(());
        for target in [
            NotificationTarget::Session(appointment.patient_session_id),
            NotificationTarget::User(appointment.doctor_id),
        ] {
            let delivered = self
                .notifier
                .deliver_now(
                    Notification::new(target, "Appointment Reminder", body.clone(), "appointment_reminder")
                        .with_metadata(json!({
                            "appointment_id": appointment.id,
                            "window": window.label(),
                        })),
                )
                .await;
            if let Err(e) = delivered {
                outcome = Err(e);
            }
        }
        outcome
    }
}
