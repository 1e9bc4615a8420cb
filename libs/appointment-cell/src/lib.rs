// =====================================================================================
// APPOINTMENT CELL - SCHEDULING, RESCHEDULE AND TIME-DRIVEN TRANSITIONS
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Appointment, AppointmentError, AppointmentStatus, ReminderWindow};
pub use router::{appointment_cron_routes, appointment_routes, AppointmentCronState, AppointmentState};
pub use services::{AppointmentService, AppointmentSweeper};
