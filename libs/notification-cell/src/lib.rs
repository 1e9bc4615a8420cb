// =====================================================================================
// NOTIFICATION CELL - FAN-OUT AFTER COMMITTED TRANSITIONS
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod test_utils;

pub use models::{Notification, NotificationError, NotificationTarget};
pub use router::{notification_routes, NotificationState};
pub use services::{ExpoPushClient, NotificationDispatcher, NotificationService, Notifier, PushProvider};
