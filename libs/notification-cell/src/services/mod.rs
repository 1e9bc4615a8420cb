pub mod dispatcher;
pub mod notification;
pub mod push;

pub use dispatcher::NotificationDispatcher;
pub use notification::{NotificationService, Notifier};
pub use push::{ExpoPushClient, PushProvider};
