use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{Notification, NotificationError, NotificationTarget};
use crate::services::Notifier;

/// Notifier that keeps everything it is handed, for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn count_titled(&self, title: &str) -> usize {
        self.sent().iter().filter(|n| n.title == title).count()
    }

    pub fn targets_titled(&self, title: &str) -> Vec<NotificationTarget> {
        self.sent()
            .into_iter()
            .filter(|n| n.title == title)
            .map(|n| n.target)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }

    async fn deliver_now(&self, notification: Notification) -> Result<usize, NotificationError> {
        self.notify(notification).await;
        Ok(1)
    }
}
