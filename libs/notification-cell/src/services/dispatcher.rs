use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::{Notification, NotificationError};
use crate::services::notification::Notifier;

/// Queues notifications for a background worker so handlers return as soon
/// as their transition has committed. When the queue is full or the worker
/// is gone, the notification is delivered on its own task instead.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<Notification>,
    inner: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn spawn(inner: Arc<dyn Notifier>, capacity: usize, timeout: Duration) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Notification>(capacity);

        let worker = inner.clone();
        tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                deliver_with_timeout(worker.as_ref(), notification, timeout).await;
            }
            debug!("Notification dispatcher stopped");
        });

        Self { sender, inner, timeout }
    }

    fn overflow(&self, notification: Notification) {
        let inner = self.inner.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            deliver_with_timeout(inner.as_ref(), notification, timeout).await;
        });
    }
}

async fn deliver_with_timeout(inner: &dyn Notifier, notification: Notification, timeout: Duration) {
    let title = notification.title.clone();
    if tokio::time::timeout(timeout, inner.notify(notification)).await.is_err() {
        warn!("Notification '{}' timed out after {:?}", title, timeout);
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn notify(&self, notification: Notification) {
        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(notification)) => {
                warn!("Notification queue full; delivering '{}' directly", notification.title);
                self.overflow(notification);
            }
            Err(TrySendError::Closed(notification)) => {
                warn!("Notification worker stopped; delivering '{}' directly", notification.title);
                self.overflow(notification);
            }
        }
    }

    /// Bypasses the queue so the caller learns whether the records landed.
    async fn deliver_now(&self, notification: Notification) -> Result<usize, NotificationError> {
        tokio::time::timeout(self.timeout, self.inner.deliver_now(notification))
            .await
            .map_err(|_| NotificationError::TimedOut)?
    }
}
