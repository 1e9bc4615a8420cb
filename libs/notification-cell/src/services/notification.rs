// =====================================================================================
// NOTIFICATION SERVICE - PERSISTED INBOX + PUSH FAN-OUT
// =====================================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::Identity;

use crate::models::{
    Notification, NotificationError, NotificationRecord, NotificationTarget, PushMessage, PushTokenRow, Recipient,
};
use crate::services::push::PushProvider;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best-effort delivery. Implementations never fail the caller.
    async fn notify(&self, notification: Notification);

    /// Delivers before returning. `Ok` means every recipient's in-app row
    /// was written; push failures after that point do not count.
    async fn deliver_now(&self, notification: Notification) -> Result<usize, NotificationError>;
}

pub struct NotificationService {
    supabase: SupabaseClient,
    push: Arc<dyn PushProvider>,
}

impl NotificationService {
    pub fn new(config: &AppConfig, push: Arc<dyn PushProvider>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            push,
        }
    }

    async fn resolve(&self, target: &NotificationTarget) -> Result<Vec<Recipient>, NotificationError> {
        match target {
            NotificationTarget::User(id) => Ok(vec![Recipient::User(*id)]),
            NotificationTarget::Session(id) => Ok(vec![Recipient::Session(*id)]),
            NotificationTarget::Doctors(service_type) => {
                let path = format!(
                    "/rest/v1/doctors?select=id&is_verified=eq.true&is_available=eq.true&is_suspended=eq.false&service_types=cs.%7B{}%7D",
                    service_type
                );
                let rows: Vec<Value> = self.supabase.select(&path).await?;
                Ok(rows
                    .iter()
                    .filter_map(|row| row["id"].as_str())
                    .filter_map(|id| Uuid::parse_str(id).ok())
                    .map(Recipient::User)
                    .collect())
            }
        }
    }

    async fn persist(&self, recipient: Recipient, notification: &Notification) -> Result<(), NotificationError> {
        let mut row = json!({
            "title": notification.title,
            "body": notification.body,
            "notification_type": notification.kind,
            "metadata": notification.metadata,
            "is_read": false,
        });
        row[recipient.column()] = json!(recipient.id());

        let _: Value = self.supabase.insert("notifications", row).await?;
        Ok(())
    }

    async fn push_tokens(&self, recipient: Recipient) -> Result<Vec<String>, NotificationError> {
        let column = match recipient {
            Recipient::User(_) => "user_id",
            Recipient::Session(_) => "session_id",
        };
        let path = format!("/rest/v1/push_tokens?select=token&{}=eq.{}", column, recipient.id());
        let rows: Vec<PushTokenRow> = self.supabase.select(&path).await?;
        Ok(rows.into_iter().map(|row| row.token).collect())
    }

    async fn push_to(&self, recipient: Recipient, notification: &Notification) -> Result<(), NotificationError> {
        let messages: Vec<PushMessage> = self
            .push_tokens(recipient)
            .await?
            .into_iter()
            .map(|token| PushMessage {
                to: token,
                title: notification.title.clone(),
                body: notification.body.clone(),
                data: json!({ "type": notification.kind, "metadata": notification.metadata }),
                sound: "default",
            })
            .collect();

        if messages.is_empty() {
            debug!("No push tokens for {:?}; in-app record only", recipient);
            return Ok(());
        }

        self.push.send(&messages).await
    }

    /// Persists the in-app row first so a missing push token or a provider
    /// outage never loses the record.
    async fn deliver_to(&self, recipient: Recipient, notification: &Notification) -> Result<(), NotificationError> {
        self.persist(recipient, notification).await?;

        if let Err(e) = self.push_to(recipient, notification).await {
            warn!("Push to {:?} failed after persisting: {}", recipient, e);
        }
        Ok(())
    }

    /// Fans out to every recipient. Fails when any in-app row could not be
    /// written, after attempting all of them.
    #[instrument(skip(self, notification), fields(title = %notification.title))]
    pub async fn deliver(&self, notification: &Notification) -> Result<usize, NotificationError> {
        let recipients = self.resolve(&notification.target).await?;
        let attempted = recipients.len();
        let mut delivered = 0;

        for recipient in recipients {
            match self.deliver_to(recipient, notification).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Notification to {:?} failed: {}", recipient, e),
            }
        }

        info!("Notification '{}' delivered to {} of {} recipients", notification.title, delivered, attempted);
        if delivered < attempted {
            return Err(NotificationError::Undelivered {
                attempted,
                failed: attempted - delivered,
            });
        }
        Ok(delivered)
    }

    // ==============================================================================
    // IN-APP INBOX
    // ==============================================================================

    fn recipient_of(identity: &Identity) -> Recipient {
        match identity.session_id() {
            Some(session_id) => Recipient::Session(session_id),
            None => Recipient::User(identity.user_id().unwrap_or_else(Uuid::nil)),
        }
    }

    pub async fn list_for(&self, identity: &Identity, limit: u32) -> Result<Vec<NotificationRecord>, NotificationError> {
        let recipient = Self::recipient_of(identity);
        let path = format!(
            "/rest/v1/notifications?{}=eq.{}&order=created_at.desc&limit={}",
            recipient.column(),
            recipient.id(),
            limit
        );
        Ok(self.supabase.select(&path).await?)
    }

    pub async fn mark_read(&self, identity: &Identity, notification_id: Uuid) -> Result<NotificationRecord, NotificationError> {
        let recipient = Self::recipient_of(identity);
        let path = format!(
            "/rest/v1/notifications?id=eq.{}&{}=eq.{}",
            notification_id,
            recipient.column(),
            recipient.id()
        );
        let rows: Vec<NotificationRecord> = self.supabase.update(&path, json!({ "is_read": true })).await?;
        rows.into_iter().next().ok_or(NotificationError::NotFound)
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.deliver(&notification).await {
            warn!("Notification '{}' dropped: {}", notification.title, e);
        }
    }

    async fn deliver_now(&self, notification: Notification) -> Result<usize, NotificationError> {
        self.deliver(&notification).await
    }
}
