// =====================================================================================
// EVENT LOG SERVICE - ERROR AND AUDIT TRAIL
// =====================================================================================

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_database::{StoreError, SupabaseClient};

use crate::models::{EventLevel, EventLogEntry};

#[derive(Clone)]
pub struct EventLogService {
    supabase: SupabaseClient,
}

impl EventLogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn log_to_tracing(entry: &EventLogEntry) {
        let identity = entry.identity.as_deref().unwrap_or("anon");
        match entry.level {
            EventLevel::Info => info!(
                function = %entry.function_name,
                identity = %identity,
                "EVENT: {}", entry.action
            ),
            EventLevel::Warn => warn!(
                function = %entry.function_name,
                identity = %identity,
                metadata = %entry.metadata,
                "EVENT: {}", entry.action
            ),
            EventLevel::Error => error!(
                function = %entry.function_name,
                identity = %identity,
                metadata = %entry.metadata,
                "EVENT: {}", entry.action
            ),
        }
    }

    pub async fn record(&self, entry: EventLogEntry) -> Result<(), StoreError> {
        Self::log_to_tracing(&entry);

        let _: Value = self
            .supabase
            .insert(
                "event_logs",
                json!({
                    "function_name": entry.function_name,
                    "level": entry.level,
                    "action": entry.action,
                    "identity": entry.identity,
                    "metadata": entry.metadata,
                }),
            )
            .await?;

        debug!("Event log row written");
        Ok(())
    }

    /// Writes the entry in the background; a failed write is only logged.
    pub fn record_detached(&self, entry: EventLogEntry) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.record(entry).await {
                warn!("Failed to persist event log entry: {}", e);
            }
        });
    }
}
