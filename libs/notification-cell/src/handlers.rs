use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use shared_models::auth::Identity;
use shared_models::error::AppError;
use shared_models::response::ok;

use crate::router::NotificationState;
use crate::services::NotificationService;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<NotificationState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state.config, state.push.clone());
    let limit = query.limit.unwrap_or(50).clamp(1, 100);

    let notifications = service.list_for(&identity, limit).await?;
    Ok(ok(notifications))
}

#[axum::debug_handler]
pub async fn mark_notification_read(
    State(state): State<NotificationState>,
    Extension(identity): Extension<Identity>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&state.config, state.push.clone());

    let notification = service.mark_read(&identity, notification_id).await?;
    Ok(ok(notification))
}
