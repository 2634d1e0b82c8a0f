//! REST endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use clinic_chat_sync::{
    domain::{InboxTab, PushEventKind},
    infrastructure::dto::http::{
        AvailabilityDto, ConversationDto, MessageDto, SendMessageRequestDto,
        StartChatResponseDto, UnreadSummaryDto,
    },
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    auth::Caller,
    error::ApiFailure,
    state::{AppState, encode_event},
};

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub tab: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub is_available: bool,
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn start_chat(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<StartChatResponseDto>, ApiFailure> {
    let now = state.clock.now();
    let started = state.clinic.lock().await.start(&caller, now)?;
    Ok(Json(started))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MessageDto>>, ApiFailure> {
    let messages = state.clinic.lock().await.messages(&caller, id)?;
    Ok(Json(messages))
}

/// Store the message, then push it to the conversation group and the
/// counterpart's connections, followed by their new unread summary.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(request): Json<SendMessageRequestDto>,
) -> Result<Json<MessageDto>, ApiFailure> {
    let now = state.clock.now();
    let delivery = state
        .clinic
        .lock()
        .await
        .send(&caller, id, &request.text, now)?;
    tracing::info!("{} sent message {} in {}", caller, delivery.message.id, id);

    match encode_event(PushEventKind::Message, &delivery.message) {
        Some(frame) => {
            let reached = state.hub.fan_out(Some(id), &delivery.notify, &frame).await;
            tracing::debug!("Message {} pushed to {} connection(s)", delivery.message.id, reached);
        }
        None => tracing::warn!("Failed to encode message {}", delivery.message.id),
    }
    state.push_unread(&delivery.notify).await;

    Ok(Json(delivery.message))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiFailure> {
    state.clinic.lock().await.mark_read(&caller, id)?;
    state.push_unread(&[caller]).await;
    Ok(Json(json!({"conversationId": id, "read": true})))
}

pub async fn unread_summary(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Json<UnreadSummaryDto> {
    Json(state.clinic.lock().await.unread_for(&caller))
}

pub async fn secretary_inbox(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Vec<ConversationDto>>, ApiFailure> {
    let tab = match query.tab.as_deref() {
        None => InboxTab::default(),
        Some(raw) => raw
            .parse::<InboxTab>()
            .map_err(|e| ApiFailure::BadRequest(e.to_string()))?,
    };
    let inbox = state.clinic.lock().await.inbox(&caller, tab)?;
    Ok(Json(inbox))
}

pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityDto>, ApiFailure> {
    let now = state.clock.now();
    let availability = state
        .clinic
        .lock()
        .await
        .set_availability(&caller, query.is_available, now)?;
    Ok(Json(availability))
}
