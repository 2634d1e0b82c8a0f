//! Shared application state.

use std::sync::Arc;

use clinic_chat_shared::time::Clock;
use clinic_chat_sync::{
    domain::PushEventKind,
    infrastructure::dto::{http::UnreadSummaryDto, push::HubFrame},
};
use tokio::sync::Mutex;

use crate::{auth::Caller, domain::Clinic, hub::Hub};

pub struct AppState {
    /// 会話データ
    pub clinic: Mutex<Clinic>,
    /// プッシュ配信
    pub hub: Hub,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(clinic: Clinic, clock: Arc<dyn Clock>) -> Self {
        Self {
            clinic: Mutex::new(clinic),
            hub: Hub::new(),
            clock,
        }
    }

    /// Push each user's current unread summary to their connections
    pub async fn push_unread(&self, users: &[Caller]) {
        for user in users {
            let summary: UnreadSummaryDto = self.clinic.lock().await.unread_for(user);
            match encode_event(PushEventKind::Unread, &summary) {
                Some(frame) => {
                    self.hub.fan_out(None, std::slice::from_ref(user), &frame).await;
                }
                None => tracing::warn!("Failed to encode unread summary for {}", user),
            }
        }
    }
}

/// Serialize an event frame
pub fn encode_event<T: serde::Serialize>(kind: PushEventKind, payload: &T) -> Option<String> {
    HubFrame::event(kind, payload)
        .and_then(|frame| serde_json::to_string(&frame))
        .ok()
}
