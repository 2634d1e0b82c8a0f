//! Push hub WebSocket handler.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use clinic_chat_sync::{
    domain::HubMethod,
    infrastructure::dto::push::{HubFrame, decode_frame},
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    auth::Caller,
    error::HubError,
    hub::{ConnectionId, PusherChannel},
    state::AppState,
};

pub async fn hub_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> impl IntoResponse {
    tracing::info!("Hub connection from {}", caller);
    ws.on_upgrade(move |socket| handle_socket(socket, state, caller))
}

/// Forward frames queued for this connection to the socket
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, caller: Caller) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let (id, close) = state.hub.register(caller, tx.clone()).await;

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Hub connection {} error: {}", id, e);
                    break;
                }
            };
            match message {
                Message::Text(text) => handle_text(&recv_state, id, caller, &tx, &text).await,
                Message::Close(_) => {
                    tracing::info!("Hub connection {} closed by {}", id, caller);
                    break;
                }
                _ => {}
            }
        }
    });
    let mut send_task = pusher_loop(rx, sender);

    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
        _ = close => {
            tracing::info!("Hub connection {} dropped by the server", id);
            recv_task.abort();
            send_task.abort();
        }
    };

    state.hub.unregister(id).await;
}

async fn handle_text(
    state: &AppState,
    id: ConnectionId,
    caller: Caller,
    tx: &PusherChannel,
    text: &str,
) {
    let (invocation_id, method, arguments) = match decode_frame(text) {
        Ok(HubFrame::Invoke {
            invocation_id,
            method,
            arguments,
        }) => (invocation_id, method, arguments),
        Ok(other) => {
            tracing::debug!("Ignoring client frame {:?}", other);
            return;
        }
        Err(e) => {
            tracing::warn!("Connection {} sent a malformed frame: {}", id, e);
            return;
        }
    };

    let error = invoke(state, id, caller, &method, &arguments)
        .await
        .err()
        .map(|e| {
            tracing::warn!("{} from {} failed: {}", method, caller, e);
            e.to_string()
        });
    let completion = HubFrame::Completion {
        invocation_id,
        error,
    };
    match serde_json::to_string(&completion) {
        Ok(frame) => {
            if tx.send(frame).is_err() {
                tracing::debug!("Connection {} gone before completion", id);
            }
        }
        Err(e) => tracing::warn!("Failed to encode completion: {}", e),
    }
}

async fn invoke(
    state: &AppState,
    id: ConnectionId,
    caller: Caller,
    method: &str,
    arguments: &[Value],
) -> Result<(), HubError> {
    if state.hub.fails_invocations() {
        return Err(HubError::Disabled);
    }
    let join = match method {
        m if m == HubMethod::JoinConversation.as_str() => true,
        m if m == HubMethod::LeaveConversation.as_str() => false,
        other => return Err(HubError::UnknownMethod(other.to_string())),
    };
    let conversation = arguments
        .first()
        .and_then(Value::as_i64)
        .ok_or(HubError::InvalidArgument)?;

    if join {
        if !state.clinic.lock().await.can_access(&caller, conversation) {
            return Err(HubError::NotAccessible(conversation));
        }
        state.hub.join(id, conversation).await;
    } else {
        state.hub.leave(id, conversation).await;
    }
    Ok(())
}
