//! reqwest を使った [`ChatApi`] 実装

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    Client, Method, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    domain::{
        ApiError, Availability, ChatApi, Conversation, ConversationId, InboxTab, Message,
        StartedConversation, TokenProvider, UnreadSummary,
    },
    infrastructure::dto::{
        http::{
            AvailabilityDto, ConversationDto, MessageDto, SendMessageRequestDto,
            StartChatResponseDto, UnreadSummaryDto,
        },
        normalize::decode,
    },
};

pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token_provider: Arc<dyn TokenProvider>,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_client(Client::new(), base_url, token_provider)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_provider,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = self.token_provider.token() {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!("API error ({}) on {}: {}", status, url, text);
            return Err(classify_status(status, text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let value = self.request(method, path, query, body).await?;
        decode(value).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// 2xx 以外のレスポンスを [`ApiError`] に変換
pub fn classify_status(status: StatusCode, body: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(body),
        _ => ApiError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

fn messages_path(id: ConversationId) -> String {
    format!("/chat/conversations/{}/messages", id)
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn start_conversation(&self) -> Result<StartedConversation, ApiError> {
        let dto: StartChatResponseDto = self.fetch(Method::POST, "/chat/start", &[], None).await?;
        StartedConversation::try_from(dto).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn list_messages(&self, id: ConversationId) -> Result<Vec<Message>, ApiError> {
        let dtos: Vec<MessageDto> = self
            .fetch(Method::GET, &messages_path(id), &[], None)
            .await?;
        Ok(dtos.into_iter().map(Message::from).collect())
    }

    async fn send_message(&self, id: ConversationId, text: &str) -> Result<Message, ApiError> {
        let body = serde_json::to_value(SendMessageRequestDto {
            text: text.to_string(),
        })
        .map_err(|e| ApiError::Decode(e.to_string()))?;
        let dto: MessageDto = self
            .fetch(Method::POST, &messages_path(id), &[], Some(body))
            .await?;
        Ok(dto.into())
    }

    async fn mark_read(&self, id: ConversationId) -> Result<(), ApiError> {
        let path = format!("/chat/conversations/{}/read", id);
        self.request(Method::POST, &path, &[], None).await?;
        Ok(())
    }

    async fn unread_summary(&self) -> Result<UnreadSummary, ApiError> {
        let dto: UnreadSummaryDto = self.fetch(Method::GET, "/chat/unread", &[], None).await?;
        Ok(dto.into())
    }

    async fn staff_inbox(&self, tab: InboxTab) -> Result<Vec<Conversation>, ApiError> {
        let dtos: Vec<ConversationDto> = self
            .fetch(
                Method::GET,
                "/chat/secretary/inbox",
                &[("tab", tab.as_str().to_string())],
                None,
            )
            .await?;
        dtos.into_iter()
            .map(|dto| Conversation::try_from(dto).map_err(|e| ApiError::Decode(e.to_string())))
            .collect()
    }

    async fn set_availability(&self, available: bool) -> Result<Availability, ApiError> {
        let dto: AvailabilityDto = self
            .fetch(
                Method::POST,
                "/chat/secretary/availability",
                &[("isAvailable", available.to_string())],
                None,
            )
            .await?;
        Ok(dto.into())
    }
}
