//! DTO とドメインエンティティの変換ロジック

use crate::domain::{
    Availability, Conversation, ConversationId, ConversationStatus, Message, MessageId,
    SenderRole, StartedConversation, UnreadSummary, ValueObjectError,
};

use super::http::{
    AvailabilityDto, ConversationDto, MessageDto, StartChatResponseDto, UnreadSummaryDto,
};

/// ワイヤ上の件数は符号付きなので、0 未満は 0 として扱う
pub fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

// ========================================
// DTO → Domain Entity
// ========================================

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        Self {
            id: MessageId::new(dto.id),
            conversation_id: ConversationId::new(dto.conversation_id),
            sender_role: SenderRole::parse(&dto.sender_role),
            sender_user_id: dto.sender_user_id,
            text: dto.text,
            sent_at: dto.sent_at,
            read_at: dto.read_at,
        }
    }
}

impl From<UnreadSummaryDto> for UnreadSummary {
    fn from(dto: UnreadSummaryDto) -> Self {
        Self {
            unread_messages: clamp_count(dto.unread_messages),
            unread_conversations: dto.unread_conversations.map(clamp_count),
        }
    }
}

impl TryFrom<ConversationDto> for Conversation {
    type Error = ValueObjectError;

    fn try_from(dto: ConversationDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ConversationId::new(dto.id),
            patient_id: dto.patient_id,
            counterpart_name: dto.patient_name.unwrap_or_default(),
            status: dto.status.parse::<ConversationStatus>()?,
            assigned_staff_id: dto.assigned_secretary_id,
            created_at: dto.created_at,
            closed_at: dto.closed_at,
            last_message_at: dto.last_message_at,
            unread_count: clamp_count(dto.unread_count),
        })
    }
}

impl TryFrom<StartChatResponseDto> for StartedConversation {
    type Error = ValueObjectError;

    fn try_from(dto: StartChatResponseDto) -> Result<Self, Self::Error> {
        Ok(Self {
            conversation_id: ConversationId::new(dto.conversation_id),
            status: dto.status.parse::<ConversationStatus>()?,
            has_secretary: dto.has_secretary,
            info_message: dto.info_message.filter(|m| !m.trim().is_empty()),
        })
    }
}

impl From<AvailabilityDto> for Availability {
    fn from(dto: AvailabilityDto) -> Self {
        Self {
            secretary_id: dto.secretary_id,
            is_available: dto.is_available,
            updated_at: dto.updated_at,
        }
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&Message> for MessageDto {
    fn from(model: &Message) -> Self {
        Self {
            id: model.id.value(),
            conversation_id: model.conversation_id.value(),
            sender_user_id: model.sender_user_id,
            sender_role: model.sender_role.as_str().to_string(),
            text: model.text.clone(),
            sent_at: model.sent_at,
            read_at: model.read_at,
        }
    }
}

impl From<&Conversation> for ConversationDto {
    fn from(model: &Conversation) -> Self {
        Self {
            id: model.id.value(),
            patient_id: model.patient_id,
            patient_name: Some(model.counterpart_name.clone()),
            assigned_secretary_id: model.assigned_staff_id,
            status: model.status.as_str().to_string(),
            created_at: model.created_at,
            closed_at: model.closed_at,
            last_message_at: model.last_message_at,
            unread_count: i64::from(model.unread_count),
        }
    }
}

impl From<UnreadSummary> for UnreadSummaryDto {
    fn from(model: UnreadSummary) -> Self {
        Self {
            unread_messages: i64::from(model.unread_messages),
            unread_conversations: model.unread_conversations.map(i64::from),
        }
    }
}
