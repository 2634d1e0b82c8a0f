//! ドメイン層: エンティティ、値オブジェクト、各コンポーネントが依存する trait

pub mod api;
pub mod channel;
pub mod entity;
pub mod error;
pub mod notifier;
pub mod token;
pub mod value_object;

pub use api::ChatApi;
pub use channel::{EventHandler, HandlerId, HubMethod, PushChannel, PushEvent, PushEventKind};
pub use entity::{
    Availability, ConnectionState, Conversation, Message, StartedConversation, UnreadSummary,
};
pub use error::{
    ApiError, ConnectError, InvokeError, SendError, SendFailure, ValueObjectError,
};
pub use notifier::{Alert, AlertSource, Notice, NoticeLevel, Notifier};
pub use token::TokenProvider;
pub use value_object::{ConversationId, ConversationStatus, InboxTab, MessageId, SenderRole};
