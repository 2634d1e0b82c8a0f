//! 会話ごとの重複排除済みメッセージ一覧
//!
//! push とポーリングは同じ 2 つの操作に流し込むので、2 つの経路の到着順は
//! 問題になりません。1 つの ID が一覧に入るのは高々 1 回です。
//! サーバーから届いた順序はそのまま保ち、ここで並べ替えはしません。

use std::collections::{HashMap, HashSet};

use crate::domain::{ConversationId, Message, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    Duplicate,
    /// メッセージの会話がキャッシュされていない
    NotLoaded,
}

#[derive(Debug, Default)]
struct Transcript {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl Transcript {
    fn push(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    transcripts: HashMap<ConversationId, Transcript>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全件取得した一覧を正として置き換える
    ///
    /// 重複した ID は最初のものを残し、
    /// 別の会話のメッセージは捨てる。
    pub fn replace(&mut self, id: ConversationId, messages: Vec<Message>) {
        let mut transcript = Transcript::default();
        for message in messages {
            if message.conversation_id != id {
                tracing::debug!(
                    "Dropping message {} of conversation {} from fetch of {}",
                    message.id,
                    message.conversation_id,
                    id
                );
                continue;
            }
            transcript.push(message);
        }
        self.transcripts.insert(id, transcript);
    }

    pub fn merge_append(&mut self, message: Message) -> MergeOutcome {
        let Some(transcript) = self.transcripts.get_mut(&message.conversation_id) else {
            return MergeOutcome::NotLoaded;
        };
        if transcript.push(message) {
            MergeOutcome::Appended
        } else {
            MergeOutcome::Duplicate
        }
    }

    pub fn messages(&self, id: ConversationId) -> &[Message] {
        self.transcripts
            .get(&id)
            .map(|t| t.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: ConversationId, message: MessageId) -> bool {
        self.transcripts
            .get(&id)
            .is_some_and(|t| t.ids.contains(&message))
    }

    pub fn is_loaded(&self, id: ConversationId) -> bool {
        self.transcripts.contains_key(&id)
    }

    pub fn evict(&mut self, id: ConversationId) {
        self.transcripts.remove(&id);
    }
}
