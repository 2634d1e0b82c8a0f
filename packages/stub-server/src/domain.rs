//! In-memory clinic chat data.
//!
//! ## 責務
//!
//! - 会話とメッセージを保持する
//! - 既読位置からロールごとの未読数を算出する
//! - 秘書の受信箱タブと対応可否を管理する
//!
//! Unread counts are derived, never stored: a conversation's unread count
//! for one side is the number of messages from the other side after that
//! side's last read receipt.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use clinic_chat_sync::{
    domain::{ConversationStatus, InboxTab},
    infrastructure::dto::http::{
        AvailabilityDto, ConversationDto, MessageDto, StartChatResponseDto, UnreadSummaryDto,
    },
};

use crate::{
    auth::{Caller, CallerRole},
    error::ApiFailure,
};

pub const NO_SECRETARY_MESSAGE: &str =
    "No secretary is available right now. Leave a message and we will reply soon.";

#[derive(Debug, Clone)]
struct ConversationRecord {
    id: i64,
    patient_id: i64,
    assigned_secretary_id: Option<i64>,
    status: ConversationStatus,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    messages: Vec<MessageDto>,
    /// Last message id read by the patient
    patient_read: i64,
    /// Last message id read by staff
    staff_read: i64,
}

impl ConversationRecord {
    fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.sent_at)
    }

    fn unread_for(&self, role: CallerRole) -> i64 {
        let read = match role {
            CallerRole::Patient => self.patient_read,
            CallerRole::Secretary => self.staff_read,
        };
        let wants_patient_messages = role == CallerRole::Secretary;
        self.messages
            .iter()
            .filter(|m| m.id > read && (m.sender_role == "patient") == wants_patient_messages)
            .count() as i64
    }

    fn visible_to(&self, caller: &Caller) -> bool {
        match caller.role {
            CallerRole::Patient => self.patient_id == caller.user_id,
            CallerRole::Secretary => self
                .assigned_secretary_id
                .is_none_or(|id| id == caller.user_id),
        }
    }
}

/// Side effects of a sent message the hub has to fan out
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: MessageDto,
    /// Users whose unread summary changed
    pub notify: Vec<Caller>,
}

#[derive(Debug)]
pub struct Clinic {
    conversations: BTreeMap<i64, ConversationRecord>,
    patient_names: HashMap<i64, String>,
    availability: HashMap<i64, (bool, DateTime<Utc>)>,
    receipts: Vec<(Caller, i64)>,
    next_conversation_id: i64,
    next_message_id: i64,
}

impl Clinic {
    pub fn new() -> Self {
        Self {
            conversations: BTreeMap::new(),
            patient_names: HashMap::new(),
            availability: HashMap::new(),
            receipts: Vec::new(),
            next_conversation_id: 1,
            next_message_id: 1,
        }
    }

    /// Demo data: secretary 5 on duty, patient 1 in conversation 42 and
    /// patient 2 in conversation 41 with one unanswered message.
    pub fn seeded(now: DateTime<Utc>) -> Self {
        let mut clinic = Self::new();
        clinic.patient_names.insert(1, "Hana Sato".to_string());
        clinic.patient_names.insert(2, "Kenji Ito".to_string());
        clinic.availability.insert(5, (true, now));

        for (id, patient_id) in [(41, 2), (42, 1)] {
            clinic.conversations.insert(
                id,
                ConversationRecord {
                    id,
                    patient_id,
                    assigned_secretary_id: Some(5),
                    status: ConversationStatus::Open,
                    created_at: now - Duration::hours(1),
                    closed_at: None,
                    messages: Vec::new(),
                    patient_read: 0,
                    staff_read: 0,
                },
            );
        }
        clinic.next_conversation_id = 43;
        clinic.push_message(
            41,
            Caller::patient(2),
            "Can I move my appointment to Friday?",
            now - Duration::minutes(1),
        );
        clinic
    }

    pub fn add_patient(&mut self, user_id: i64, name: impl Into<String>) {
        self.patient_names.insert(user_id, name.into());
    }

    /// Read receipts in arrival order
    pub fn receipts(&self) -> &[(Caller, i64)] {
        &self.receipts
    }

    pub fn can_access(&self, caller: &Caller, id: i64) -> bool {
        self.conversations
            .get(&id)
            .is_some_and(|c| c.visible_to(caller))
    }

    /// Reuse the patient's live conversation or open a new one
    pub fn start(
        &mut self,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> Result<StartChatResponseDto, ApiFailure> {
        if caller.role != CallerRole::Patient {
            return Err(ApiFailure::Forbidden(
                "Only patients can start a conversation".to_string(),
            ));
        }
        let on_duty = self.on_duty_secretary();
        let existing = self
            .conversations
            .values()
            .find(|c| c.patient_id == caller.user_id && c.status != ConversationStatus::Closed)
            .map(|c| (c.id, c.status, c.assigned_secretary_id));

        let (id, status, assigned) = match existing {
            Some(found) => found,
            None => {
                let id = self.next_conversation_id;
                self.next_conversation_id += 1;
                let status = if on_duty.is_some() {
                    ConversationStatus::Open
                } else {
                    ConversationStatus::Waiting
                };
                self.conversations.insert(
                    id,
                    ConversationRecord {
                        id,
                        patient_id: caller.user_id,
                        assigned_secretary_id: on_duty,
                        status,
                        created_at: now,
                        closed_at: None,
                        messages: Vec::new(),
                        patient_read: 0,
                        staff_read: 0,
                    },
                );
                tracing::info!("Conversation {} created for {}", id, caller);
                (id, status, on_duty)
            }
        };

        let has_secretary = assigned.is_some() || on_duty.is_some();
        Ok(StartChatResponseDto {
            conversation_id: id,
            status: status.as_str().to_string(),
            has_secretary,
            info_message: (!has_secretary).then(|| NO_SECRETARY_MESSAGE.to_string()),
        })
    }

    pub fn messages(&self, caller: &Caller, id: i64) -> Result<Vec<MessageDto>, ApiFailure> {
        Ok(self.visible(caller, id)?.messages.clone())
    }

    pub fn send(
        &mut self,
        caller: &Caller,
        id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Delivery, ApiFailure> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiFailure::BadRequest("Message text is empty".to_string()));
        }
        let record = self.visible(caller, id)?;
        if record.status == ConversationStatus::Closed {
            return Err(ApiFailure::BadRequest(format!("Conversation {id} is closed")));
        }
        let message = self.push_message(id, *caller, text, now);

        let notify = match self.conversations.get(&id) {
            Some(record) if caller.is_staff() => vec![Caller::patient(record.patient_id)],
            Some(record) => match record.assigned_secretary_id {
                Some(secretary) => vec![Caller::secretary(secretary)],
                None => self.on_duty_staff(),
            },
            None => Vec::new(),
        };
        Ok(Delivery { message, notify })
    }

    pub fn mark_read(&mut self, caller: &Caller, id: i64) -> Result<(), ApiFailure> {
        self.visible(caller, id)?;
        if let Some(record) = self.conversations.get_mut(&id) {
            let last = record.messages.last().map(|m| m.id).unwrap_or_default();
            match caller.role {
                CallerRole::Patient => record.patient_read = last,
                CallerRole::Secretary => record.staff_read = last,
            }
        }
        self.receipts.push((*caller, id));
        tracing::debug!("{} read conversation {}", caller, id);
        Ok(())
    }

    pub fn unread_for(&self, caller: &Caller) -> UnreadSummaryDto {
        let counts: Vec<i64> = self
            .conversations
            .values()
            .filter(|c| c.visible_to(caller))
            .map(|c| c.unread_for(caller.role))
            .collect();
        let unread_messages = counts.iter().sum();
        match caller.role {
            CallerRole::Patient => UnreadSummaryDto {
                unread_messages,
                unread_conversations: None,
            },
            CallerRole::Secretary => UnreadSummaryDto {
                unread_messages,
                unread_conversations: Some(counts.iter().filter(|n| **n > 0).count() as i64),
            },
        }
    }

    /// Inbox page, most recent activity first
    pub fn inbox(&self, caller: &Caller, tab: InboxTab) -> Result<Vec<ConversationDto>, ApiFailure> {
        if !caller.is_staff() {
            return Err(ApiFailure::Forbidden("Staff only".to_string()));
        }
        let mut entries: Vec<&ConversationRecord> = self
            .conversations
            .values()
            .filter(|c| c.visible_to(caller))
            .filter(|c| match tab {
                InboxTab::Open => c.status != ConversationStatus::Closed,
                InboxTab::Waiting => c.status == ConversationStatus::Waiting,
                InboxTab::Closed => c.status == ConversationStatus::Closed,
            })
            .collect();
        entries.sort_by_key(|c| std::cmp::Reverse(c.last_message_at().unwrap_or(c.created_at)));
        Ok(entries
            .into_iter()
            .map(|c| ConversationDto {
                id: c.id,
                patient_id: Some(c.patient_id),
                patient_name: self.patient_names.get(&c.patient_id).cloned(),
                assigned_secretary_id: c.assigned_secretary_id,
                status: c.status.as_str().to_string(),
                created_at: Some(c.created_at),
                closed_at: c.closed_at,
                last_message_at: c.last_message_at(),
                unread_count: c.unread_for(CallerRole::Secretary),
            })
            .collect())
    }

    pub fn set_availability(
        &mut self,
        caller: &Caller,
        available: bool,
        now: DateTime<Utc>,
    ) -> Result<AvailabilityDto, ApiFailure> {
        if !caller.is_staff() {
            return Err(ApiFailure::Forbidden("Staff only".to_string()));
        }
        self.availability.insert(caller.user_id, (available, now));
        tracing::info!("{} is now {}", caller, if available { "available" } else { "away" });
        Ok(AvailabilityDto {
            secretary_id: Some(caller.user_id),
            is_available: available,
            updated_at: Some(now),
        })
    }

    fn visible(&self, caller: &Caller, id: i64) -> Result<&ConversationRecord, ApiFailure> {
        let record = self.conversations.get(&id).ok_or(ApiFailure::NotFound(id))?;
        if !record.visible_to(caller) {
            return Err(ApiFailure::Forbidden(format!(
                "Conversation {id} belongs to someone else"
            )));
        }
        Ok(record)
    }

    fn on_duty_secretary(&self) -> Option<i64> {
        self.on_duty_staff().first().map(|c| c.user_id)
    }

    fn on_duty_staff(&self) -> Vec<Caller> {
        let mut on_duty: Vec<i64> = self
            .availability
            .iter()
            .filter(|(_, (available, _))| *available)
            .map(|(id, _)| *id)
            .collect();
        on_duty.sort_unstable();
        on_duty.into_iter().map(Caller::secretary).collect()
    }

    /// Append a message; the sender has implicitly read everything up to it
    fn push_message(&mut self, id: i64, sender: Caller, text: &str, now: DateTime<Utc>) -> MessageDto {
        let message = MessageDto {
            id: self.next_message_id,
            conversation_id: id,
            sender_user_id: Some(sender.user_id),
            sender_role: sender.role.as_str().to_string(),
            text: text.to_string(),
            sent_at: now,
            read_at: None,
        };
        self.next_message_id += 1;
        if let Some(record) = self.conversations.get_mut(&id) {
            record.messages.push(message.clone());
            match sender.role {
                CallerRole::Patient => record.patient_read = message.id,
                CallerRole::Secretary => {
                    record.staff_read = message.id;
                    if record.assigned_secretary_id.is_none() {
                        record.assigned_secretary_id = Some(sender.user_id);
                        record.status = ConversationStatus::Open;
                    }
                }
            }
        }
        message
    }
}

impl Default for Clinic {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_seeded_inbox_order() {
        // テスト項目: シードデータでは直近にメッセージのある会話 41 が先頭に並ぶ
        // given (前提条件):
        let clinic = Clinic::seeded(now());

        // when (操作):
        let inbox = clinic.inbox(&Caller::secretary(5), InboxTab::Open).unwrap();

        // then (期待する結果):
        let ids: Vec<i64> = inbox.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![41, 42]);
        assert_eq!(inbox[0].unread_count, 1);
        assert_eq!(inbox[0].patient_name.as_deref(), Some("Kenji Ito"));
    }

    #[test]
    fn test_patient_message_raises_staff_unread() {
        // テスト項目: 患者のメッセージで秘書の未読が増え、会話が先頭に移動する
        // given (前提条件):
        let mut clinic = Clinic::seeded(now());
        let staff = Caller::secretary(5);

        // when (操作):
        let delivery = clinic
            .send(&Caller::patient(1), 42, "Hello", now() + Duration::seconds(5))
            .unwrap();

        // then (期待する結果):
        assert_eq!(delivery.notify, vec![staff]);
        assert_eq!(clinic.unread_for(&staff).unread_messages, 2);
        assert_eq!(clinic.unread_for(&staff).unread_conversations, Some(2));
        let inbox = clinic.inbox(&staff, InboxTab::Open).unwrap();
        assert_eq!((inbox[0].id, inbox[0].unread_count), (42, 1));
        assert_eq!(clinic.unread_for(&Caller::patient(1)).unread_messages, 0);
    }

    #[test]
    fn test_mark_read_clears_side() {
        // テスト項目: 既読にすると呼び出し側の未読だけが 0 になり、既読記録が残る
        // given (前提条件):
        let mut clinic = Clinic::seeded(now());
        let staff = Caller::secretary(5);
        clinic.send(&Caller::patient(1), 42, "Hello", now()).unwrap();

        // when (操作):
        clinic.mark_read(&staff, 42).unwrap();

        // then (期待する結果):
        let inbox = clinic.inbox(&staff, InboxTab::Open).unwrap();
        let entry = inbox.iter().find(|c| c.id == 42).unwrap();
        assert_eq!(entry.unread_count, 0);
        assert_eq!(clinic.receipts(), &[(staff, 42)]);
    }

    #[test]
    fn test_start_reuses_live_conversation() {
        // テスト項目: 既存の会話がある患者には同じ会話 ID が返る
        // given (前提条件):
        let mut clinic = Clinic::seeded(now());

        // when (操作):
        let first = clinic.start(&Caller::patient(1), now()).unwrap();
        let second = clinic.start(&Caller::patient(1), now()).unwrap();

        // then (期待する結果):
        assert_eq!(first.conversation_id, 42);
        assert_eq!(second.conversation_id, 42);
        assert!(first.has_secretary);
        assert_eq!(first.info_message, None);
    }

    #[test]
    fn test_start_without_secretary_waits() {
        // テスト項目: 対応できる秘書がいない場合、待機中の会話が作られ案内メッセージが返る
        // given (前提条件):
        let mut clinic = Clinic::seeded(now());
        clinic
            .set_availability(&Caller::secretary(5), false, now())
            .unwrap();
        clinic.add_patient(3, "Yui Mori");

        // when (操作):
        let started = clinic.start(&Caller::patient(3), now()).unwrap();

        // then (期待する結果):
        assert_eq!(started.conversation_id, 43);
        assert_eq!(started.status, "waiting");
        assert!(!started.has_secretary);
        assert_eq!(started.info_message.as_deref(), Some(NO_SECRETARY_MESSAGE));
    }

    #[test]
    fn test_other_patient_cannot_read() {
        // テスト項目: 他の患者の会話にはアクセスできない
        // given (前提条件):
        let clinic = Clinic::seeded(now());

        // when (操作):
        let result = clinic.messages(&Caller::patient(1), 41);

        // then (期待する結果):
        assert!(matches!(result, Err(ApiFailure::Forbidden(_))));
        assert_eq!(
            clinic.messages(&Caller::patient(1), 99),
            Err(ApiFailure::NotFound(99))
        );
    }
}
