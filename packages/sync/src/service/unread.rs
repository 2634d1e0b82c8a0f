//! 利用側のロールごとの未読管理
//!
//! ここの数値はすべてバックエンドから来ます。ローカルで調整するのは、
//! パネル (または受信箱のエントリ) を開いたときに先に 0 にすることだけです。

use crate::domain::{Conversation, ConversationId, Message, UnreadSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreadChange {
    pub previous: u32,
    pub current: u32,
}

impl UnreadChange {
    pub fn increased(&self) -> bool {
        self.current > self.previous
    }
}

/// 患者ウィジェットの未読カウンター
///
/// パネルが開いている間は 0 に固定し、閉じた後の最初の報告値は
/// そのまま採用する。
#[derive(Debug, Default)]
pub struct SingleCounter {
    displayed: u32,
    last_reported: u32,
    panel_open: bool,
}

impl SingleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn displayed(&self) -> u32 {
        self.displayed
    }

    pub fn last_reported(&self) -> u32 {
        self.last_reported
    }

    pub fn apply(&mut self, reported: u32) -> UnreadChange {
        let previous = self.displayed;
        self.last_reported = reported;
        if !self.panel_open {
            self.displayed = reported;
        }
        UnreadChange {
            previous,
            current: self.displayed,
        }
    }

    pub fn open_panel(&mut self) -> UnreadChange {
        let previous = self.displayed;
        self.panel_open = true;
        self.displayed = 0;
        UnreadChange {
            previous,
            current: 0,
        }
    }

    pub fn close_panel(&mut self) {
        self.panel_open = false;
    }
}

/// 秘書の受信箱の未読状態: ロールのサマリーとエントリごとの件数
#[derive(Debug, Default)]
pub struct StaffUnread {
    summary: UnreadSummary,
    inbox: Vec<Conversation>,
    selected: Option<ConversationId>,
}

impl StaffUnread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> UnreadSummary {
        self.summary
    }

    pub fn inbox(&self) -> &[Conversation] {
        &self.inbox
    }

    pub fn entry(&self, id: ConversationId) -> Option<&Conversation> {
        self.inbox.iter().find(|c| c.id == id)
    }

    pub fn selected(&self) -> Option<ConversationId> {
        self.selected
    }

    /// `unread_messages` の変化を返す
    pub fn apply_summary(&mut self, summary: UnreadSummary) -> UnreadChange {
        let previous = self.summary.unread_messages;
        self.summary = summary;
        UnreadChange {
            previous,
            current: summary.unread_messages,
        }
    }

    /// 新しい受信箱ページに置き換える。選択中のエントリは 0 のまま
    pub fn replace_inbox(&mut self, entries: Vec<Conversation>) {
        self.inbox = entries;
        if let Some(selected) = self.selected {
            self.zero_entry(selected);
        }
    }

    /// エントリを選択して 0 にする。一覧にない場合は `false` を返す
    pub fn select(&mut self, id: ConversationId) -> bool {
        self.selected = Some(id);
        self.zero_entry(id)
    }

    pub fn clear_selection(&mut self) -> Option<ConversationId> {
        self.selected.take()
    }

    /// メッセージのエントリを先頭に移し、最終メッセージ時刻を更新する
    ///
    /// 未読数はそのままにし、次の受信箱取得で反映する。
    /// 現在のページにエントリがなければ `false` を返す。
    pub fn touch(&mut self, message: &Message) -> bool {
        let Some(index) = self
            .inbox
            .iter()
            .position(|c| c.id == message.conversation_id)
        else {
            return false;
        };
        let mut entry = self.inbox.remove(index);
        if entry.last_message_at.is_none_or(|at| at < message.sent_at) {
            entry.last_message_at = Some(message.sent_at);
        }
        self.inbox.insert(0, entry);
        true
    }

    /// 選択中以外のエントリの未読メッセージ数
    pub fn unseen_total(&self) -> u32 {
        self.inbox
            .iter()
            .filter(|c| Some(c.id) != self.selected)
            .fold(0u32, |sum, c| sum.saturating_add(c.unread_count))
    }

    fn zero_entry(&mut self, id: ConversationId) -> bool {
        match self.inbox.iter_mut().find(|c| c.id == id) {
            Some(entry) => {
                entry.unread_count = 0;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConversationStatus, MessageId, SenderRole};
    use chrono::{TimeZone, Utc};

    fn entry(id: i64, unread: u32) -> Conversation {
        Conversation {
            id: ConversationId::new(id),
            patient_id: Some(id * 10),
            counterpart_name: format!("patient-{id}"),
            status: ConversationStatus::Open,
            assigned_staff_id: Some(1),
            created_at: None,
            closed_at: None,
            last_message_at: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            unread_count: unread,
        }
    }

    fn message_in(conversation: i64, at: i64) -> Message {
        Message {
            id: MessageId::new(at),
            conversation_id: ConversationId::new(conversation),
            sender_role: SenderRole::Patient,
            sender_user_id: None,
            text: "Hello".to_string(),
            sent_at: Utc.timestamp_opt(at, 0).unwrap(),
            read_at: None,
        }
    }

    fn ids(unread: &StaffUnread) -> Vec<i64> {
        unread.inbox().iter().map(|c| c.id.value()).collect()
    }

    #[test]
    fn test_single_counter_apply_while_closed() {
        // テスト項目: パネルが閉じている間はサーバーの値がそのまま表示される
        // given (前提条件):
        let mut counter = SingleCounter::new();

        // when (操作):
        let change = counter.apply(3);

        // then (期待する結果):
        assert_eq!(
            change,
            UnreadChange {
                previous: 0,
                current: 3
            }
        );
        assert!(change.increased());
        assert_eq!(counter.displayed(), 3);
    }

    #[test]
    fn test_single_counter_open_zeroes_before_round_trip() {
        // テスト項目: パネルを開くと通信を待たずに未読が 0 になる
        // given (前提条件):
        let mut counter = SingleCounter::new();
        counter.apply(4);

        // when (操作):
        let change = counter.open_panel();

        // then (期待する結果):
        assert_eq!(change.current, 0);
        assert_eq!(counter.displayed(), 0);
    }

    #[test]
    fn test_single_counter_pinned_while_open() {
        // テスト項目: パネルが開いている間の報告値は表示に反映されない
        // given (前提条件):
        let mut counter = SingleCounter::new();
        counter.open_panel();

        // when (操作):
        let change = counter.apply(2);

        // then (期待する結果):
        assert!(!change.increased());
        assert_eq!(counter.displayed(), 0);
        assert_eq!(counter.last_reported(), 2);
    }

    #[test]
    fn test_single_counter_reconciles_after_close() {
        // テスト項目: パネルを閉じた後の最初の報告値で表示が更新される
        // given (前提条件):
        let mut counter = SingleCounter::new();
        counter.open_panel();
        counter.close_panel();

        // when (操作):
        let change = counter.apply(1);

        // then (期待する結果):
        assert_eq!(
            change,
            UnreadChange {
                previous: 0,
                current: 1
            }
        );
    }

    #[test]
    fn test_staff_select_zeroes_entry_and_survives_refresh() {
        // テスト項目: 選択中のエントリは選択時も再取得後も未読 0 に保たれる
        // given (前提条件):
        let mut unread = StaffUnread::new();
        unread.replace_inbox(vec![entry(42, 2), entry(7, 1)]);

        // when (操作):
        let found = unread.select(ConversationId::new(42));
        unread.replace_inbox(vec![entry(42, 2), entry(7, 1)]);

        // then (期待する結果):
        assert!(found);
        assert_eq!(unread.entry(ConversationId::new(42)).unwrap().unread_count, 0);
        assert_eq!(unread.entry(ConversationId::new(7)).unwrap().unread_count, 1);
        assert_eq!(unread.unseen_total(), 1);
    }

    #[test]
    fn test_staff_touch_moves_entry_to_top_without_guessing_count() {
        // テスト項目: 新着メッセージでエントリが先頭に移動し、未読数は推測で変更されない
        // given (前提条件):
        let mut unread = StaffUnread::new();
        unread.replace_inbox(vec![entry(7, 0), entry(42, 0)]);

        // when (操作):
        let found = unread.touch(&message_in(42, 1_800_000_000));

        // then (期待する結果):
        assert!(found);
        assert_eq!(ids(&unread), vec![42, 7]);
        let top = unread.entry(ConversationId::new(42)).unwrap();
        assert_eq!(top.unread_count, 0);
        assert_eq!(
            top.last_message_at,
            Some(Utc.timestamp_opt(1_800_000_000, 0).unwrap())
        );
    }

    #[test]
    fn test_staff_touch_unknown_entry() {
        // テスト項目: 一覧に無い会話のメッセージは false を返し、一覧は変わらない
        // given (前提条件):
        let mut unread = StaffUnread::new();
        unread.replace_inbox(vec![entry(7, 0)]);

        // when (操作):
        let found = unread.touch(&message_in(99, 1_800_000_000));

        // then (期待する結果):
        assert!(!found);
        assert_eq!(ids(&unread), vec![7]);
    }

    #[test]
    fn test_staff_touch_keeps_newer_timestamp() {
        // テスト項目: 古いメッセージで最終メッセージ時刻が巻き戻らない
        // given (前提条件):
        let mut unread = StaffUnread::new();
        unread.replace_inbox(vec![entry(42, 0)]);

        // when (操作):
        unread.touch(&message_in(42, 1_600_000_000));

        // then (期待する結果):
        assert_eq!(
            unread.entry(ConversationId::new(42)).unwrap().last_message_at,
            Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
        );
    }

    #[test]
    fn test_staff_apply_summary_reports_change() {
        // テスト項目: 未読サマリーの変化が前後の値として返される
        // given (前提条件):
        let mut unread = StaffUnread::new();
        unread.apply_summary(UnreadSummary::staff(1, 1));

        // when (操作):
        let change = unread.apply_summary(UnreadSummary::staff(3, 2));

        // then (期待する結果):
        assert_eq!(
            change,
            UnreadChange {
                previous: 1,
                current: 3
            }
        );
        assert_eq!(unread.summary(), UnreadSummary::staff(3, 2));
    }
}
