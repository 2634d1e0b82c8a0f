//! パネルの開閉フラグを誰が所有するか

use tokio::sync::watch;

/// 開閉フラグの所有者
///
/// `Internal`: ビュー自身の `open_panel` / `close_panel` で操作する。
/// `External`: 埋め込み先の親（統合チャットランチャーなど）がフラグを持ち、
/// ビューは receiver の値に追従する。
#[derive(Debug, Clone, Default)]
pub enum OpenState {
    #[default]
    Internal,
    External(watch::Receiver<bool>),
}

impl OpenState {
    /// 親が所有するフラグと、親が保持する sender を作る
    pub fn external(initially_open: bool) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(initially_open);
        (Self::External(rx), tx)
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }

    /// 親の現在の値。ビュー自身が所有する場合は `false`
    pub fn parent_open(&self) -> bool {
        match self {
            Self::Internal => false,
            Self::External(rx) => *rx.borrow(),
        }
    }
}
