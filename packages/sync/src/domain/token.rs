//! Bearer トークンの取得口

/// 現在のセッショントークンを提供する
///
/// 接続、再接続、REST リクエストのたびに呼ばれるので、更新されたセッションは
/// 何も作り直さずに反映されます。
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}
