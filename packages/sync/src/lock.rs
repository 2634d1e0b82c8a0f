use std::sync::{Mutex, MutexGuard, PoisonError};

/// std の Mutex をロックする。保持者が panic していても中身をそのまま使う
///
/// 返したガードを `.await` をまたいで保持してはいけません。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
