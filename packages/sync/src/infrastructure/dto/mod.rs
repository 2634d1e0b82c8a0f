//! クリニックチャットの Data Transfer Objects (DTOs)
//!
//! DTO はプロトコルごとに分けています:
//! - `http`: REST のリクエスト / レスポンスボディ
//! - `push`: プッシュチャネルのフレームとイベントのデコード
//!
//! ワイヤ上のキーの表記ゆれを扱うのは `normalize` だけです。

pub mod conversion;
pub mod http;
pub mod normalize;
pub mod push;
