//! Infrastructure 層
//!
//! ドメイン層が定義したトレイト（`ChatApi`, `PushChannel`, `TokenProvider`）の
//! 具体的な実装と、ワイヤーフォーマットの DTO を提供します。

pub mod api;
pub mod dto;
pub mod push_channel;
pub mod token;
