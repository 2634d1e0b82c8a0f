//! REST クライアント実装

pub mod http;

pub use http::HttpChatApi;
