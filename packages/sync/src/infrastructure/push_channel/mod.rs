//! プッシュチャネルのトランスポート

pub mod connection_manager;
pub mod policy;

pub use connection_manager::{ChannelConfig, ConnectionManager};
pub use policy::ReconnectPolicy;
