//! 同期コアの実行時設定

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:5024/api";
pub const DEFAULT_HUB_URL: &str = "ws://localhost:5024/hubs/chat";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(6);
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

pub const ENV_API_URL: &str = "CLINIC_API_URL";
pub const ENV_HUB_URL: &str = "CLINIC_HUB_URL";
pub const ENV_POLL_INTERVAL_SECS: &str = "CLINIC_POLL_INTERVAL_SECS";

const HUB_PATH: &str = "/hubs/chat";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("URL '{0}' must start with http:// or https://")]
    UnsupportedScheme(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// REST のベース URL（例: `http://localhost:5024/api`）
    pub api_url: String,
    /// プッシュハブのエンドポイント（例: `ws://localhost:5024/hubs/chat`）
    pub hub_url: String,
    pub poll_interval: Duration,
    pub invoke_timeout: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl SyncConfig {
    /// `api_url` を指し、ハブの URL をそこから導出した設定を作成
    pub fn for_api_url(api_url: &str) -> Result<Self, ConfigError> {
        let api_url = api_url.trim_end_matches('/').to_string();
        let hub_url = derive_hub_url(&api_url)?;
        Ok(Self {
            api_url,
            hub_url,
            ..Self::default()
        })
    }

    /// プロセスの環境変数から上書き値を読み込む
    ///
    /// 不正な値はログに残し、デフォルト値を使い続けます。
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(api_url) = lookup(ENV_API_URL) {
            match Self::for_api_url(&api_url) {
                Ok(derived) => {
                    config.api_url = derived.api_url;
                    config.hub_url = derived.hub_url;
                }
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_API_URL, e),
            }
        }

        if let Some(hub_url) = lookup(ENV_HUB_URL) {
            config.hub_url = hub_url.trim_end_matches('/').to_string();
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_SECS) {
            match parse_secs(ENV_POLL_INTERVAL_SECS, &raw) {
                Ok(interval) => config.poll_interval = interval,
                Err(e) => tracing::warn!("{}; using {:?}", e, config.poll_interval),
            }
        }

        config
    }
}

/// `http(s)://host[:port]/api` → `ws(s)://host[:port]/hubs/chat`
pub fn derive_hub_url(api_url: &str) -> Result<String, ConfigError> {
    let (scheme, rest) = if let Some(rest) = api_url.strip_prefix("https://") {
        ("wss://", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        ("ws://", rest)
    } else {
        return Err(ConfigError::UnsupportedScheme(api_url.to_string()));
    };

    let rest = rest.trim_end_matches('/');
    let origin = rest.strip_suffix("/api").unwrap_or(rest);
    Ok(format!("{scheme}{origin}{HUB_PATH}"))
}

fn parse_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        }),
    }
}
