//! Bearer トークンの提供元

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::TokenProvider;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to read session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed session file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session file {0} holds no token")]
    Empty(PathBuf),
}

/// 固定トークン（CLI フラグで渡した値など）
#[derive(Debug, Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self((!token.trim().is_empty()).then_some(token))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Deserialize)]
struct SessionFile {
    #[serde(default)]
    token: Option<String>,
}

/// 呼ばれるたびにディスクから `{"token": "..."}` を読む。
/// 別のプロセスが更新したセッションは次の再接続で反映される。
#[derive(Debug, Clone)]
pub struct SessionFileToken {
    path: PathBuf,
}

impl SessionFileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<String, TokenError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| TokenError::Io {
            path: self.path.clone(),
            source,
        })?;
        let session: SessionFile =
            serde_json::from_str(&raw).map_err(|source| TokenError::Json {
                path: self.path.clone(),
                source,
            })?;
        session
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TokenError::Empty(self.path.clone()))
    }
}

impl TokenProvider for SessionFileToken {
    fn token(&self) -> Option<String> {
        match self.read() {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }
}
