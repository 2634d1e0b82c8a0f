//! Bearer token identities.
//!
//! The stub does not issue tokens. A token is simply `<role>:<user id>`,
//! e.g. `patient:1` or `secretary:5`.

use std::{fmt, str::FromStr};

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerRole {
    Patient,
    Secretary,
}

impl CallerRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Secretary => "secretary",
        }
    }
}

/// The authenticated user behind a request or hub connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caller {
    pub role: CallerRole,
    pub user_id: i64,
}

impl Caller {
    pub const fn patient(user_id: i64) -> Self {
        Self {
            role: CallerRole::Patient,
            user_id,
        }
    }

    pub const fn secretary(user_id: i64) -> Self {
        Self {
            role: CallerRole::Secretary,
            user_id,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == CallerRole::Secretary
    }

    /// The token a client presents for this caller
    pub fn token(&self) -> String {
        self.to_string()
    }

    /// Parse an `Authorization` header value
    pub fn from_bearer(header: &str) -> Result<Self, ApiFailure> {
        header
            .strip_prefix("Bearer ")
            .ok_or(ApiFailure::Unauthorized)?
            .parse()
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role.as_str(), self.user_id)
    }
}

impl FromStr for Caller {
    type Err = ApiFailure;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (role, id) = token.trim().split_once(':').ok_or(ApiFailure::Unauthorized)?;
        let user_id = id.parse().map_err(|_| ApiFailure::Unauthorized)?;
        match role {
            "patient" => Ok(Self::patient(user_id)),
            "secretary" => Ok(Self::secretary(user_id)),
            _ => Err(ApiFailure::Unauthorized),
        }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiFailure::Unauthorized)?;
        Self::from_bearer(header)
    }
}
