//! Error types for the account client.
//!
//! # Design
//! `NotFound` and `Conflict` name the resource they are about so callers can
//! branch on it. Statuses the operation does not expect land in the
//! per-operation catch-alls (`Creation`, `Deletion`, `Update`) with the raw
//! status and its reason phrase.

use std::fmt;

use thiserror::Error;

/// Longest body excerpt kept in a `Decode` error.
pub const BODY_EXCERPT_LEN: usize = 256;

/// The server-side thing an error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Application(String),
    Collaborator { app_id: String, username: String },
    /// The key value itself is a credential and is never carried here.
    AccessKey { app_id: String },
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Application(id) => write!(f, "application '{id}'"),
            Resource::Collaborator { app_id, username } => {
                write!(f, "collaborator '{username}' on application '{app_id}'")
            }
            Resource::AccessKey { app_id } => write!(f, "access key on application '{app_id}'"),
        }
    }
}

/// Errors returned by `AccountClient`.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("could not decode response (HTTP {status}): {message}; body: {excerpt:?}")]
    Decode {
        status: u16,
        excerpt: String,
        message: String,
    },

    #[error("{0} does not exist")]
    NotFound(Resource),

    #[error("{0} already exists")]
    Conflict(Resource),

    /// A caller-supplied argument was rejected, locally or by the server.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The server refused the access token.
    #[error("access token rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("could not create application: {status} {status_text}")]
    Creation { status: u16, status_text: String },

    #[error("could not delete application: {status} {status_text}")]
    Deletion { status: u16, status_text: String },

    #[error("{operation} failed: {status} {status_text}")]
    Update {
        operation: &'static str,
        status: u16,
        status_text: String,
    },

    /// The request payload could not be serialized to JSON.
    #[error("could not encode request: {0}")]
    Encode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AccountError {
    pub(crate) fn decode(status: u16, body: &str, err: serde_json::Error) -> Self {
        AccountError::Decode {
            status,
            excerpt: excerpt(body),
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AccountError {
    fn from(err: config::ConfigError) -> Self {
        AccountError::Config(err.to_string())
    }
}

/// Truncate `body` to at most `BODY_EXCERPT_LEN` characters.
pub(crate) fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_keeps_short_bodies() {
        assert_eq!(excerpt("oops"), "oops");
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(BODY_EXCERPT_LEN + 10);
        let out = excerpt(&body);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), BODY_EXCERPT_LEN + 3);
    }

    #[test]
    fn resource_display_omits_key_value() {
        let err = AccountError::Conflict(Resource::AccessKey {
            app_id: "app".to_string(),
        });
        assert_eq!(err.to_string(), "access key on application 'app' already exists");
    }
}
