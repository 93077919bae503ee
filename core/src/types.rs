//! Domain types for the account-server API.
//!
//! # Design
//! These mirror the mock server's schema but are defined independently;
//! integration tests catch schema drift between the two crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AccountError;

/// An 8-byte application EUI, written as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppEui([u8; 8]);

impl AppEui {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl FromStr for AppEui {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AccountError::Validation(format!("'{s}' is not a 16-digit hex AppEUI"));
        if s.len() != 16 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for AppEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl Serialize for AppEui {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AppEui {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A permission held by a collaborator on one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Right {
    Read,
    Write,
    ManageCollaborators,
}

impl Right {
    pub const ALL: [Right; 3] = [Right::Read, Right::Write, Right::ManageCollaborators];

    pub fn as_str(&self) -> &'static str {
        match self {
            Right::Read => "read",
            Right::Write => "write",
            Right::ManageCollaborators => "manage-collaborators",
        }
    }
}

impl FromStr for Right {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Right::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AccountError::Validation(format!("unknown right '{s}'")))
    }
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential scoped to one application.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub rights: Vec<Right>,
}

impl AccessKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            rights: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_rights(mut self, rights: impl IntoIterator<Item = Right>) -> Self {
        self.rights = rights.into_iter().collect();
        self
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKey")
            .field("key", &"<redacted>")
            .field("label", &self.label)
            .field("rights", &self.rights)
            .finish()
    }
}

/// One entry of an application's collaborator relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub username: String,
    pub rights: Vec<Right>,
}

/// An application as stored on the account server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub euis: Vec<AppEui>,
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
    #[serde(default)]
    pub access_keys: Vec<AccessKey>,
}

impl Application {
    pub fn has_eui(&self, eui: &AppEui) -> bool {
        self.euis.contains(eui)
    }

    /// Rights held by `username`, empty when they are not a collaborator.
    pub fn rights_of(&self, username: &str) -> &[Right] {
        self.collaborators
            .iter()
            .find(|c| c.username == username)
            .map(|c| c.rights.as_slice())
            .unwrap_or(&[])
    }
}

/// Request payload for creating an application. Field order matches the
/// wire contract: `name`, `id`, `euis`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateApplication<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub euis: &'a [AppEui],
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChangeName<'a> {
    pub name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RightsRequest {
    pub rights: Vec<Right>,
}
