//! Local identity records.
//!
//! An identity is a local actor. Identities imported from a remote tracker
//! carry the remote user id and login as metadata, which is how later passes
//! find them again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A local actor that can author operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Identity {
    /// Create a new identity with a fresh id.
    #[must_use]
    pub fn new_raw(
        name: &str,
        login: &str,
        email: Option<&str>,
        avatar_url: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let name = if name.trim().is_empty() { login } else { name };
        Self {
            id: format!("id_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            name: name.to_string(),
            login: login.to_string(),
            email: email.filter(|e| !e.is_empty()).map(ToString::to_string),
            avatar_url: avatar_url.filter(|a| !a.is_empty()).map(ToString::to_string),
            metadata,
        }
    }

    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// `Name (login)` for display.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.name == self.login {
            self.login.clone()
        } else {
            format!("{} ({})", self.name, self.login)
        }
    }
}
