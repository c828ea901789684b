use serde::{Deserialize, Serialize};

use crate::config::UserConfig;

/// How a user authenticated for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Local,
    Saml,
}

/// An authenticated principal, local or SAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_admin: bool,
    pub auth_type: AuthType,
    /// Raw assertion XML, kept for the profile page of SAML sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saml_assertion: Option<String>,
}

impl User {
    /// Name shown in the UI: display name, then "first last", then username.
    pub fn label(&self) -> String {
        if !self.display_name.is_empty() {
            return self.display_name.clone();
        }
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn session_payload(&self) -> SessionPayload {
        SessionPayload {
            id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}

impl From<&UserConfig> for User {
    fn from(cfg: &UserConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            username: cfg.username.clone(),
            email: cfg.email.clone(),
            first_name: cfg.first_name.clone(),
            last_name: cfg.last_name.clone(),
            display_name: cfg.display_name.clone(),
            manager: cfg.manager.clone(),
            title: cfg.title.clone(),
            is_admin: cfg.is_admin,
            auth_type: AuthType::Local,
            saml_assertion: None,
        }
    }
}

/// The minimal record persisted in a session between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub id: String,
    pub username: String,
}
