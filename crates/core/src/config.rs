//! TOML-based application configuration for Tessera.
//!
//! This is the operator-owned `tessera.toml`. The mutable SAML trust document
//! lives elsewhere and is managed by [`crate::store::ConfigStore`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::models::trust::SpTrustConfig;

/// Base URL assumed when `tessera.public_url` is not set.
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Upper bound accepted for certificate validity, in days.
pub const MAX_VALIDITY_DAYS: u32 = 3650;

/// Top-level Tessera configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseraConfig {
    pub tessera: TesseraSection,
    #[serde(default)]
    pub saml: SamlSection,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Core instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseraSection {
    pub instance_name: String,
    pub data_dir: String,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u32,
}

fn default_session_timeout() -> u32 {
    480
}

/// Locations and defaults for the SAML service provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlSection {
    /// SP trust document. Defaults to `<data_dir>/admin/saml-config.json`.
    #[serde(default)]
    pub config_path: Option<String>,
    /// Defaults to `<data_dir>/cert.pem`.
    #[serde(default)]
    pub cert_path: Option<String>,
    /// Defaults to `<data_dir>/key.pem`.
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default = "default_common_name")]
    pub default_common_name: String,
    #[serde(default = "default_validity_days")]
    pub default_validity_days: u32,
    /// Publish an encryption KeyDescriptor alongside the signing one.
    #[serde(default)]
    pub include_encryption_key: bool,
    /// IdP SSO URL used to fill a blank `entryPoint` when a certificate is issued.
    #[serde(default)]
    pub entry_point: Option<String>,
    /// Seed for a blank `issuer`. Defaults to `<public_url>/saml/metadata`.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Seed for a blank `callbackUrl`. Defaults to `<public_url>/login/callback`.
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn default_common_name() -> String {
    "TestSAMLApp".to_string()
}

fn default_validity_days() -> u32 {
    730
}

impl Default for SamlSection {
    fn default() -> Self {
        Self {
            config_path: None,
            cert_path: None,
            key_path: None,
            default_common_name: default_common_name(),
            default_validity_days: default_validity_days(),
            include_encryption_key: false,
            entry_point: None,
            issuer: None,
            callback_url: None,
        }
    }
}

/// A local account seeded into the in-memory user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub username: String,
    /// Argon2 PHC string, see `tessera hash-password`.
    pub password_hash: String,
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
}

impl TesseraConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TesseraError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Validate the configuration, returning an error for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        if self.tessera.instance_name.is_empty() {
            return Err(TesseraError::Config(
                "tessera.instance_name must not be empty".into(),
            ));
        }

        if self.tessera.data_dir.is_empty() {
            return Err(TesseraError::Config(
                "tessera.data_dir must not be empty".into(),
            ));
        }

        if self.tessera.session_timeout_minutes == 0 {
            return Err(TesseraError::Config(
                "tessera.session_timeout_minutes must be greater than zero".into(),
            ));
        }

        if self.saml.default_common_name.trim().is_empty() {
            return Err(TesseraError::Config(
                "saml.default_common_name must not be empty".into(),
            ));
        }

        if !(1..=MAX_VALIDITY_DAYS).contains(&self.saml.default_validity_days) {
            return Err(TesseraError::Config(format!(
                "saml.default_validity_days must be between 1 and {MAX_VALIDITY_DAYS}"
            )));
        }

        let mut ids = HashSet::new();
        let mut usernames = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                return Err(TesseraError::Config("users.username must not be empty".into()));
            }
            if user.password_hash.is_empty() {
                return Err(TesseraError::Config(format!(
                    "users.password_hash is required for {}",
                    user.username
                )));
            }
            if !ids.insert(user.id.as_str()) {
                return Err(TesseraError::Config(format!(
                    "duplicate user id: {}",
                    user.id
                )));
            }
            if !usernames.insert(user.username.as_str()) {
                return Err(TesseraError::Config(format!(
                    "duplicate username: {}",
                    user.username
                )));
            }
        }

        Ok(())
    }

    /// Generate a sensible default configuration.
    pub fn generate_default() -> Self {
        Self {
            tessera: TesseraSection {
                instance_name: "Tessera".into(),
                data_dir: "/var/lib/tessera".into(),
                public_url: None,
                session_timeout_minutes: default_session_timeout(),
            },
            saml: SamlSection::default(),
            users: Vec::new(),
        }
    }

    pub fn public_url(&self) -> &str {
        self.tessera
            .public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_PUBLIC_URL)
    }

    /// SP identity used to fill blank fields of the trust document when a
    /// certificate is issued.
    pub fn sp_seed(&self) -> SpTrustConfig {
        SpTrustConfig {
            entry_point: self.saml.entry_point.clone().unwrap_or_default(),
            issuer: self
                .saml
                .issuer
                .clone()
                .unwrap_or_else(|| format!("{}/saml/metadata", self.public_url())),
            callback_url: self
                .saml
                .callback_url
                .clone()
                .unwrap_or_else(|| format!("{}/login/callback", self.public_url())),
            ..Default::default()
        }
    }

    pub fn saml_config_path(&self) -> PathBuf {
        match &self.saml.config_path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.tessera.data_dir)
                .join("admin")
                .join("saml-config.json"),
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        match &self.saml.cert_path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.tessera.data_dir).join("cert.pem"),
        }
    }

    pub fn key_path(&self) -> PathBuf {
        match &self.saml.key_path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.tessera.data_dir).join("key.pem"),
        }
    }
}
