//! Error types for the Tessera core crate.

use std::fmt;

use thiserror::Error;

/// Step of certificate issuance that failed, reported back to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStage {
    Request,
    KeyGeneration,
    Signing,
    FileWrite,
    ConfigUpdate,
}

impl fmt::Display for IssuanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuanceStage::Request => write!(f, "request validation"),
            IssuanceStage::KeyGeneration => write!(f, "key generation"),
            IssuanceStage::Signing => write!(f, "certificate signing"),
            IssuanceStage::FileWrite => write!(f, "writing certificate files"),
            IssuanceStage::ConfigUpdate => write!(f, "updating SAML configuration"),
        }
    }
}

/// Top-level error type for all Tessera operations.
#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("SAML configuration not found at {0}")]
    ConfigMissing(String),

    #[error("SAML configuration is malformed: {0}")]
    ConfigMalformed(String),

    #[error("SAML configuration is incomplete, missing: {}", .missing.join(", "))]
    ConfigIncomplete { missing: Vec<&'static str> },

    #[error("certificate is invalid: {0}")]
    CertificateInvalid(String),

    #[error("certificate issuance failed during {stage}: {message}")]
    Issuance {
        stage: IssuanceStage,
        message: String,
    },

    #[error("SAML not configured")]
    MetadataNotConfigured,

    /// Deliberately carries no detail: unknown users and bad passwords look the same.
    #[error("invalid credentials")]
    AuthenticationRejected,

    #[error("SAML login is not enabled")]
    SamlDisabled,

    #[error("SAML error: {0}")]
    Saml(String),

    #[error("password hash error: {0}")]
    PasswordHash(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TesseraError {
    pub fn issuance(stage: IssuanceStage, message: impl fmt::Display) -> Self {
        TesseraError::Issuance {
            stage,
            message: message.to_string(),
        }
    }
}

/// A convenience Result alias that defaults to [`TesseraError`].
pub type Result<T> = std::result::Result<T, TesseraError>;
