//! File-backed storage for the SP trust document.
//!
//! The store reads and writes whole documents only. Merging a partial update
//! into the existing document is the caller's job: load, modify, save.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, TesseraError};
use crate::models::trust::SpTrustConfig;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Raw document text as stored on disk.
    pub fn read_text(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                TesseraError::ConfigMissing(self.path.display().to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the document exactly as stored, without certificate normalization.
    pub fn load_raw(&self) -> Result<SpTrustConfig> {
        parse_document(&self.read_text()?)
    }

    /// Load the document and normalize its certificate.
    ///
    /// A missing file yields [`TesseraError::ConfigMissing`] and unparsable
    /// content yields [`TesseraError::ConfigMalformed`]; callers treat both as
    /// "SAML disabled".
    pub fn load(&self) -> Result<SpTrustConfig> {
        let cfg = self.load_raw()?.normalized();
        debug!(path = %self.path.display(), "loaded SAML configuration");
        Ok(cfg)
    }

    /// Like [`load_raw`](Self::load_raw), but a missing document reads as empty.
    pub fn load_or_default(&self) -> Result<SpTrustConfig> {
        match self.load_raw() {
            Err(TesseraError::ConfigMissing(_)) => Ok(SpTrustConfig::default()),
            other => other,
        }
    }

    /// Serialize and replace the whole document.
    pub fn save(&self, cfg: &SpTrustConfig) -> Result<()> {
        let mut json = serde_json::to_string_pretty(cfg)
            .map_err(|e| TesseraError::Serialization(e.to_string()))?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())?;
        info!(path = %self.path.display(), "saved SAML configuration");
        Ok(())
    }

    /// Replace the document with operator-supplied JSON text.
    ///
    /// The text must parse as a JSON object; it is re-serialized so the stored
    /// document is always well formed.
    pub fn save_text(&self, text: &str) -> Result<SpTrustConfig> {
        let cfg = parse_document(text)?;
        self.save(&cfg)?;
        Ok(cfg)
    }

    /// Rewrite the document in canonical form.
    ///
    /// The legacy `certificate` value moves into `cert` when `cert` is blank,
    /// both duplicate certificate fields are removed, and the canonical keys
    /// are always written. Unknown keys are kept.
    pub fn cleanup(&self) -> Result<SpTrustConfig> {
        let mut cfg = self.load_raw()?;
        if cfg.cert.trim().is_empty() {
            if let Some(legacy) = cfg.certificate.take() {
                cfg.cert = legacy;
            }
        }
        cfg.strip_legacy_certificates();
        self.save(&cfg)?;
        info!(path = %self.path.display(), "cleaned up SAML configuration");
        Ok(cfg)
    }
}

fn parse_document(text: &str) -> Result<SpTrustConfig> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TesseraError::ConfigMalformed(e.to_string()))?;
    if !value.is_object() {
        return Err(TesseraError::ConfigMalformed(
            "document must be a JSON object".into(),
        ));
    }
    serde_json::from_value(value).map_err(|e| TesseraError::ConfigMalformed(e.to_string()))
}

/// Write `contents` to `path` through a temporary file in the same directory,
/// creating parent directories as needed. Readers see the old or the new file,
/// never a mix.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TesseraError::Io(e.error))?;
    Ok(())
}
