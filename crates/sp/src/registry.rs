//! Process-wide holder of the active SAML strategy.
//!
//! Readers take a short read lock and clone an `Arc`; a login that captured a
//! strategy keeps using it even if a reload replaces it mid-flight. Reloads
//! build the replacement off to the side and publish it with one swap, under a
//! writer lock so reloads never interleave. Reloads from a store read the
//! document under that same lock, so the last reload always publishes the
//! latest saved document.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tessera_core::error::{Result, TesseraError};
use tessera_core::models::trust::SpTrustConfig;
use tessera_core::notify::Notifier;
use tessera_core::store::ConfigStore;
use tracing::{info, warn};

use crate::strategy::ActiveStrategy;

/// Why SAML login is currently unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    /// No configuration has been loaded yet.
    NotLoaded,
    /// No SP document exists on disk.
    Missing,
    Malformed(String),
    Incomplete(Vec<&'static str>),
    InvalidCertificate(String),
    /// The document could not be read for another reason.
    Unreadable(String),
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisabledReason::NotLoaded => write!(f, "SAML configuration has not been loaded"),
            DisabledReason::Missing => write!(f, "no SAML configuration"),
            DisabledReason::Malformed(msg) => write!(f, "SAML configuration is malformed: {msg}"),
            DisabledReason::Incomplete(missing) => write!(
                f,
                "SAML configuration is incomplete, missing: {}",
                missing.join(", ")
            ),
            DisabledReason::InvalidCertificate(msg) => write!(f, "certificate is invalid: {msg}"),
            DisabledReason::Unreadable(msg) => {
                write!(f, "SAML configuration could not be read: {msg}")
            }
        }
    }
}

impl DisabledReason {
    fn from_error(err: TesseraError) -> Self {
        match err {
            TesseraError::ConfigMissing(_) => DisabledReason::Missing,
            TesseraError::ConfigMalformed(msg) => DisabledReason::Malformed(msg),
            TesseraError::ConfigIncomplete { missing } => DisabledReason::Incomplete(missing),
            TesseraError::CertificateInvalid(msg) => DisabledReason::InvalidCertificate(msg),
            other => DisabledReason::Unreadable(other.to_string()),
        }
    }

    /// Whether the operator should be told about this state.
    fn needs_attention(&self) -> bool {
        !matches!(self, DisabledReason::NotLoaded | DisabledReason::Missing)
    }
}

/// What `current()` returns: the strategy or the reason there is none.
#[derive(Debug, Clone)]
pub enum StrategyState {
    Active(Arc<ActiveStrategy>),
    Disabled(DisabledReason),
}

impl StrategyState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, StrategyState::Active(_))
    }
}

/// Registry lifecycle: uninitialized, then loaded, reloading, loaded, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryPhase {
    Uninitialized,
    Loaded,
    Reloading,
}

pub struct StrategyRegistry {
    state: RwLock<StrategyState>,
    phase: RwLock<RegistryPhase>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StrategyState::Disabled(DisabledReason::NotLoaded)),
            phase: RwLock::new(RegistryPhase::Uninitialized),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the published state.
    pub fn current(&self) -> StrategyState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The active strategy, or [`TesseraError::SamlDisabled`].
    pub fn active(&self) -> Result<Arc<ActiveStrategy>> {
        match self.current() {
            StrategyState::Active(strategy) => Ok(strategy),
            StrategyState::Disabled(_) => Err(TesseraError::SamlDisabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.current().is_enabled()
    }

    pub fn phase(&self) -> RegistryPhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of completed reloads.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Replace the published strategy with one built from `cfg`.
    ///
    /// A configuration that is not enabled, or whose certificate does not
    /// parse, publishes `Disabled`. Returns the newly published state.
    pub fn reload(&self, cfg: &SpTrustConfig) -> StrategyState {
        self.install(|generation| build_state(cfg, generation))
    }

    /// Load the document from `store` and reload from it.
    ///
    /// Load failures disable SAML rather than propagate. Malformed, incomplete
    /// and invalid configurations are reported to `notifier`; a missing
    /// document is not.
    pub fn reload_from(&self, store: &ConfigStore, notifier: &dyn Notifier) -> StrategyState {
        let state = self.install(|generation| match store.load() {
            Ok(cfg) => build_state(&cfg, generation),
            Err(e) => StrategyState::Disabled(DisabledReason::from_error(e)),
        });
        if let StrategyState::Disabled(reason) = &state {
            if reason.needs_attention() {
                notifier.error(&format!("SAML login disabled: {reason}"));
            }
        }
        state
    }

    fn install(&self, build: impl FnOnce(u64) -> StrategyState) -> StrategyState {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = RegistryPhase::Reloading;

        let generation = self.generation.load(Ordering::SeqCst) + 1;
        let next = build(generation);

        // The old strategy leaves and the new one arrives in the same swap.
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        self.generation.store(generation, Ordering::SeqCst);
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = RegistryPhase::Loaded;

        match &next {
            StrategyState::Active(strategy) => info!(
                generation,
                entry_point = %strategy.entry_point(),
                issuer = %strategy.issuer(),
                "SAML strategy enabled"
            ),
            StrategyState::Disabled(DisabledReason::Missing) => {
                info!(generation, "no SAML configuration, SAML login disabled")
            }
            StrategyState::Disabled(reason) => {
                warn!(generation, reason = %reason, "SAML login disabled")
            }
        }
        next
    }
}

fn build_state(cfg: &SpTrustConfig, generation: u64) -> StrategyState {
    match ActiveStrategy::from_config(cfg, generation) {
        Ok(strategy) => StrategyState::Active(Arc::new(strategy)),
        Err(e) => StrategyState::Disabled(DisabledReason::from_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{enabled_config, test_cert};
    use tessera_core::notify::NoticeBuffer;

    #[test]
    fn starts_uninitialized_and_disabled() {
        let registry = StrategyRegistry::new();
        assert_eq!(registry.phase(), RegistryPhase::Uninitialized);
        assert_eq!(registry.generation(), 0);
        assert!(matches!(
            registry.current(),
            StrategyState::Disabled(DisabledReason::NotLoaded)
        ));
        assert!(matches!(registry.active(), Err(TesseraError::SamlDisabled)));
    }

    #[test]
    fn reload_with_enabled_config_activates() {
        let registry = StrategyRegistry::new();
        let state = registry.reload(&enabled_config(&test_cert()));
        assert!(state.is_enabled());
        assert_eq!(registry.phase(), RegistryPhase::Loaded);
        assert_eq!(registry.generation(), 1);
        assert_eq!(registry.active().unwrap().generation(), 1);
    }

    #[test]
    fn any_missing_field_disables() {
        let cert = test_cert();
        let blankers: [fn(&mut SpTrustConfig); 4] = [
            |c| c.entry_point.clear(),
            |c| c.issuer.clear(),
            |c| c.callback_url.clear(),
            |c| c.cert.clear(),
        ];
        for blank in blankers {
            let registry = StrategyRegistry::new();
            registry.reload(&enabled_config(&cert));
            let mut cfg = enabled_config(&cert);
            blank(&mut cfg);
            let state = registry.reload(&cfg);
            assert!(matches!(
                state,
                StrategyState::Disabled(DisabledReason::Incomplete(_))
            ));
            assert!(!registry.is_enabled());
        }
    }

    #[test]
    fn captured_strategy_survives_disable() {
        let registry = StrategyRegistry::new();
        registry.reload(&enabled_config(&test_cert()));
        let in_flight = registry.active().unwrap();

        registry.reload(&SpTrustConfig::default());
        assert!(registry.active().is_err());
        // The login that started earlier still holds a complete strategy.
        assert_eq!(in_flight.issuer(), "tessera-sp");
        assert!(in_flight.authorize_url(None).is_ok());
    }

    #[test]
    fn reload_replaces_rather_than_adds() {
        let registry = StrategyRegistry::new();
        let first = enabled_config(&test_cert());
        let mut second = enabled_config(&test_cert());
        second.issuer = "second-sp".into();

        registry.reload(&first);
        let old = registry.active().unwrap();
        registry.reload(&second);
        let new = registry.active().unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(new.matches(&second));
        assert!(!new.matches(&first));
        assert_eq!(new.generation(), 2);
    }

    #[test]
    fn reload_from_missing_document_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("saml-config.json"));
        let registry = StrategyRegistry::new();
        let notices = NoticeBuffer::new();

        let state = registry.reload_from(&store, &notices);
        assert!(matches!(
            state,
            StrategyState::Disabled(DisabledReason::Missing)
        ));
        assert_eq!(registry.phase(), RegistryPhase::Loaded);
        assert!(notices.drain().is_empty());
    }

    #[test]
    fn reload_from_malformed_document_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saml-config.json");
        std::fs::write(&path, "{{{").unwrap();
        let registry = StrategyRegistry::new();
        registry.reload(&enabled_config(&test_cert()));
        let notices = NoticeBuffer::new();

        let state = registry.reload_from(&ConfigStore::new(path), &notices);
        assert!(matches!(
            state,
            StrategyState::Disabled(DisabledReason::Malformed(_))
        ));
        let notices = notices.drain();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("malformed"));
    }

    #[test]
    fn reload_from_incomplete_document_names_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("saml-config.json"));
        store
            .save_text(r#"{"entryPoint": "https://idp.example.com/sso", "issuer": "sp"}"#)
            .unwrap();
        let notices = NoticeBuffer::new();

        StrategyRegistry::new().reload_from(&store, &notices);
        let notices = notices.drain();
        assert_eq!(
            notices[0].message,
            "SAML login disabled: SAML configuration is incomplete, missing: callbackUrl, cert"
        );
    }

    #[test]
    fn reload_from_bare_certificate_enables() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("saml-config.json"));
        let mut cfg = enabled_config(&test_cert());
        cfg.cert = tessera_core::pem::certificate_body(&cfg.cert);
        store.save(&cfg).unwrap();

        let state = StrategyRegistry::new().reload_from(&store, &NoticeBuffer::new());
        assert!(state.is_enabled());
    }

    #[test]
    fn invalid_certificate_disables() {
        let registry = StrategyRegistry::new();
        let mut cfg = enabled_config(&test_cert());
        cfg.cert = "QUJD".into();
        let state = registry.reload(&cfg.normalized());
        assert!(matches!(
            state,
            StrategyState::Disabled(DisabledReason::InvalidCertificate(_))
        ));
    }
}
