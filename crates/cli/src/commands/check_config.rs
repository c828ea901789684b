use tessera_core::error::TesseraError;
use tessera_core::pem::parse_certificate;
use tessera_core::store::ConfigStore;
use tessera_sp::registry::{StrategyRegistry, StrategyState};

use super::load_config;

/// Run the `check-config` command: report whether the SAML configuration
/// would enable SAML login, and what is missing if not.
pub fn run(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = ConfigStore::new(config.saml_config_path());

    println!("SAML configuration: {}", store.path().display());
    for line in report(&store) {
        println!("  {line}");
    }
    Ok(())
}

fn report(store: &ConfigStore) -> Vec<String> {
    let cfg = match store.load() {
        Ok(cfg) => cfg,
        Err(TesseraError::ConfigMissing(_)) => {
            return vec!["Status: disabled (no configuration file)".to_string()];
        }
        Err(e) => return vec![format!("Status: disabled ({e})")],
    };

    let mut lines = Vec::new();
    let missing = cfg.missing_fields();
    if missing.is_empty() {
        lines.push("Required fields: all present".to_string());
    } else {
        lines.push(format!("Missing fields: {}", missing.join(", ")));
    }

    if !cfg.cert.trim().is_empty() {
        match parse_certificate(&cfg.cert) {
            Ok(info) => {
                lines.push(format!("Certificate subject: {}", info.subject));
                lines.push(format!(
                    "Certificate expires: {}",
                    info.not_after.format("%Y-%m-%d")
                ));
                lines.push(format!("Certificate SHA-256: {}", info.fingerprint_sha256));
            }
            Err(e) => lines.push(format!("Certificate: {e}")),
        }
    }

    let registry = StrategyRegistry::new();
    match registry.reload(&cfg) {
        StrategyState::Active(strategy) => lines.push(format!(
            "Status: enabled (entry point {}, issuer {})",
            strategy.entry_point(),
            strategy.issuer()
        )),
        StrategyState::Disabled(reason) => lines.push(format!("Status: disabled ({reason})")),
    }
    lines
}
