use std::sync::Arc;

use tessera_core::store::ConfigStore;
use tessera_sp::certs::{CertificateAuthority, IssueRequest};
use tessera_sp::registry::StrategyRegistry;

use super::{load_config, ConsoleNotifier};

/// Run the `generate-cert` command: issue a self-signed certificate, write
/// the PEM files and install the certificate as the SP `cert`.
pub fn run(config_path: &str, common_name: Option<String>, days: Option<u32>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = ConfigStore::new(config.saml_config_path());
    let registry = Arc::new(StrategyRegistry::new());

    let authority = CertificateAuthority::new(
        store,
        registry.clone(),
        config.cert_path(),
        config.key_path(),
    )
    .with_defaults(
        config.saml.default_common_name.clone(),
        config.saml.default_validity_days,
    )
    .with_seed(config.sp_seed());

    let request = IssueRequest {
        common_name,
        validity_days: days,
    };
    let issued = authority.issue_and_install(&request, &ConsoleNotifier)?;

    println!("Certificate installed");
    println!("  Subject CN:  {}", issued.subject_cn);
    println!("  Serial:      {}", issued.serial);
    println!("  Valid from:  {}", issued.not_before.format("%Y-%m-%d"));
    println!("  Valid until: {}", issued.not_after.format("%Y-%m-%d"));
    println!("  Certificate: {}", issued.cert_path.display());
    println!("  Private key: {}", issued.key_path.display());
    println!(
        "  SAML login:  {}",
        if registry.is_enabled() { "enabled" } else { "disabled" }
    );
    println!();
    println!("Restart `tessera serve` to pick up the new certificate.");
    Ok(())
}
