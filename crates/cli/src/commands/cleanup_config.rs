use tessera_core::store::ConfigStore;
use tracing::info;

use super::load_config;

/// Run the `cleanup-config` command: rewrite the SAML configuration without
/// the duplicate `certificate` and `certificateForMetadata` fields.
pub fn run(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = ConfigStore::new(config.saml_config_path());

    let before = store.read_text()?;
    let had_legacy =
        before.contains("\"certificate\"") || before.contains("\"certificateForMetadata\"");
    let cleaned = store.cleanup()?;
    info!(path = %store.path().display(), had_legacy, "SAML configuration cleaned up");

    println!("Cleaned up {}", store.path().display());
    if had_legacy {
        println!("  Removed duplicate certificate fields");
    } else {
        println!("  No duplicate certificate fields found");
    }
    let missing = cleaned.missing_fields();
    if !missing.is_empty() {
        println!("  Still missing: {}", missing.join(", "));
    }
    Ok(())
}
