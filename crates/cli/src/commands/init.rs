use std::path::Path;

use tessera_core::config::{SamlSection, TesseraConfig, TesseraSection, UserConfig};
use tessera_core::passwords::hash_password;
use tracing::info;

const DEFAULT_ADMIN_PASSWORD: &str = "tessera-admin";

/// Run the `init` command: create the data directory and write a default
/// configuration with one local admin account.
pub fn run(data_dir: &str, public_url: Option<&str>, force: bool) -> anyhow::Result<()> {
    let data_path = Path::new(data_dir);

    if !data_path.exists() {
        std::fs::create_dir_all(data_path)?;
        info!("Created data directory: {}", data_dir);
    }

    let config_path = data_path.join("tessera.toml");
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            config_path.display()
        );
    }

    let admin_password_hash = hash_password(DEFAULT_ADMIN_PASSWORD)?;
    let defaults = TesseraConfig::generate_default();
    let config = TesseraConfig {
        tessera: TesseraSection {
            data_dir: data_dir.to_string(),
            public_url: public_url.map(str::to_string),
            ..defaults.tessera
        },
        saml: SamlSection::default(),
        users: vec![UserConfig {
            id: "1".into(),
            username: "admin".into(),
            password_hash: admin_password_hash,
            email: String::new(),
            first_name: "Admin".into(),
            last_name: "User".into(),
            display_name: String::new(),
            manager: String::new(),
            title: String::new(),
            is_admin: true,
        }],
    };
    config.validate()?;

    let saml_dir = config
        .saml_config_path()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| data_path.to_path_buf());
    std::fs::create_dir_all(&saml_dir)?;

    let toml_str = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, &toml_str)?;
    info!("Wrote configuration to {}", config_path.display());

    println!("Tessera initialized successfully!");
    println!("  Data directory:     {}", data_dir);
    println!("  Configuration:      {}", config_path.display());
    println!("  SAML configuration: {}", config.saml_config_path().display());
    println!("  Public URL:         {}", config.public_url());
    println!("  Admin password:     {}", DEFAULT_ADMIN_PASSWORD);
    println!();
    println!("Next steps:");
    println!("  1. Change the admin password (`tessera hash-password`)");
    println!(
        "  2. Set saml.entry_point in {} to your IdP's SSO URL",
        config_path.display()
    );
    println!(
        "  3. Run `tessera --config {} generate-cert`",
        config_path.display()
    );
    println!(
        "  4. Run `tessera --config {} serve` and register /saml/metadata with your IdP",
        config_path.display()
    );

    Ok(())
}
