pub mod check_config;
pub mod cleanup_config;
pub mod generate_cert;
pub mod hash_password;
pub mod init;
pub mod serve;

use std::path::Path;

use tessera_core::config::TesseraConfig;
use tessera_core::notify::{LogNotifier, Notice, NoticeLevel, Notifier};
use tracing::info;

/// Load and validate the configuration file.
pub fn load_config(config_path: &str) -> anyhow::Result<TesseraConfig> {
    let config = TesseraConfig::load(Path::new(config_path))?;
    config.validate()?;
    info!("Loaded configuration from {}", config_path);
    Ok(config)
}

/// Operator notices for the terminal: logged, then printed.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let prefix = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        let message = notice.message.clone();
        LogNotifier.notify(notice);
        println!("[{prefix}] {message}");
    }
}
