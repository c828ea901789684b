use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tessera", about = "SAML service provider with a web console", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, env = "TESSERA_CONFIG", default_value = "tessera.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Initialize the data directory and write a default configuration
    Init {
        /// Data directory path
        #[arg(long, default_value = "/var/lib/tessera")]
        data_dir: String,
        /// Public base URL of this service provider
        #[arg(long)]
        public_url: Option<String>,
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Start the web console
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "3000")]
        port: u16,
    },
    /// Issue a self-signed SP certificate and install it in the SAML configuration
    GenerateCert {
        /// Certificate common name (defaults to saml.default_common_name)
        #[arg(long)]
        common_name: Option<String>,
        /// Validity in days (defaults to saml.default_validity_days)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Report whether the SAML configuration enables SAML login
    CheckConfig,
    /// Remove duplicate certificate fields from the SAML configuration
    CleanupConfig,
    /// Print an argon2id hash for a [[users]] entry
    HashPassword {
        /// Password to hash; read from stdin when omitted
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            data_dir,
            public_url,
            force,
        } => {
            commands::init::run(&data_dir, public_url.as_deref(), force)?;
        }
        Commands::Serve { port } => {
            commands::serve::run(&cli.config, port).await?;
        }
        Commands::GenerateCert { common_name, days } => {
            commands::generate_cert::run(&cli.config, common_name, days)?;
        }
        Commands::CheckConfig => {
            commands::check_config::run(&cli.config)?;
        }
        Commands::CleanupConfig => {
            commands::cleanup_config::run(&cli.config)?;
        }
        Commands::HashPassword { password } => {
            commands::hash_password::run(password)?;
        }
    }

    Ok(())
}
