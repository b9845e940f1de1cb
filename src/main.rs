use alumnimap::crypto::ApiKeyCipher;
use alumnimap::{start_web_server, AppConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "alumnimap")]
#[command(about = "Alumni roster ingestion and map backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server
    Serve,
    /// Encrypt an enrichment API key for config.yaml
    EncryptKey {
        /// Plaintext API key
        api_key: String,
        /// Base64 cipher key, defaults to the one in config.yaml
        #[arg(long)]
        cipher_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    Registry::default()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or(EnvFilter::new("alumnimap=INFO,rocket::server=OFF")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => {
            let config = AppConfig::load()?;
            start_web_server(config).await
        }
        Command::EncryptKey {
            api_key,
            cipher_key,
        } => {
            let cipher_key = match cipher_key {
                Some(key) => key,
                None => AppConfig::load()?.cipher_key,
            };
            let cipher = ApiKeyCipher::from_base64_key(&cipher_key)
                .context("Invalid cipher key")?;
            println!("{}", cipher.encrypt(&api_key)?);
            Ok(())
        }
    }
}
