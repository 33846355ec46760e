use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::str::FromStr;
use tracing::{info, Level};

use vault_auth::provider::LoginDocument;
use vault_auth::{AuthTokenQuery, Provider, ProviderConfig};

mod commands;

use commands::{LoginCommand, ReadCommand};

#[derive(Parser)]
#[command(
    name = "vault-auth",
    about = "Log in to Vault with AWS identity and print the token as JSON",
    version = env!("CARGO_PKG_VERSION"),
    author = "ktruck"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in using command-line flags and VAULT_* environment variables
    Login(LoginCommand),
    /// Log in using a YAML document
    Read(ReadCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the token record.
    let log_level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let level = Level::from_str(log_level)
        .with_context(|| format!("invalid log level {:?}", log_level))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let (config, query) = match cli.command {
        Commands::Login(cmd) => (cmd.connection.provider_config(), cmd.query()),
        Commands::Read(cmd) => read_document(&cmd).await?,
    };

    let provider = Provider::configure(&config)?;
    info!("Reading auth token from {} backend", query.auth_backend);
    let record = provider.read_auth_token(&query).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn read_document(cmd: &ReadCommand) -> Result<(ProviderConfig, AuthTokenQuery)> {
    let raw = tokio::fs::read_to_string(&cmd.file)
        .await
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;
    let document: LoginDocument = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse {}", cmd.file.display()))?;
    Ok((document.provider_config(), document.data))
}
