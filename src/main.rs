//! Asha session core server and tools

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use asha_core::{
    cli::{Cli, Command},
    config::Config,
    moderation::Verdict,
    server::Server,
    service::ChatService,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Some(Command::AuthUrl) => run_auth_url(&cli),
        Some(Command::Moderate { ref text }) => run_moderate(&cli, text),
        Some(Command::ShowConfig) => run_show_config(&cli),
        Some(Command::Serve) | None => run_server(&cli).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Print an authorization URL
fn run_auth_url(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli)?;
    let service = ChatService::from_config(&config).context("Failed to build service")?;

    let (url, _) = service.authorization_url(None);
    println!("{url}");
    Ok(ExitCode::SUCCESS)
}

/// Check text against the moderation gate
fn run_moderate(cli: &Cli, text: &str) -> anyhow::Result<ExitCode> {
    let config = load_config(cli)?;
    let gate = asha_core::moderation::ModerationGate::from_config(&config.moderation)
        .context("Failed to compile moderation policy")?;

    match gate.check(text) {
        Verdict::Allow => {
            println!("allow");
            Ok(ExitCode::SUCCESS)
        }
        Verdict::Block(reason) => {
            println!("block ({reason}): {}", reason.message());
            Ok(ExitCode::from(2))
        }
    }
}

/// Print the effective configuration
fn run_show_config(cli: &Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli)?;
    config.redact_secrets();

    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    print!("{yaml}");
    Ok(ExitCode::SUCCESS)
}

/// Run the HTTP server
async fn run_server(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli)?;

    if config.oauth.resolve_client_id().is_empty() {
        anyhow::bail!("oauth.client_id is empty; set GOOGLE_CLIENT_ID or configure it");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        storage = ?config.storage.backend,
        "Starting Asha session core"
    );

    let service = Arc::new(ChatService::from_config(&config).context("Failed to build service")?);
    Server::new(config, service).run().await.context("Server error")?;

    info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}
