use std::sync::Arc;

use authd_core::{AuthState, SigningKey};
use clap::Parser;

mod cli;
mod commands;
mod config;
mod observability;
mod server;

use cli::{Cli, Commands};
use config::loader::load_config;
use server::ServerBuilder;

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Commands::Genkey(args)) => commands::genkey(args, &mut std::io::stdout().lock()),
        Some(Commands::HashPassword) => commands::hash_password_command(
            &mut std::io::stdin().lock(),
            &mut std::io::stdout().lock(),
        ),
        Some(Commands::Serve) | None => serve(&cli).await,
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn serve(cli: &Cli) -> anyhow::Result<()> {
    observability::init_tracing();

    let (config_path, source) = cli.config_path();
    let cfg = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(
        path = %config_path.display(),
        source = %source,
        issuer = %cfg.auth.issuer,
        "Configuration loaded"
    );
    observability::apply_logging_level(&cfg.logging.level);

    let signing_key = match SigningKey::load(&cfg.auth.key, &cfg.auth.base_dir, cfg.auth.use_pss) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Signing key error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(
        kid = %signing_key.kid(),
        alg = ?signing_key.algorithm(),
        "Signing key loaded"
    );

    let state = AuthState::embedded(&cfg.auth, Arc::new(signing_key))?;
    tracing::info!(
        clients = cfg.auth.clients.len(),
        users = cfg.auth.users.len(),
        "Embedded stores initialized"
    );

    ServerBuilder::new(cfg.addr(), state).build().run().await
}
