//! # LLM Admin Main Entry Point

use clap::{Parser, Subcommand};
use llm_admin::migration::{Migrator, MigratorTrait};
use llm_admin::server::AppState;
use llm_admin::{config::ConfigLoader, db, server::run_server, telemetry};

#[derive(Parser)]
#[command(name = "llm-admin", version, about = "Admin control plane for LLM backends")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending migrations and start the API server (default)
    Serve,
    /// Run pending database migrations and exit
    Migrate,
    /// Run one catalog sync against the proxy and exit
    Sync {
        /// Rewrite existing rows even when unchanged
        #[arg(long)]
        force_update: bool,
        /// Do not cascade models absent from the proxy
        #[arg(long)]
        keep_unavailable: bool,
    },
    /// Restore key_hash == sha256(external_key_value) for legacy rows
    RepairKeyHashes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    if let Ok(redacted) = config.redacted_json() {
        tracing::info!(profile = %config.profile, config = %redacted, "Configuration loaded");
    }

    let pool = db::init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            Migrator::up(&pool, None).await?;
            run_server(config, pool).await
        }
        Command::Migrate => {
            Migrator::up(&pool, None).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Command::Sync {
            force_update,
            keep_unavailable,
        } => {
            let state = AppState::new(pool, config)?;
            let report = state
                .model_sync
                .sync_models(force_update, !keep_unavailable)
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e.message))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::RepairKeyHashes => {
            let state = AppState::new(pool, config)?;
            let repaired = state
                .api_keys
                .repair_legacy_key_hashes()
                .await
                .map_err(|e| anyhow::anyhow!("repair failed: {}", e.message))?;
            tracing::info!(repaired, "Legacy key hash repair complete");
            Ok(())
        }
    }
}
