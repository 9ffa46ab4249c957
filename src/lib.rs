pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod manager;
pub mod provider;
pub mod secret_store;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser as _;
use cmd::IntoCommand as _;
use config::source::fs::FileSystemConfigSource;
use manager::KmsManager;
use provider::registry::ProviderRegistry;
use secret_store::fs::FileSystemSecretStore;
use shadow_rs::shadow;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

shadow!(build);

pub async fn run() -> Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();

    tracing::debug!(
        "csi-kms version: v{}  commit: {}  buildtime: {}",
        build::PKG_VERSION,
        build::COMMIT_HASH,
        build::BUILD_TIME
    );

    let config_source = match args.config_file {
        Some(config_file) => FileSystemConfigSource::new(config_file),
        None => FileSystemConfigSource::new_with_default_config_file(),
    };
    let secret_store = match args.secrets_dir {
        Some(secrets_dir) => FileSystemSecretStore::new(secrets_dir),
        None => FileSystemSecretStore::new_with_default_secrets_dir(),
    };

    let manager = KmsManager::new(
        Arc::new(ProviderRegistry::with_builtin()),
        Box::new(config_source),
    )
    .with_secret_store(Box::new(secret_store));

    tracing::debug!(
        "Using config source from {:?}",
        manager.config_source().source_debug_string()
    );

    // Handle the command
    args.command.into_command().run(&manager).await?;

    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;

    #[ctor::ctor]
    fn init() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "debug".into());
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
