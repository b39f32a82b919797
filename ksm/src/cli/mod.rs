use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::store::{self, ContentKeySource, TenantRegistry};

mod check_keys;
mod serve;

pub use check_keys::CheckKeysCommand;
pub use serve::ServeCommand;

#[derive(Parser, Debug)]
#[command(name = "ksm")]
#[command(about = "FairPlay license server: turns SPC requests into CKC responses")]
pub struct Args {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "KSM_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeCommand,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the license server (default)
    Serve(ServeCommand),
    /// Load and validate every configured tenant, then exit
    CheckKeys(CheckKeysCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        init_tracing(&self.log_level);

        match self.command.unwrap_or(Command::Serve(self.serve)) {
            Command::Serve(cmd) => cmd.run().await,
            Command::CheckKeys(cmd) => cmd.run().await,
        }
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/**
    Where tenant keys and content keys come from. Shared by `serve` and
    `check-keys` so both see the same configuration.
*/
#[derive(Parser, Debug, Clone, Default)]
pub struct KeySourceArgs {
    /// JSON key-store file with one entry per client id. Without it the
    /// single tenant is read from the FAIRPLAY_* environment variables.
    #[arg(long, env = "KSM_KEY_STORE")]
    pub key_store: Option<PathBuf>,

    /// Fetch content keys from this HTTP document store instead of the key store
    #[arg(long, env = "KSM_REMOTE_STORE", conflicts_with = "derived_keys")]
    pub remote_store: Option<String>,

    /// Serve deterministic MD5-derived content keys (development only)
    #[arg(long)]
    pub derived_keys: bool,

    /// Fall back to the published development ASk when a tenant has none
    #[arg(long, env = "KSM_ALLOW_DEFAULT_ASK")]
    pub allow_default_ask: bool,
}

impl KeySourceArgs {
    pub fn content_key_source(&self) -> ContentKeySource {
        match (&self.remote_store, self.derived_keys) {
            (Some(url), _) => ContentKeySource::Remote(url.clone()),
            (None, true) => ContentKeySource::Derived,
            (None, false) => ContentKeySource::KeyStore,
        }
    }

    pub fn load(&self) -> Result<TenantRegistry> {
        let source = self.content_key_source();
        let registry = match &self.key_store {
            Some(path) => store::load_key_store(path, &source, self.allow_default_ask)
                .with_context(|| format!("loading key store {}", path.display()))?,
            None => store::load_env_tenant(
                |name| std::env::var(name).ok(),
                &source,
                self.allow_default_ask,
            )
            .context("loading tenant from environment")?,
        };
        Ok(registry)
    }
}
