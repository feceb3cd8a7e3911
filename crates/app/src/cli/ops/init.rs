use std::path::PathBuf;

use clap::Args;

use dropkey::state::{default_server_url, AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Import an existing identity key (PEM or hex) instead of generating one
    #[arg(long)]
    pub import: Option<PathBuf>,

    /// Write daily rolling logs to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            server_url: ctx.remote.clone().unwrap_or_else(default_server_url),
            log_dir: self.log_dir.clone(),
            ..Default::default()
        };

        let state =
            AppState::init(ctx.config_path.clone(), Some(config), self.import.as_deref()).await?;
        let (_, identity) = state.open_identity().await?;

        let output = format!(
            "Initialized dropkey directory at: {}\n\
             - Key: {} ({})\n\
             - Config: {}\n\
             - Server: {}\n\
             - Public key: {}",
            state.dropkey_dir.display(),
            state.key_path.display(),
            if self.import.is_some() { "imported" } else { "generated" },
            state.config_path.display(),
            state.config.server_url,
            identity.public(),
        );

        Ok(output)
    }
}
