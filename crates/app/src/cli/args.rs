pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "dropkey")]
#[command(about = "Zero-knowledge paste sharing: the server only ever sees ciphertext")]
pub struct Args {
    /// Paste service URL (defaults to the configured server_url)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the dropkey config directory (defaults to ~/.dropkey)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
