// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Init, Login, Paste, Register, Version};

use dropkey::logging::init_logging;
use dropkey::state::{AppConfig, AppState};

command_enum! {
    (Init, Init),
    (Register, Register),
    (Login, Login),
    (Paste, Paste),
    (Version, Version),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Before `init` there is no config yet, so log with the defaults
    let config = AppState::load(args.config_path.clone())
        .map(|state| state.config)
        .unwrap_or_else(|_| AppConfig::default());
    let _guards = init_logging(config.log_level(), config.log_dir.as_deref());

    let ctx = cli::op::OpContext::new(args.remote, args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
