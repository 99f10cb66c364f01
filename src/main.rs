use anyhow::Result;
use std::process::ExitCode;
use tracing::{error, info};

mod browser;
mod cli;
mod crawler;
mod error;
mod storage;
mod utils;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = cli::parse_args();

    // Initialize logging
    utils::init_logging(args.verbose, args.log_file.clone())?;

    info!("Starting docs-mirror v{}", env!("CARGO_PKG_VERSION"));

    // Process commands
    match cli::process_command(args).await {
        Ok(code) => {
            info!("Command completed");
            Ok(code)
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}
