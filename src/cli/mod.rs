pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use crate::cli::commands::CrawlOverrides;
use crate::cli::config::SeedLinkPolicy;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and download every documentation page
    Crawl {
        /// Configuration file (defaults to the user config, then built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of browser sessions open at once
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,

        /// Directory raw artifacts are written to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// WebDriver endpoint
        #[arg(long)]
        webdriver_url: Option<String>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// How a seed's own URL is treated among its links
        #[arg(long, value_enum)]
        seed_links: Option<SeedLinkPolicy>,

        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Convert downloaded pages to Markdown
    Convert {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Raw artifact directory
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Markdown output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show or initialize the configuration
    Config {
        /// Configuration file to show
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the built-in defaults to the user config file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file when used with --init
        #[arg(long, requires = "init")]
        force: bool,

        /// Print the user config file location
        #[arg(long, conflicts_with = "init")]
        path: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Crawl {
            config,
            max_concurrent,
            output,
            webdriver_url,
            headed,
            seed_links,
            report,
        } => {
            info!("Starting crawl");
            let overrides = CrawlOverrides {
                max_concurrent,
                output,
                webdriver_url,
                headed,
                seed_links,
                report,
            };
            commands::crawl(config, overrides).await
        }
        Commands::Convert {
            config,
            input,
            output,
        } => {
            info!("Converting raw pages to Markdown");
            commands::convert(config, input, output).await
        }
        Commands::Config {
            config,
            init,
            force,
            path,
        } => {
            if init {
                commands::init_config(force).await
            } else if path {
                commands::config_path().await
            } else {
                commands::show_config(config).await
            }
        }
    }
}
