use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directive for this crate's own events
fn crate_directive(verbose: bool) -> &'static str {
    if verbose {
        "docs_mirror=debug"
    } else {
        "docs_mirror=info"
    }
}

/// Initialize the logging system
pub fn init_logging(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    // Create an environment filter
    let env_filter = EnvFilter::from_default_env()
        .add_directive(crate_directive(verbose).parse()?)
        .add_directive("warn".parse()?);

    // Configure the logging format
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    // If a log file is specified, create a file logger as well
    if let Some(log_file) = log_file {
        if let Some(parent) = log_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create log directory: {}", parent.display()))?;
            }
        }

        let file = fs::File::create(&log_file)
            .context(format!("Failed to create log file: {}", log_file.display()))?;
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_parse() {
        for verbose in [true, false] {
            let directive: Result<tracing_subscriber::filter::Directive, _> =
                crate_directive(verbose).parse();
            assert!(directive.is_ok());
        }
    }
}
