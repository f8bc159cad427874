use clap::Parser;

use strata_core::error::{ConfigError, IngestError, ProjectError};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Compose code analysis results into a navigable containment hierarchy"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0: success
///   1: general/unknown error (including a failed `check --strict`)
///   2: configuration error
///   3: input file missing or unreadable
///   4: malformed input (bad JSON, wrong shape, rejected duplicate id)
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return 2;
        }
        if cause.is::<IngestError>() || cause.is::<serde_json::Error>() {
            return 4;
        }
        if cause.is::<std::io::Error>() {
            return 3;
        }
        if cause.is::<ProjectError>() {
            return 1;
        }
    }

    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("config") {
        2
    } else if lower.contains("cannot read") {
        3
    } else if lower.contains("malformed") {
        4
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match commands::run(cli.command, cli.quiet) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_config() {
        let err = anyhow::Error::new(ConfigError::Invalid("chunk_size must be > 0".into()))
            .context("Cannot load config: strata.toml");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_missing_input() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Err::<(), _>(io)
            .context("Cannot read analysis: /nonexistent.json")
            .unwrap_err();
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_malformed_input() {
        let err = anyhow::Error::new(IngestError::NotAnObject).context("Cannot compose analysis");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_malformed_json() {
        let Err(json) = serde_json::from_str::<serde_json::Value>("{") else {
            panic!("expected a parse error");
        };
        let err = anyhow::Error::new(IngestError::Malformed(json));
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Check failed: 3 records dropped");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
