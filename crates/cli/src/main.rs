//! SiteCheck CLI - Main Entry Point
//!
//! Tests whether deployed websites are functionally alive and prints one
//! PASS/FAIL verdict per site.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{init, run};

/// SiteCheck - headless-browser functionality tester
#[derive(Parser, Debug)]
#[command(name = "sitecheck")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: run::RunArgs,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    InitConfig(init::InitConfigArgs),
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { "debug" } else { "info" };
    let filter = if debug {
        tracing_subscriber::EnvFilter::new(log_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_json);

    if let Some(Commands::InitConfig(args)) = cli.command {
        return match init::execute(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                output::print_error(&format!("{:#}", e));
                ExitCode::from(2)
            }
        };
    }

    let orchestrator = match run::prepare(&cli.run) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            return ExitCode::from(2);
        }
    };

    match run::execute(&orchestrator, &cli.run).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    #[test]
    fn test_parse_urls_and_flags() {
        let cli = Cli::try_parse_from([
            "sitecheck",
            "https://a.test",
            "https://b.test",
            "--max-depth",
            "1",
            "--no-crawl",
            "--format",
            "json",
            "--concurrency",
            "2",
            "--debug",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.urls, vec!["https://a.test", "https://b.test"]);
        assert_eq!(cli.run.max_depth, Some(1));
        assert!(cli.run.no_crawl);
        assert_eq!(cli.run.format, OutputFormat::Json);
        assert_eq!(cli.run.concurrency, 2);
        assert!(cli.debug);
    }

    #[test]
    fn test_parse_init_config() {
        let cli = Cli::try_parse_from(["sitecheck", "init-config", "custom.toml", "--force"]).unwrap();
        match cli.command {
            Some(Commands::InitConfig(args)) => {
                assert_eq!(args.path, std::path::PathBuf::from("custom.toml"));
                assert!(args.force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["sitecheck", "https://a.test", "--format", "xml"]).is_err());
    }
}
