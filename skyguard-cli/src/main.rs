//! Skyguard CLI: operator interface for the threat response service.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Skyguard: drone threat classification and response
#[derive(Parser, Debug)]
#[command(name = "skyguard", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the response service
    Serve {
        /// Address to bind (overrides gateway.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides gateway.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Classify a single detection
    Evaluate {
        /// Detector confidence in [0, 1]
        #[arg(short, long)]
        confidence: f64,
        /// Detected class label
        #[arg(long = "class", default_value = "drone")]
        class_name: String,
        /// Bounding box as x1,y1,x2,y2
        #[arg(long, default_value = "150,100,450,400")]
        bbox: String,
        /// Send escalating detections to the response service
        #[arg(long)]
        trigger: bool,
    },
    /// Evaluate a JSON-lines detection feed (stdin if no file is given)
    Watch {
        /// Feed file
        file: Option<PathBuf>,
        /// Classify only, never call the response service
        #[arg(long)]
        no_trigger: bool,
    },
    /// Send a sample HIGH alert through the configured notifier
    TestAlert,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
    /// Check configuration for errors and warnings
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "skyguard", "skyguard")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "skyguard.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve_overrides() {
        let cli = Cli::try_parse_from(["skyguard", "-v", "serve", "--port", "6000"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Serve { host, port } => {
                assert!(host.is_none());
                assert_eq!(port, Some(6000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_evaluate_defaults() {
        let cli = Cli::try_parse_from(["skyguard", "evaluate", "--confidence", "0.92"]).unwrap();
        match cli.command {
            Commands::Evaluate {
                confidence,
                class_name,
                bbox,
                trigger,
            } => {
                assert_eq!(confidence, 0.92);
                assert_eq!(class_name, "drone");
                assert_eq!(bbox, "150,100,450,400");
                assert!(!trigger);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["skyguard"]).is_err());
    }
}
