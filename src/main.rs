use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use math_mcp::config::{load_config, LogFormat};
use math_mcp::error::EXIT_INTERNAL_ERROR;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "math_mcp")]
#[command(about = "Arithmetic and math-tutoring MCP server over stdio", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server listening on STDIO
    Serve {
        /// Path to a JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Set log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,

        /// Log output format
        #[arg(long, value_enum)]
        log_format: Option<LogFormat>,
    },
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            verbose,
            log_level,
            log_format,
        } => {
            let config = match load_config(config.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return ExitCode::from(EXIT_INTERNAL_ERROR);
                }
            };

            let level = if verbose {
                "debug".to_string()
            } else {
                log_level.unwrap_or_else(|| config.logging.level.clone())
            };
            init_tracing(&level, log_format.unwrap_or(config.logging.format));

            match math_mcp::serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, exit_code = e.exit_code(), "Server terminated");
                    ExitCode::from(e.exit_code())
                }
            }
        }
    }
}
