//! DeviceBind CLI - inspect and validate device-bound authentication challenges.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use url::Url;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Challenge rejected (malformed, expired, bad signature, unsupported payload)
  66  Input file not found or unreadable
  69  Authorization server unavailable";

#[derive(Parser)]
#[command(name = "devicebind")]
#[command(author, version, about = "Device-bound authentication challenge tool", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where challenge signing keys come from.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct KeySource {
    /// JWKS endpoint publishing the issuer's signing keys
    #[arg(long, value_name = "URL")]
    jwks_url: Option<Url>,

    /// Shared HMAC secret for a key id, as KID=SECRET (repeatable)
    #[arg(long = "hmac-key", value_name = "KID=SECRET")]
    hmac_keys: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a challenge token without verifying it
    Inspect {
        /// Compact token, or a file containing one
        #[arg(value_name = "TOKEN")]
        token: String,

        /// Print header and claims as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fully validate a challenge token (signature, type, lifetime)
    Validate {
        /// Compact token, or a file containing one
        #[arg(value_name = "TOKEN")]
        token: String,

        #[command(flatten)]
        keys: KeySource,
    },

    /// Parse a push notification payload and show the challenge it carries
    Push {
        /// JSON payload file ({"payloadVersion": ..., "challenge": ...})
        #[arg(value_name = "PAYLOAD")]
        payload: PathBuf,

        #[command(flatten)]
        keys: KeySource,
    },

    /// Fetch the push challenges pending for an enrollment
    Pull {
        /// Enrollment JSON file
        #[arg(long, value_name = "FILE")]
        enrollment: PathBuf,

        /// Bearer token sent with the request
        #[arg(long, env = "DEVICEBIND_BEARER_TOKEN", hide_env_values = true)]
        bearer: Option<String>,

        #[command(flatten)]
        keys: KeySource,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let quiet = cli.quiet;
    let result: Result<()> = match cli.command {
        Commands::Inspect { token, json } => commands::inspect::execute(token, json, quiet),
        Commands::Validate { token, keys } => {
            commands::validate::execute(token, keys, quiet).await
        }
        Commands::Push { payload, keys } => commands::push::execute(payload, keys, quiet).await,
        Commands::Pull {
            enrollment,
            bearer,
            keys,
        } => commands::pull::execute(enrollment, bearer, keys, quiet).await,
    };

    if let Err(err) = result {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = &exit.message {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        process::exit(exit.code);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "devicebind_core={default_level},devicebind={default_level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
