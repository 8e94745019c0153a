//! Push command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::utils::{build_engine, format_timestamp, load_json, print_challenge};
use crate::KeySource;

/// Parse a push notification payload and describe its challenge.
pub async fn execute(payload: PathBuf, keys: KeySource, quiet: bool) -> Result<()> {
    let document = load_json(&payload)?;
    let engine = build_engine(&keys)?;

    let challenge = engine
        .parse_push_notification(&document)
        .await
        .context("Push notification rejected")?;

    let expired = challenge.is_expired(engine.config().clock_skew);
    info!(
        transaction_id = %challenge.transaction_id(),
        expired,
        "Push challenge parsed"
    );

    if !quiet {
        println!();
        println!("{}", "PUSH CHALLENGE".cyan().bold());
        println!();
        print_challenge(challenge.token());
        println!("   {} {}", "Origin:".dimmed(), challenge.origin());
        println!(
            "   {} {}",
            "Issued:".dimmed(),
            format_timestamp(challenge.issued_at())
        );
        if let Some(kind) = &challenge.context().transaction_type {
            println!("   {} {}", "Transaction type:".dimmed(), kind);
        }
        if expired {
            println!("   {} {}", "Status:".dimmed(), "EXPIRED".red());
        }
    }
    Ok(())
}
