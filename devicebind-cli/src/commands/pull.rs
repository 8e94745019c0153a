//! Pull command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use devicebind_core::Enrollment;
use tracing::info;

use crate::utils::{build_engine, format_timestamp, load_json};
use crate::KeySource;

/// Fetch and list the push challenges pending for an enrollment.
pub async fn execute(
    enrollment: PathBuf,
    bearer: Option<String>,
    keys: KeySource,
    quiet: bool,
) -> Result<()> {
    let enrollment: Enrollment = serde_json::from_value(load_json(&enrollment)?)
        .with_context(|| format!("Invalid enrollment in {}", enrollment.display()))?;
    let engine = build_engine(&keys)?;

    let authorization = bearer.map(|token| format!("Bearer {token}"));
    let challenges = engine
        .pull_push_challenges(&enrollment, authorization.as_deref())
        .await
        .context("Failed to pull pending challenges")?;

    info!(
        enrollment_id = %enrollment.enrollment_id,
        count = challenges.len(),
        "Pulled pending challenges"
    );

    if quiet {
        return Ok(());
    }

    println!();
    if challenges.is_empty() {
        println!("{}", "No pending challenges".dimmed());
        return Ok(());
    }

    let clock_skew = engine.config().clock_skew;
    for challenge in &challenges {
        let status = if challenge.is_expired(clock_skew) {
            "expired".red()
        } else {
            "pending".green()
        };
        println!(
            "   {} {} {} {}",
            challenge.transaction_id().bold(),
            status,
            "expires".dimmed(),
            format_timestamp(challenge.expires_at())
        );
        if let Some(message) = &challenge.context().binding_message {
            println!("      {}", message.dimmed());
        }
    }
    Ok(())
}
