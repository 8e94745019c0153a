//! Inspect command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use devicebind_core::token::decode_unverified;
use devicebind_core::DeviceBindError;
use serde_json::json;
use tracing::info;

use crate::utils::read_token;

/// Decode a token and print its header and claims. Nothing is verified.
pub fn execute(input: String, as_json: bool, quiet: bool) -> Result<()> {
    let raw = read_token(&input)?;
    let (header, claims) = decode_unverified(&raw)
        .map_err(DeviceBindError::from)
        .context("Failed to decode token")?;

    info!(
        alg = ?header.alg,
        kid = header.kid.as_deref().unwrap_or_default(),
        "Decoded token"
    );

    if as_json {
        let document = json!({
            "header": {
                "alg": format!("{:?}", header.alg),
                "typ": header.typ,
                "kid": header.kid,
            },
            "claims": claims,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    if quiet {
        return Ok(());
    }

    println!();
    println!("{}", "UNVERIFIED - signature not checked".yellow().bold());
    println!();
    println!("   {} {:?}", "Algorithm:".dimmed(), header.alg);
    println!(
        "   {} {}",
        "Type:".dimmed(),
        header.typ.as_deref().unwrap_or("-")
    );
    println!(
        "   {} {}",
        "Key id:".dimmed(),
        header.kid.as_deref().unwrap_or("-")
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}
