//! Common utility functions shared across CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use devicebind_core::{
    ChallengeKeyResolver, ChallengeToken, Collaborators, EngineConfig, HttpClientConfig,
    HttpRestClient, JwksKeyResolver, MemoryEnrollmentStore, SoftwareKeyStore, StaticKeyResolver,
    VerificationEngine,
};
use serde_json::Value;
use tracing::debug;

use crate::exit_codes::UsageError;
use crate::KeySource;

/// Accept either a compact token or the path of a file holding one.
pub fn read_token(input: &str) -> Result<String> {
    let path = Path::new(input);
    if input.split('.').count() != 3 && !path.exists() {
        // Neither a token nor an existing file: report the missing file.
        std::fs::metadata(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
    }
    if path.is_file() {
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        debug!(path = %path.display(), "Read token from file");
        return Ok(token.trim().to_string());
    }
    Ok(input.trim().to_string())
}

/// Read and parse a JSON document.
pub fn load_json(path: &Path) -> Result<Value> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

pub fn build_resolver(keys: &KeySource) -> Result<Arc<dyn ChallengeKeyResolver>> {
    if let Some(url) = &keys.jwks_url {
        debug!(jwks_url = %url, "Resolving challenge keys from JWKS");
        return Ok(Arc::new(JwksKeyResolver::new(url.clone())));
    }

    let mut resolver = StaticKeyResolver::new();
    for entry in &keys.hmac_keys {
        let (kid, secret) = entry
            .split_once('=')
            .filter(|(kid, secret)| !kid.is_empty() && !secret.is_empty())
            .ok_or_else(|| {
                UsageError(format!("Invalid --hmac-key '{entry}', expected KID=SECRET"))
            })?;
        resolver = resolver.with_hmac_secret(kid, secret.as_bytes());
    }
    Ok(Arc::new(resolver))
}

/// Engine for commands that only parse and pull challenges.
///
/// Nothing is signed from the CLI, so the key and enrollment stores stay empty.
pub fn build_engine(keys: &KeySource) -> Result<VerificationEngine> {
    let rest = HttpRestClient::new(HttpClientConfig::from_env())?;
    let collaborators = Collaborators::new(
        Arc::new(SoftwareKeyStore::new()),
        Arc::new(MemoryEnrollmentStore::new()),
        Arc::new(rest),
        build_resolver(keys)?,
    );
    Ok(VerificationEngine::new(EngineConfig::from_env(), collaborators))
}

/// Format a timestamp as a human-readable UTC string.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Print the fields of a validated challenge a user would care about.
pub fn print_challenge(token: &ChallengeToken) {
    let key_types: Vec<&str> = token.key_types().iter().map(|k| k.as_str()).collect();

    println!("   {} {}", "Transaction:".dimmed(), token.transaction_id());
    println!("   {} {}", "Organization:".dimmed(), token.org_id());
    if let Some(issuer) = token.issuer() {
        println!("   {} {}", "Issuer:".dimmed(), issuer);
    }
    println!("   {} {}", "Method:".dimmed(), token.method());
    println!("   {} {}", "Key types:".dimmed(), key_types.join(", "));
    println!(
        "   {} {:?}",
        "User verification:".dimmed(),
        token.user_verification()
    );
    println!("   {} {}", "Verify at:".dimmed(), token.verification_uri());
    if let Some(app) = token.app_instance_name() {
        println!("   {} {}", "App:".dimmed(), app);
    }
    if let Some(message) = &token.context().binding_message {
        println!("   {} {}", "Message:".dimmed(), message);
    }
    println!(
        "   {} {}",
        "Expires:".dimmed(),
        format_timestamp(token.expires_at())
    );
}
