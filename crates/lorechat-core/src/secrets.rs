//! API credential lookup
//!
//! The key is searched in the hosting platform's secrets file first, then in
//! the process environment, then in a local `.env` file. Surrounding quotes
//! and whitespace are stripped from whatever is found.

use anyhow::{anyhow, Result};
use std::fs;
use std::path::PathBuf;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const SECRETS_FILE_VAR: &str = "LORECHAT_SECRETS_FILE";

/// Where to look for the API key
#[derive(Debug, Clone)]
pub struct SecretSources {
    pub secrets_file: PathBuf,
    pub env_file: PathBuf,
}

impl Default for SecretSources {
    fn default() -> Self {
        let secrets_file = std::env::var(SECRETS_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".lorechat").join("secrets.toml"));

        Self {
            secrets_file,
            env_file: PathBuf::from(".env"),
        }
    }
}

/// Strip whitespace, then double quotes, then single quotes from both ends
pub fn clean_secret(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_matches('"').trim_matches('\'').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn from_secrets_file(sources: &SecretSources) -> Option<String> {
    let content = fs::read_to_string(&sources.secrets_file).ok()?;
    let table: toml::Table = match toml::from_str(&content) {
        Ok(table) => table,
        Err(e) => {
            tracing::warn!(
                path = %sources.secrets_file.display(),
                error = %e,
                "ignoring unreadable secrets file"
            );
            return None;
        }
    };
    table.get(API_KEY_VAR)?.as_str().and_then(clean_secret)
}

fn from_env_file(sources: &SecretSources) -> Option<String> {
    let entries = dotenvy::from_path_iter(&sources.env_file).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .find(|(key, _)| key == API_KEY_VAR)
        .and_then(|(_, value)| clean_secret(&value))
}

/// Resolve the API key using the real process environment
pub fn resolve_api_key(sources: &SecretSources) -> Result<String> {
    resolve_api_key_with(sources, |name| std::env::var(name).ok())
}

/// Resolve the API key with an injectable environment lookup
pub fn resolve_api_key_with<F>(sources: &SecretSources, env_lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = from_secrets_file(sources) {
        tracing::info!(source = "secrets file", "API key found");
        return Ok(key);
    }
    if let Some(key) = env_lookup(API_KEY_VAR).as_deref().and_then(clean_secret) {
        tracing::info!(source = "environment", "API key found");
        return Ok(key);
    }
    if let Some(key) = from_env_file(sources) {
        tracing::info!(source = ".env file", "API key found");
        return Ok(key);
    }

    Err(anyhow!(missing_key_help(sources)))
}

/// Instructions shown when no key could be found anywhere
pub fn missing_key_help(sources: &SecretSources) -> String {
    format!(
        "❌ {var} could not be found.\n\n\
         How to fix:\n\
         1. Hosted: add it to the platform secrets file ({secrets}):\n   \
            {var} = \"sk-ant-api03-...\"\n\n\
         2. Local: add it to the {env} file:\n   \
            {var}=\"sk-ant-api03-...\"",
        var = API_KEY_VAR,
        secrets = sources.secrets_file.display(),
        env = sources.env_file.display(),
    )
}
