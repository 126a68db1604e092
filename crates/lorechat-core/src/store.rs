//! Flat JSON document persistence
//!
//! Documents are read leniently: a missing, empty, or malformed file yields
//! the caller's default instead of an error. Writes overwrite the whole file
//! with pretty-printed UTF-8 JSON. There is no locking; one process owns the
//! files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// A loaded document plus the warning raised if the file had to be discarded
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> Loaded<T> {
    fn clean(value: T) -> Self {
        Self { value, warning: None }
    }
}

/// Load a JSON document, falling back to `default` when the file is absent,
/// zero-length, or not valid JSON for `T`.
///
/// I/O failures other than "not found" are still returned as errors.
pub fn load_json<T: DeserializeOwned>(path: &Path, default: T) -> Result<Loaded<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::clean(default)),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    if content.is_empty() {
        return Ok(Loaded::clean(default));
    }

    match serde_json::from_str(&content) {
        Ok(value) => Ok(Loaded::clean(value)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "discarding malformed JSON document");
            Ok(Loaded {
                value: default,
                warning: Some(format!(
                    "{} is malformed; falling back to the default value",
                    path.display()
                )),
            })
        }
    }
}

/// Overwrite `path` with `document` as two-space indented JSON
pub fn save_json<T: Serialize + ?Sized>(path: &Path, document: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let content = serde_json::to_string_pretty(document)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "saved JSON document");
    Ok(())
}
