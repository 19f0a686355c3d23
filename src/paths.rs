//! Storage paths for actor journals.
//!
//! Everything lives under a single data directory (default `~/.employee-actors/`):
//! - `actors/<aggregate>/<address>-<hash>/events.jsonl` - Event log of one actor
//! - `actors/<aggregate>/<address>-<hash>/snapshot.json` - Aggregate snapshot of one actor
//!
//! Addresses are caller-supplied, so the directory name is a sanitized copy
//! qualified by a hash of the raw address to keep distinct addresses apart.
//! The aggregate type keeps an employee id that looks like a child address
//! (`notifications_E1`) out of that child's log.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// The name of the default data directory.
const DATA_DIR_NAME: &str = ".employee-actors";

/// Returns the home-based data directory: `~/.employee-actors/`
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory for actor storage")?;
    Ok(home.join(DATA_DIR_NAME))
}

/// Returns the journal directory of one actor:
/// `<data_dir>/actors/<aggregate>/<sanitized-address>-<hash>/`
pub fn actor_dir(data_dir: &Path, aggregate_type: &str, address: &str) -> PathBuf {
    data_dir
        .join("actors")
        .join(sanitize_address(aggregate_type))
        .join(format!(
            "{}-{}",
            sanitize_address(address),
            address_hash(address)
        ))
}

/// Returns the event log path of one actor.
pub fn events_path(data_dir: &Path, aggregate_type: &str, address: &str) -> PathBuf {
    actor_dir(data_dir, aggregate_type, address).join("events.jsonl")
}

/// Returns the snapshot path of one actor.
pub fn snapshot_path(data_dir: &Path, aggregate_type: &str, address: &str) -> PathBuf {
    actor_dir(data_dir, aggregate_type, address).join("snapshot.json")
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_address(address: &str) -> String {
    address
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Computes an address hash (SHA256 truncated to 12 hex characters).
pub fn address_hash(address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    let result = hasher.finalize();

    // Take first 6 bytes (12 hex characters)
    hex_encode(&result[..6])
}

/// Encodes bytes as lowercase hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
