use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::{FsLedger, UnitSet};

/// Name of the manifest file stored in each network directory of the ledger.
pub const MANIFEST_FILENAME: &str = ".manifest.json";

/// Compute a SHA-256 hash of a unit set.
///
/// The hash is deterministic: the unit set is serialized to JSON in declaration
/// order before hashing, so the same definitions always produce the same hash.
pub fn unit_set_hash(units: &UnitSet) -> Result<String> {
    let json = serde_json::to_string(units).context("Failed to serialize unit set")?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

/// Metadata about the last run against a network, stored next to its ledger entries.
///
/// Used to tell the operator that unit definitions changed since the previous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    /// SHA-256 hash of the unit set used by the run.
    pub config_hash: String,
    /// Chain id observed during the run.
    pub chain_id: u64,
    /// Unix timestamp of the run.
    pub updated_at: i64,
    /// Version of the tool that performed the run.
    pub rigger_version: String,
}

impl RunManifest {
    /// Create a manifest stamped with the current time and crate version.
    pub fn new(config_hash: String, chain_id: u64) -> Self {
        Self {
            config_hash,
            chain_id,
            updated_at: chrono::Utc::now().timestamp(),
            rigger_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Save the manifest as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize run manifest")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        FsLedger::write_durable(path, json.as_bytes())
            .with_context(|| format!("Failed to write run manifest to {}", path.display()))
    }

    /// Load a manifest. Errors if the file is missing or malformed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Run manifest does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run manifest from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse run manifest JSON")
    }
}
