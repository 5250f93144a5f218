//! Persisted deployment records.
//!
//! The ledger maps `(network, unit)` to the record of the unit's deployment.
//! It is read before every deployment to skip work already done, and written
//! right after each successful deployment.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{MANIFEST_FILENAME, RunManifest};

/// Name of the lock file guarding writes to a network directory.
const LOCK_FILENAME: &str = ".lock";

/// Name of the file recording which chain a network directory belongs to.
const CHAIN_ID_FILENAME: &str = ".chainId";

/// A deployment as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Address of the deployed contract.
    pub address: Address,
    /// ABI snapshot taken at deployment time.
    pub abi: JsonAbi,
    /// keccak256 of the init code (bytecode and encoded constructor arguments).
    pub bytecode_hash: B256,
    /// Deployment transaction. Absent when an existing deterministic deployment was adopted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    /// Whether the contract lives at a CREATE2 address.
    #[serde(default)]
    pub deterministic: bool,
    /// Constructor arguments as they were encoded.
    #[serde(default)]
    pub args: Vec<String>,
    /// Hash of the wiring calls last sent successfully for this deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiring_hash: Option<B256>,
    /// Unix timestamp of the deployment.
    pub deployed_at: i64,
}

/// Durable storage for deployment records.
pub trait Ledger {
    fn get(&self, network: &str, unit: &str) -> Result<Option<DeploymentRecord>>;

    /// Store `record`, replacing any previous record for the same unit.
    ///
    /// The record must be durable when this returns.
    fn put(&self, network: &str, unit: &str, record: &DeploymentRecord) -> Result<()>;

    /// Chain id the records of `network` were written for, if known.
    fn chain_id(&self, network: &str) -> Result<Option<u64>>;

    fn set_chain_id(&self, network: &str, chain_id: u64) -> Result<()>;

    /// Manifest of the last completed run against `network`.
    fn manifest(&self, network: &str) -> Result<Option<RunManifest>>;

    fn put_manifest(&self, network: &str, manifest: &RunManifest) -> Result<()>;
}

/// Ledger stored as one JSON file per unit: `<root>/<network>/<unit>.json`.
#[derive(Debug, Clone)]
pub struct FsLedger {
    root: PathBuf,
}

impl FsLedger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn network_dir(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    fn record_path(&self, network: &str, unit: &str) -> PathBuf {
        self.network_dir(network).join(format!("{unit}.json"))
    }

    /// Take the exclusive write lock of a network directory, creating it if needed.
    fn lock(&self, network: &str) -> Result<File> {
        let dir = self.network_dir(network);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create ledger directory {}", dir.display()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILENAME))
            .context("Failed to open ledger lock file")?;
        FileExt::lock_exclusive(&lock)
            .with_context(|| format!("Failed to lock ledger directory {}", dir.display()))?;
        Ok(lock)
    }

    /// Write `content` to `path` atomically: temp file, fsync, rename.
    pub(crate) fn write_durable(path: &Path, content: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            tmp.write_all(content)
                .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
            tmp.sync_all()
                .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
        }
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move ledger entry into {}", path.display()))?;

        if let Some(parent) = path.parent() {
            // Persist the rename itself.
            File::open(parent)
                .and_then(|dir| dir.sync_all())
                .with_context(|| format!("Failed to sync {}", parent.display()))?;
        }
        Ok(())
    }

    fn manifest_path(&self, network: &str) -> PathBuf {
        self.network_dir(network).join(MANIFEST_FILENAME)
    }
}

impl Ledger for FsLedger {
    fn get(&self, network: &str, unit: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(network, unit);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read ledger entry {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ledger entry {}", path.display()))?;
        Ok(Some(record))
    }

    fn put(&self, network: &str, unit: &str, record: &DeploymentRecord) -> Result<()> {
        let _lock = self.lock(network)?;
        let path = self.record_path(network, unit);
        let json =
            serde_json::to_string_pretty(record).context("Failed to serialize ledger entry")?;

        Self::write_durable(&path, json.as_bytes())?;

        tracing::debug!(
            network,
            unit,
            address = %record.address,
            path = %path.display(),
            "Ledger entry written"
        );
        Ok(())
    }

    fn chain_id(&self, network: &str) -> Result<Option<u64>> {
        let path = self.network_dir(network).join(CHAIN_ID_FILENAME);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let chain_id = content
            .trim()
            .parse()
            .with_context(|| format!("Invalid chain id in {}", path.display()))?;
        Ok(Some(chain_id))
    }

    fn set_chain_id(&self, network: &str, chain_id: u64) -> Result<()> {
        let _lock = self.lock(network)?;
        let path = self.network_dir(network).join(CHAIN_ID_FILENAME);
        Self::write_durable(&path, chain_id.to_string().as_bytes())
    }

    fn manifest(&self, network: &str) -> Result<Option<RunManifest>> {
        let path = self.manifest_path(network);
        if !path.exists() {
            return Ok(None);
        }
        RunManifest::load_from_file(&path).map(Some)
    }

    fn put_manifest(&self, network: &str, manifest: &RunManifest) -> Result<()> {
        let _lock = self.lock(network)?;
        manifest.save_to_file(&self.manifest_path(network))
    }
}
