//! Compiled contract artifacts.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::DeployError;

/// Interface description and init bytecode of a compiled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub contract: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

/// Source of compiled artifacts.
pub trait ArtifactProvider {
    /// Look up the artifact compiled for `contract`.
    fn artifact(&self, contract: &str) -> Result<Artifact, DeployError>;
}

/// Artifact file layout shared by hardhat and foundry.
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    abi: JsonAbi,
    bytecode: Value,
}

/// Artifacts read from a compiler output directory.
///
/// The directory is indexed recursively once. Both hardhat (`"bytecode": "0x..."`)
/// and foundry (`"bytecode": { "object": "0x..." }`) layouts are understood.
#[derive(Debug, Clone)]
pub struct HardhatArtifacts {
    root: PathBuf,
    index: HashMap<String, PathBuf>,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut index = HashMap::new();
        Self::index_dir(&root, &mut index)
            .with_context(|| format!("Failed to index artifacts in {}", root.display()))?;

        tracing::debug!(
            root = %root.display(),
            artifacts = index.len(),
            "Indexed contract artifacts"
        );

        Ok(Self { root, index })
    }

    fn index_dir(dir: &Path, index: &mut HashMap<String, PathBuf>) -> Result<()> {
        let mut entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .collect::<std::io::Result<Vec<_>>>()?;
        // Directory iteration order is platform dependent.
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                Self::index_dir(&path, index)?;
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.ends_with(".dbg.json") {
                continue;
            }
            let Some(contract) = file_name.strip_suffix(".json") else {
                continue;
            };

            if let Some(previous) = index.get(contract) {
                tracing::warn!(
                    contract,
                    kept = %previous.display(),
                    ignored = %path.display(),
                    "Duplicate artifact name"
                );
                continue;
            }
            index.insert(contract.to_string(), path);
        }

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load(&self, contract: &str, path: &Path) -> Result<Option<Artifact>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let file: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        let hex_code = match &file.bytecode {
            Value::String(code) => code.as_str(),
            Value::Object(object) => object
                .get("object")
                .and_then(Value::as_str)
                .context("Foundry artifact has no bytecode object")?,
            _ => anyhow::bail!("Unsupported bytecode format in {}", path.display()),
        };

        let bytecode = hex::decode(hex_code.trim_start_matches("0x"))
            .with_context(|| format!("Invalid bytecode hex in {}", path.display()))?;

        // Interfaces and abstract contracts compile to empty bytecode.
        if bytecode.is_empty() {
            return Ok(None);
        }

        Ok(Some(Artifact {
            contract: contract.to_string(),
            abi: file.abi,
            bytecode: bytecode.into(),
        }))
    }
}

impl ArtifactProvider for HardhatArtifacts {
    fn artifact(&self, contract: &str) -> Result<Artifact, DeployError> {
        let not_found = || DeployError::ArtifactNotFound {
            unit: contract.to_string(),
            contract: contract.to_string(),
        };

        let path = self.index.get(contract).ok_or_else(not_found)?;
        match self.load(contract, path) {
            Ok(Some(artifact)) => Ok(artifact),
            Ok(None) => Err(not_found()),
            Err(cause) => Err(DeployError::InvalidArtifact {
                contract: contract.to_string(),
                cause,
            }),
        }
    }
}
