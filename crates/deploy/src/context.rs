//! Shared state of a deployment run.

use std::collections::HashMap;

use alloy_core::primitives::{Address, B256};

use crate::{
    AddressResolver, Artifact, DeployError, DeterministicConfig, NamedAccounts, NetworkConfig,
    Probe,
};

/// Operator switches of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Deploy again even when the ledger holds a matching record.
    pub redeploy: bool,
    /// Send wiring calls even when the record shows the same calls already went through.
    pub force_wiring: bool,
    /// Only run the units carrying one of these tags, and their dependencies.
    pub tags: Vec<String>,
}

/// Read-only environment a run executes against.
#[derive(Debug)]
pub struct RunContext<'a, T, L> {
    pub network: &'a NetworkConfig,
    pub accounts: &'a NamedAccounts,
    pub deterministic: &'a DeterministicConfig,
    pub transport: &'a T,
    pub ledger: &'a L,
    pub options: &'a RunOptions,
}

impl<T, L> Clone for RunContext<'_, T, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, L> Copy for RunContext<'_, T, L> {}

impl<'a, T, L> RunContext<'a, T, L> {
    pub fn network_name(&self) -> &'a str {
        &self.network.name
    }

    /// Address of the named account `role`, used by `unit`.
    pub fn account(&self, unit: &str, role: &str) -> Result<Address, DeployError> {
        self.accounts
            .address(role)
            .ok_or_else(|| DeployError::invalid(unit, format!("unknown named account `{role}`")))
    }

    /// Value of the `chain-id` argument given the chain id reported by the node.
    pub fn chain_id_arg(&self, chain_id: u64) -> u64 {
        self.network.chain_id_override.unwrap_or(chain_id)
    }
}

/// Mutable state accumulated while the units of a run execute.
#[derive(Debug)]
pub struct RunState {
    /// Chain id reported by the node at the start of the run.
    pub chain_id: u64,
    pub resolver: AddressResolver,
    /// Artifacts of the selected units, by unit name.
    pub artifacts: HashMap<String, Artifact>,
    probes: HashMap<Probe, B256>,
}

impl RunState {
    pub fn new(chain_id: u64, artifacts: HashMap<String, Artifact>) -> Self {
        Self {
            chain_id,
            resolver: AddressResolver::new(),
            artifacts,
            probes: HashMap::new(),
        }
    }

    pub fn artifact(&self, unit: &str) -> Result<&Artifact, DeployError> {
        self.artifacts
            .get(unit)
            .ok_or_else(|| DeployError::invalid(unit, "artifact was not loaded"))
    }

    /// Probe value already read during this run.
    pub fn probe(&self, probe: &Probe) -> Option<B256> {
        self.probes.get(probe).copied()
    }

    pub fn record_probe(&mut self, probe: Probe, value: B256) {
        self.probes.insert(probe, value);
    }
}
