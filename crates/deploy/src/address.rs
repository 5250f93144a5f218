//! Contract address resolution.
//!
//! Deterministic units live at a CREATE2 address derived from the factory, the
//! salt and the final init code. Every other unit is known by the address its
//! deployment produced, either earlier in this run or in a previous one.

use std::collections::HashMap;

use alloy_core::primitives::{Address, B256};

use crate::{DeployError, DeterministicConfig, Ledger};

/// CREATE2 address of `init_code` deployed by `factory` with `salt`.
pub fn create2_address(factory: Address, salt: B256, init_code: &[u8]) -> Address {
    factory.create2_from_code(salt, init_code)
}

/// Where a resolved address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Resolution {
    /// Deployed or adopted earlier in the current run.
    CurrentRun,
    /// Read from the deployment ledger.
    Ledger,
}

/// Addresses of the units handled so far in a run, backed by the ledger.
#[derive(Debug, Default)]
pub struct AddressResolver {
    resolved: HashMap<String, Address>,
}

impl AddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address a deterministic unit with `init_code` will have.
    pub fn predict(config: &DeterministicConfig, init_code: &[u8]) -> Address {
        create2_address(config.factory, config.salt, init_code)
    }

    /// Remember the address of `unit` for the rest of the run.
    pub fn record(&mut self, unit: &str, address: Address) {
        self.resolved.insert(unit.to_string(), address);
    }

    pub fn get(&self, unit: &str) -> Option<Address> {
        self.resolved.get(unit).copied()
    }

    /// Resolve the address of `name` on behalf of `requester`.
    pub fn resolve<L: Ledger>(
        &self,
        ledger: &L,
        network: &str,
        requester: &str,
        name: &str,
    ) -> Result<(Address, Resolution), DeployError> {
        if let Some(address) = self.get(name) {
            return Ok((address, Resolution::CurrentRun));
        }

        match ledger.get(network, name).map_err(DeployError::Ledger)? {
            Some(record) => Ok((record.address, Resolution::Ledger)),
            None => Err(DeployError::UnresolvedDependency {
                unit: requester.to_string(),
                dependency: name.to_string(),
            }),
        }
    }
}
