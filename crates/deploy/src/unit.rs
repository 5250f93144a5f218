//! Deployment unit definitions.
//!
//! Units are declared statically in `Rigger.toml` and never change during a
//! run. Declaration order matters: it is the tie-breaker whenever several
//! units are ready at the same time.

use alloy_core::primitives::{Address, B256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

/// Named account used as the sender when a unit does not specify one.
pub const DEFAULT_SENDER: &str = "deployer";

/// A named deployment task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique unit name, also the ledger key.
    pub name: String,
    /// Artifact name. Defaults to the unit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Units that must complete before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Selection labels used by `--tags`.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Constructor argument template.
    #[serde(default)]
    pub args: Vec<ArgTemplate>,
    /// Deploy through the CREATE2 factory at a precomputed address.
    #[serde(default)]
    pub deterministic: bool,
    /// Named account sending the deployment transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Gas limit for the deployment transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Bytecode substitution applied on simulated networks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<BytecodePatch>,
    /// Calls issued once the unit has been deployed.
    #[serde(default)]
    pub wiring: Vec<WiringCall>,
}

/// One constructor or wiring argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgTemplate {
    /// A value coerced against the ABI input type (`"1000000000000000000"`, `"0xabc..."`, `"true"`).
    Literal(String),
    /// The resolved address of a unit.
    Unit(String),
    /// The address of a named account.
    Account(String),
    /// A value read from the run environment.
    Env(EnvValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EnvValue {
    /// The chain identifier, or the network's configured override.
    ChainId,
}

/// Replace a compile-time fingerprint with the one found on a simulated network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodePatch {
    /// The 32-byte value embedded by the compiler.
    pub placeholder: B256,
    /// Where the actual value is read from.
    pub probe: Probe,
}

/// A read-only call returning a 32-byte word.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Probe {
    #[serde(flatten)]
    pub target: ProbeTarget,
    /// Method name, or full signature such as `pairCodeHash()`.
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeTarget {
    Unit(String),
    Address(Address),
}

/// A post-deployment call binding deployed units together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringCall {
    /// Unit receiving the call.
    pub target: String,
    /// Method name, or full signature when overloaded.
    pub method: String,
    #[serde(default)]
    pub args: Vec<ArgTemplate>,
    /// Named account sending the call. Defaults to the unit's sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Unit {
    /// Create a unit with no arguments and no dependencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            dependencies: Vec::new(),
            tags: Vec::new(),
            args: Vec::new(),
            deterministic: false,
            from: None,
            gas_limit: None,
            patch: None,
            wiring: Vec::new(),
        }
    }

    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }

    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(DEFAULT_SENDER)
    }

    /// Whether the unit carries `tag`. A unit is always tagged with its own name.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.name == tag || self.tags.iter().any(|t| t == tag)
    }

    /// Declared dependencies followed by every unit referenced by arguments,
    /// the patch probe and wiring calls, without duplicates. References to the
    /// unit itself are dropped; a declared self-dependency is kept.
    pub fn effective_dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for name in &self.dependencies {
            if !deps.contains(&name.as_str()) {
                deps.push(name);
            }
        }

        let mut candidates: Vec<&str> = unit_references(&self.args).collect();
        if let Some(BytecodePatch {
            probe:
                Probe {
                    target: ProbeTarget::Unit(name),
                    ..
                },
            ..
        }) = &self.patch
        {
            candidates.push(name);
        }
        for call in &self.wiring {
            candidates.push(&call.target);
            candidates.extend(unit_references(&call.args));
        }

        for name in candidates {
            if name != self.name && !deps.contains(&name) {
                deps.push(name);
            }
        }
        deps
    }
}

fn unit_references(args: &[ArgTemplate]) -> impl Iterator<Item = &str> {
    args.iter().filter_map(|arg| match arg {
        ArgTemplate::Unit(name) => Some(name.as_str()),
        _ => None,
    })
}

/// Units in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref)]
#[serde(transparent)]
pub struct UnitSet(Vec<Unit>);

impl UnitSet {
    pub fn new(units: Vec<Unit>) -> Self {
        Self(units)
    }

    pub fn find(&self, name: &str) -> Option<&Unit> {
        self.0.iter().find(|unit| unit.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

impl From<Vec<Unit>> for UnitSet {
    fn from(units: Vec<Unit>) -> Self {
        Self(units)
    }
}
