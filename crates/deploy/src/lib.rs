//! rigger-deploy - Deployment orchestration for interdependent EVM contracts.
//!
//! This crate deploys a set of named units in dependency order, wires them
//! together after deployment and records every deployment in a durable ledger
//! so that repeated runs only do the work that is left.

mod abi;
mod adapter;
pub use adapter::{BytecodeAdapter, replace_all};

mod address;
pub use address::{AddressResolver, Resolution, create2_address};

mod artifact;
pub use artifact::{Artifact, ArtifactProvider, HardhatArtifacts};

mod config;
pub use config::{
    AccountRef, AccountsConfig, CONFIG_FILENAME, DETERMINISTIC_DEPLOYMENT_PROXY,
    DeterministicConfig, ENV_PREFIX, NamedAccounts, NetworkConfig, RiggerConfig,
};

mod context;
pub use context::{RunContext, RunOptions, RunState};

mod error;
pub use error::DeployError;

mod executor;
pub use executor::{UnitExecutor, UnitOutcome, UnitStatus};

mod ledger;
pub use ledger::{DeploymentRecord, FsLedger, Ledger};

mod manifest;
pub use manifest::{MANIFEST_FILENAME, RunManifest, unit_set_hash};

mod orchestrator;
pub use orchestrator::{Orchestrator, Plan, RunReport};

mod rpc;
pub use rpc::JsonRpcTransport;

mod scheduler;
pub use scheduler::Scheduler;

mod transport;
pub use transport::{Receipt, Transport};

mod unit;
pub use unit::{
    ArgTemplate, BytecodePatch, DEFAULT_SENDER, EnvValue, Probe, ProbeTarget, Unit, UnitSet,
    WiringCall,
};
