//! Run configuration loaded from `Rigger.toml` and the environment.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, address};
use alloy_signer_local::{MnemonicBuilder, coins_bip39::English};
use anyhow::{Context, Result};
use derive_more::Deref;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_SENDER, UnitSet};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Rigger.toml";

/// Prefix of the environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "RIGGER_";

/// The deterministic deployment proxy available on most EVM chains.
pub const DETERMINISTIC_DEPLOYMENT_PROXY: Address =
    address!("4e59b44847b379578588920ca78fbf26c0b4956c");

/// Default time to wait for a transaction receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Default delay between two receipt polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Complete configuration of a deployment project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiggerConfig {
    /// Directory holding the compiler artifacts.
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,
    /// Directory holding the deployment ledger.
    #[serde(default = "default_deployments")]
    pub deployments: PathBuf,
    /// Networks that can be deployed to, by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Named accounts.
    #[serde(default)]
    pub accounts: AccountsConfig,
    /// CREATE2 factory and salt for deterministic units.
    #[serde(default)]
    pub deterministic: DeterministicConfig,
    /// Deployment units, in declaration order.
    #[serde(default)]
    pub units: UnitSet,
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_deployments() -> PathBuf {
    PathBuf::from("deployments")
}

impl RiggerConfig {
    /// Load the configuration from a TOML file, overridden by `RIGGER_` environment
    /// variables (`RIGGER_NETWORKS__BSC__RPC_URL` sets `networks.bsc.rpc_url`).
    ///
    /// Relative `artifacts` and `deployments` paths are resolved against the
    /// directory of the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let mut config: Self = Figment::new()
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| {
                anyhow::anyhow!(
                    "Failed to load configuration from {}: {}",
                    config_path.display(),
                    err
                )
            })?;

        if let Some(base) = config_path.parent() {
            config.artifacts = base.join(&config.artifacts);
            config.deployments = base.join(&config.deployments);
        }

        tracing::info!(path = %config_path.display(), units = config.units.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parse a configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Figment::from(Toml::string(content))
            .extract()
            .map_err(|err| anyhow::anyhow!("Failed to parse configuration: {}", err))
    }

    /// The configuration of the network called `name`.
    pub fn network(&self, name: &str) -> Result<NetworkConfig> {
        let mut network = self.networks.get(name).cloned().with_context(|| {
            format!(
                "Unknown network `{}` (configured: {})",
                name,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })?;
        network.name = name.to_string();
        Ok(network)
    }
}

/// A network the units can be deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name, filled in from the configuration key.
    #[serde(skip)]
    pub name: String,
    /// JSON-RPC endpoint.
    pub rpc_url: url::Url,
    /// Whether this is a live network. Bytecode patches only apply to simulated ones.
    #[serde(default = "default_live")]
    pub live: bool,
    /// Value used instead of the live chain id for `chain-id` arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id_override: Option<u64>,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_live() -> bool {
    true
}

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>, rpc_url: url::Url, live: bool) -> Self {
        Self {
            name: name.into(),
            rpc_url,
            live,
            chain_id_override: None,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// CREATE2 parameters of deterministic units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicConfig {
    /// Factory receiving `salt ++ init_code`.
    #[serde(default = "default_factory")]
    pub factory: Address,
    #[serde(default)]
    pub salt: B256,
}

fn default_factory() -> Address {
    DETERMINISTIC_DEPLOYMENT_PROXY
}

impl Default for DeterministicConfig {
    fn default() -> Self {
        Self {
            factory: DETERMINISTIC_DEPLOYMENT_PROXY,
            salt: B256::ZERO,
        }
    }
}

/// Named account roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Mnemonic used to derive accounts given by index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    /// Role name to account.
    #[serde(default)]
    pub named: BTreeMap<String, AccountRef>,
}

/// An account given by mnemonic index or by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    Index(u32),
    Address(Address),
}

/// Resolved addresses of the named accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct NamedAccounts(BTreeMap<String, Address>);

impl NamedAccounts {
    pub fn new(accounts: BTreeMap<String, Address>) -> Self {
        Self(accounts)
    }

    /// Resolve every named account, deriving indexed ones from the mnemonic.
    ///
    /// The `deployer` role is required.
    pub fn resolve(config: &AccountsConfig) -> Result<Self> {
        if !config.named.contains_key(DEFAULT_SENDER) {
            anyhow::bail!("No `{DEFAULT_SENDER}` account configured in [accounts.named]");
        }

        let mut accounts = BTreeMap::new();

        for (role, account) in &config.named {
            let address = match account {
                AccountRef::Address(address) => *address,
                AccountRef::Index(index) => {
                    let phrase = config.mnemonic.as_deref().with_context(|| {
                        format!("Account `{role}` is given by index but no mnemonic is configured")
                    })?;
                    derive_address(phrase, *index)
                        .with_context(|| format!("Failed to derive account `{role}`"))?
                }
            };
            tracing::debug!(role = %role, address = %address, "Named account");
            accounts.insert(role.clone(), address);
        }

        Ok(Self(accounts))
    }

    pub fn address(&self, role: &str) -> Option<Address> {
        self.0.get(role).copied()
    }
}

/// Address of the account at `index` on the default derivation path of `phrase`.
fn derive_address(phrase: &str, index: u32) -> Result<Address> {
    let signer = MnemonicBuilder::<English>::default()
        .phrase(phrase)
        .index(index)
        .context("Invalid derivation index")?
        .build()
        .context("Invalid mnemonic")?;
    Ok(Address::from_slice(signer.address().as_slice()))
}
