use std::path::PathBuf;

use clap::Parser;
use rigger_deploy::CONFIG_FILENAME;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "rigger")]
#[command(
    author,
    version,
    about = "Deploy interdependent EVM contracts in dependency order"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "RIGGER_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file, or to the directory containing it.
    #[arg(short, long, alias = "conf", env = "RIGGER_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// The network to deploy to, as named in the configuration.
    #[arg(short, long, env = "RIGGER_NETWORK")]
    pub network: String,

    /// Only deploy the units carrying one of these tags, and their dependencies.
    #[arg(short, long, env = "RIGGER_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Deploy every selected unit again, even when the ledger already holds it.
    #[arg(long, env = "RIGGER_REDEPLOY", default_value_t = false)]
    pub redeploy: bool,

    /// Send wiring calls again even when they already went through.
    #[arg(long, env = "RIGGER_FORCE_WIRING", default_value_t = false)]
    pub force_wiring: bool,

    /// Print the execution plan and exit without touching the network.
    #[arg(long, env = "RIGGER_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,
}
