//! rigger deploys a set of interdependent EVM contracts in dependency order.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::Cli;
use rigger_deploy::{
    FsLedger, HardhatArtifacts, JsonRpcTransport, Ledger, NamedAccounts, Orchestrator, Plan,
    RiggerConfig, RunContext, RunOptions, RunReport,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = RiggerConfig::load(&cli.config)?;
    let network = config.network(&cli.network)?;
    let accounts = NamedAccounts::resolve(&config.accounts)?;

    tracing::info!(
        config_path = %cli.config.display(),
        network = %network.name,
        rpc_url = %network.rpc_url,
        live = network.live,
        "Loading deployment..."
    );

    let artifacts = HardhatArtifacts::new(&config.artifacts)
        .with_context(|| format!("Failed to index artifacts in {}", config.artifacts.display()))?;
    let ledger = FsLedger::new(&config.deployments);
    let transport = JsonRpcTransport::new(
        network.rpc_url.clone(),
        network.confirmation_timeout(),
        network.poll_interval(),
    )?;
    let options = RunOptions {
        redeploy: cli.redeploy,
        force_wiring: cli.force_wiring,
        tags: cli.tags,
    };

    let ctx = RunContext {
        network: &network,
        accounts: &accounts,
        deterministic: &config.deterministic,
        transport: &transport,
        ledger: &ledger,
        options: &options,
    };
    let orchestrator = Orchestrator::new(&config.units, &artifacts, ctx);

    if cli.dry_run {
        let plan = orchestrator.plan()?;
        println!("{}", plan_table(&plan, &ledger, &network.name)?);
        return Ok(());
    }

    let report = orchestrator.run().await?;
    println!("{}", report_table(&report));

    if report.definitions_changed {
        tracing::info!("Unit definitions changed since the previous run on this network");
    }

    Ok(())
}

fn plan_table(plan: &Plan, ledger: &FsLedger, network: &str) -> Result<Table> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Unit", "Contract", "Mode", "Recorded at"]);

    for (index, unit) in plan.units.iter().enumerate() {
        let recorded = ledger
            .get(network, &unit.name)?
            .map(|record| record.address.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            (index + 1).to_string(),
            unit.name.clone(),
            unit.contract_name().to_string(),
            if unit.deterministic { "create2" } else { "create" }.to_string(),
            recorded,
        ]);
    }

    Ok(table)
}

fn report_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Unit", "Status", "Address", "Transaction", "Wiring calls"]);

    for outcome in &report.outcomes {
        table.add_row(vec![
            outcome.unit.clone(),
            outcome.status.to_string(),
            outcome.address.to_string(),
            outcome
                .transaction_hash
                .map(|hash| hash.to_string())
                .unwrap_or_else(|| "-".to_string()),
            outcome.wiring_calls.to_string(),
        ]);
    }

    table
}
