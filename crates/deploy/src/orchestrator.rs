//! Deployment run orchestration.
//!
//! A run is split in two phases. The plan is computed from the configuration
//! and the artifacts alone: unit selection, ordering and every check that does
//! not need the network. Only a valid plan is executed, unit by unit, in order.

use std::collections::HashMap;

use alloy_core::{dyn_abi::Specifier, json_abi::JsonAbi};

use crate::{
    ArgTemplate, Artifact, ArtifactProvider, DeployError, Ledger, ProbeTarget, RunContext,
    RunManifest, RunState, Scheduler, Transport, Unit, UnitExecutor, UnitOutcome, UnitSet, abi,
    adapter, unit_set_hash,
};

/// Units of a run in execution order, with their artifacts.
#[derive(Debug, Clone)]
pub struct Plan {
    pub units: Vec<Unit>,
    /// Artifacts by unit name.
    pub artifacts: HashMap<String, Artifact>,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub network: String,
    pub chain_id: u64,
    pub outcomes: Vec<UnitOutcome>,
    /// Whether the unit definitions differ from the previous run on this network.
    pub definitions_changed: bool,
}

/// Plans and executes deployment runs.
pub struct Orchestrator<'a, A, T, L> {
    units: &'a UnitSet,
    artifacts: &'a A,
    ctx: RunContext<'a, T, L>,
}

impl<'a, A: ArtifactProvider, T: Transport + Sync, L: Ledger + Sync> Orchestrator<'a, A, T, L> {
    pub fn new(units: &'a UnitSet, artifacts: &'a A, ctx: RunContext<'a, T, L>) -> Self {
        Self {
            units,
            artifacts,
            ctx,
        }
    }

    /// Select, order and check the units of the run without touching the network.
    pub fn plan(&self) -> Result<Plan, DeployError> {
        let selected = Scheduler::new(self.units).select(&self.ctx.options.tags)?;
        let units: Vec<Unit> = Scheduler::new(&selected)
            .order()?
            .into_iter()
            .cloned()
            .collect();

        let mut artifacts = HashMap::new();
        for unit in &units {
            let artifact = self
                .artifacts
                .artifact(unit.contract_name())
                .map_err(|err| match err {
                    // Providers only know the contract name.
                    DeployError::ArtifactNotFound { contract, .. } => {
                        DeployError::ArtifactNotFound {
                            unit: unit.name.clone(),
                            contract,
                        }
                    }
                    other => other,
                })?;
            artifacts.insert(unit.name.clone(), artifact);
        }

        for unit in &units {
            self.check_unit(unit, &artifacts)?;
        }

        tracing::debug!(
            units = ?units.iter().map(|unit| &unit.name).collect::<Vec<_>>(),
            "Run planned"
        );
        Ok(Plan { units, artifacts })
    }

    fn check_unit(
        &self,
        unit: &Unit,
        artifacts: &HashMap<String, Artifact>,
    ) -> Result<(), DeployError> {
        let artifact = &artifacts[&unit.name];

        let arity = abi::constructor_arity(&artifact.abi);
        if arity != unit.args.len() {
            return Err(DeployError::invalid(
                &unit.name,
                format!(
                    "constructor of `{}` takes {} argument(s), {} configured",
                    artifact.contract,
                    arity,
                    unit.args.len()
                ),
            ));
        }
        if let Some(constructor) = &artifact.abi.constructor {
            for (param, arg) in constructor.inputs.iter().zip(&unit.args) {
                if let ArgTemplate::Literal(value) = arg {
                    let coerced = param
                        .resolve()
                        .map_err(anyhow::Error::from)
                        .and_then(|ty| ty.coerce_str(value).map_err(anyhow::Error::from));
                    if let Err(err) = coerced {
                        return Err(DeployError::invalid(
                            &unit.name,
                            format!("argument `{}`: {err}", param.name),
                        ));
                    }
                }
            }
        }

        self.check_accounts(unit, unit.sender(), &unit.args)?;

        for call in &unit.wiring {
            let target_abi = Self::abi_of(artifacts, &call.target, unit)?;
            let function = abi::find_function(target_abi, &call.method)
                .map_err(|err| DeployError::invalid(&unit.name, format!("wiring on `{}`: {err}", call.target)))?;
            if function.inputs.len() != call.args.len() {
                return Err(DeployError::invalid(
                    &unit.name,
                    format!(
                        "`{}` takes {} argument(s), {} configured",
                        function.signature(),
                        function.inputs.len(),
                        call.args.len()
                    ),
                ));
            }
            self.check_accounts(unit, call.from.as_deref().unwrap_or(unit.sender()), &call.args)?;
        }

        if let Some(patch) = &unit.patch {
            let probe_abi = match &patch.probe.target {
                ProbeTarget::Unit(name) => Some(Self::abi_of(artifacts, name, unit)?),
                ProbeTarget::Address(_) => None,
            };
            adapter::probe_calldata(&patch.probe.method, probe_abi)
                .map_err(|err| DeployError::invalid(&unit.name, format!("probe: {err}")))?;
        }

        Ok(())
    }

    fn abi_of<'b>(
        artifacts: &'b HashMap<String, Artifact>,
        name: &str,
        unit: &Unit,
    ) -> Result<&'b JsonAbi, DeployError> {
        artifacts
            .get(name)
            .map(|artifact| &artifact.abi)
            .ok_or_else(|| DeployError::MissingDependency {
                unit: unit.name.clone(),
                dependency: name.to_string(),
            })
    }

    fn check_accounts(
        &self,
        unit: &Unit,
        sender: &str,
        args: &[ArgTemplate],
    ) -> Result<(), DeployError> {
        self.ctx.account(&unit.name, sender)?;
        for arg in args {
            if let ArgTemplate::Account(role) = arg {
                self.ctx.account(&unit.name, role)?;
            }
        }
        Ok(())
    }

    /// Plan the run, then execute every unit in order.
    ///
    /// Stops at the first failing unit. Units completed before the failure keep
    /// their ledger entries, so running again resumes where this run stopped.
    pub async fn run(&self) -> Result<RunReport, DeployError> {
        let plan = self.plan()?;
        let network = self.ctx.network_name();
        let ledger = self.ctx.ledger;

        let chain_id = self
            .ctx
            .transport
            .chain_id()
            .await
            .map_err(DeployError::Network)?;
        tracing::info!(network, chain_id, units = plan.units.len(), "Starting deployment run");

        match ledger.chain_id(network).map_err(DeployError::Ledger)? {
            Some(recorded) if recorded != chain_id => {
                tracing::warn!(
                    network,
                    recorded,
                    chain_id,
                    "Ledger was written for another chain, its records may not exist on this one"
                );
            }
            Some(_) => {}
            None => ledger
                .set_chain_id(network, chain_id)
                .map_err(DeployError::Ledger)?,
        }

        let executor = UnitExecutor::new(self.ctx);
        let mut state = RunState::new(chain_id, plan.artifacts);
        let mut outcomes = Vec::with_capacity(plan.units.len());

        for unit in &plan.units {
            let outcome = executor.execute(&mut state, unit).await?;
            outcomes.push(outcome);
        }

        let definitions_changed = self.write_manifest(chain_id)?;

        tracing::info!(network, units = outcomes.len(), "Deployment run complete");
        Ok(RunReport {
            network: network.to_string(),
            chain_id,
            outcomes,
            definitions_changed,
        })
    }

    /// Record the unit definitions of this run. Returns whether they changed.
    fn write_manifest(&self, chain_id: u64) -> Result<bool, DeployError> {
        let network = self.ctx.network_name();
        let ledger = self.ctx.ledger;
        let config_hash = unit_set_hash(self.units).map_err(DeployError::Ledger)?;

        let changed = match ledger.manifest(network) {
            Ok(Some(previous)) if previous.config_hash != config_hash => {
                tracing::warn!(
                    network,
                    previous = %previous.config_hash,
                    current = %config_hash,
                    "Unit definitions changed since the last run"
                );
                true
            }
            Ok(Some(_)) => false,
            Ok(None) => {
                tracing::debug!(network, "No previous run manifest");
                false
            }
            Err(err) => {
                tracing::warn!(network, error = ?err, "Unreadable run manifest, replacing it");
                false
            }
        };

        ledger
            .put_manifest(network, &RunManifest::new(config_hash, chain_id))
            .map_err(DeployError::Ledger)?;
        Ok(changed)
    }
}
