//! Execution of a single deployment unit.

use alloy_core::primitives::{Address, B256, Bytes, keccak256};

use crate::{
    AddressResolver, ArgTemplate, Artifact, BytecodeAdapter, DeployError, DeploymentRecord,
    EnvValue, Ledger, Probe, ProbeTarget, RunContext, RunState, Transport, Unit, WiringCall, abi,
    adapter,
};

/// What happened to a unit during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum UnitStatus {
    /// A deployment transaction was sent.
    Deployed,
    /// A matching ledger record was found, nothing was deployed.
    Reused,
    /// Code already existed at the deterministic address and was recorded as is.
    Adopted,
}

/// Result of executing one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit: String,
    pub address: Address,
    pub status: UnitStatus,
    pub transaction_hash: Option<B256>,
    /// Number of wiring calls sent during this run.
    pub wiring_calls: usize,
}

/// A wiring call with its target resolved and its calldata encoded.
#[derive(Debug)]
struct PreparedCall {
    target: String,
    address: Address,
    method: String,
    signature: String,
    from: Address,
    calldata: Bytes,
}

/// Fingerprint of the wiring calls of a unit, as they would be sent. `None` when
/// there are none.
fn wiring_hash(calls: &[PreparedCall]) -> Option<B256> {
    if calls.is_empty() {
        return None;
    }

    let mut buf = Vec::new();
    for call in calls {
        buf.extend_from_slice(call.address.as_slice());
        buf.extend_from_slice(keccak256(call.signature.as_bytes()).as_slice());
        buf.extend_from_slice(&(call.calldata.len() as u64).to_be_bytes());
        buf.extend_from_slice(&call.calldata);
    }
    Some(keccak256(&buf))
}

/// Runs units against a [`RunContext`].
pub struct UnitExecutor<'a, T, L> {
    ctx: RunContext<'a, T, L>,
    adapter: BytecodeAdapter,
}

impl<'a, T: Transport + Sync, L: Ledger + Sync> UnitExecutor<'a, T, L> {
    pub fn new(ctx: RunContext<'a, T, L>) -> Self {
        Self {
            ctx,
            adapter: BytecodeAdapter::new(ctx.network.live),
        }
    }

    /// Deploy `unit` unless the ledger already holds it, then issue its wiring calls.
    ///
    /// The ledger entry is written as soon as the contract exists, before any
    /// wiring call. Once all calls went through, the entry records a hash of
    /// them. Wiring is sent again whenever the calls rendered by a later run
    /// hash differently, e.g. because an argument was redeployed.
    pub async fn execute(
        &self,
        state: &mut RunState,
        unit: &Unit,
    ) -> Result<UnitOutcome, DeployError> {
        let network = self.ctx.network_name();
        let artifact = state.artifact(&unit.name)?.clone();

        let args = self.render_args(state, &unit.name, &unit.args)?;

        let fingerprint = match &unit.patch {
            Some(patch) if self.adapter.needs_probe(Some(patch)) => {
                Some(self.probe(state, &unit.name, &patch.probe).await?)
            }
            _ => None,
        };
        let bytecode =
            self.adapter
                .adapt(&unit.name, &artifact.bytecode, unit.patch.as_ref(), fingerprint);

        let init_code = abi::encode_deployment(&artifact.abi, &bytecode, &args)
            .map_err(|err| DeployError::deployment(&unit.name, err))?;
        let bytecode_hash = keccak256(&init_code);

        let existing = self
            .ctx
            .ledger
            .get(network, &unit.name)
            .map_err(DeployError::Ledger)?;

        let (mut record, status) = match existing {
            Some(record) if !self.ctx.options.redeploy && record.bytecode_hash == bytecode_hash => {
                tracing::info!(unit = %unit.name, address = %record.address, "Reusing deployment from ledger");
                (record, UnitStatus::Reused)
            }
            existing => {
                if let Some(previous) = existing {
                    if self.ctx.options.redeploy {
                        tracing::info!(unit = %unit.name, previous = %previous.address, "Redeploying");
                    } else {
                        tracing::warn!(
                            unit = %unit.name,
                            previous = %previous.address,
                            "Init code changed since the recorded deployment, redeploying"
                        );
                    }
                }
                self.deploy(unit, &artifact, init_code, bytecode_hash, args)
                    .await?
            }
        };

        state.resolver.record(&unit.name, record.address);

        let calls = self.prepare_wiring(state, unit)?;
        let current = wiring_hash(&calls);
        let stale = record.wiring_hash != current;

        let mut wiring_calls = 0;
        if !calls.is_empty() && (stale || self.ctx.options.force_wiring) {
            if stale && status == UnitStatus::Reused {
                tracing::info!(unit = %unit.name, "Wiring differs from the recorded one, sending it again");
            }
            for call in &calls {
                self.wire(unit, call).await?;
                wiring_calls += 1;
            }
        }
        if stale {
            record.wiring_hash = current;
            self.ctx
                .ledger
                .put(network, &unit.name, &record)
                .map_err(DeployError::Ledger)?;
        }

        Ok(UnitOutcome {
            unit: unit.name.clone(),
            address: record.address,
            status,
            transaction_hash: record.transaction_hash,
            wiring_calls,
        })
    }

    /// Send the deployment of `unit` and commit its ledger entry.
    async fn deploy(
        &self,
        unit: &Unit,
        artifact: &Artifact,
        init_code: Bytes,
        bytecode_hash: B256,
        args: Vec<String>,
    ) -> Result<(DeploymentRecord, UnitStatus), DeployError> {
        let failed = |err| DeployError::deployment(&unit.name, err);
        let from = self.ctx.account(&unit.name, unit.sender())?;

        let (address, transaction_hash, status) = if unit.deterministic {
            let config = self.ctx.deterministic;
            let predicted = AddressResolver::predict(config, &init_code);

            let code = self.ctx.transport.code_at(predicted).await.map_err(failed)?;
            if !code.is_empty() {
                tracing::info!(unit = %unit.name, address = %predicted, "Code already at deterministic address, adopting it");
                (predicted, None, UnitStatus::Adopted)
            } else {
                tracing::info!(unit = %unit.name, address = %predicted, factory = %config.factory, "Deploying deterministically...");

                let mut calldata = config.salt.to_vec();
                calldata.extend_from_slice(&init_code);
                let receipt = self
                    .ctx
                    .transport
                    .transact(from, config.factory, calldata.into(), unit.gas_limit)
                    .await
                    .map_err(failed)?;

                let code = self.ctx.transport.code_at(predicted).await.map_err(failed)?;
                if code.is_empty() {
                    return Err(failed(anyhow::anyhow!(
                        "No code at predicted address {} after factory call {}",
                        predicted,
                        receipt.transaction_hash
                    )));
                }
                (predicted, Some(receipt.transaction_hash), UnitStatus::Deployed)
            }
        } else {
            tracing::info!(unit = %unit.name, contract = unit.contract_name(), from = %from, "Deploying...");

            let receipt = self
                .ctx
                .transport
                .deploy(from, init_code, unit.gas_limit)
                .await
                .map_err(failed)?;
            let address = receipt.contract_address.ok_or_else(|| {
                failed(anyhow::anyhow!(
                    "Transaction {} created no contract",
                    receipt.transaction_hash
                ))
            })?;
            (address, Some(receipt.transaction_hash), UnitStatus::Deployed)
        };

        let record = DeploymentRecord {
            address,
            abi: artifact.abi.clone(),
            bytecode_hash,
            transaction_hash,
            deterministic: unit.deterministic,
            args,
            wiring_hash: None,
            deployed_at: chrono::Utc::now().timestamp(),
        };
        self.ctx
            .ledger
            .put(self.ctx.network_name(), &unit.name, &record)
            .map_err(DeployError::Ledger)?;

        tracing::info!(
            unit = %unit.name,
            address = %address,
            tx = ?transaction_hash,
            "Unit {}", status
        );
        Ok((record, status))
    }

    /// Resolve and encode the wiring calls of `unit`.
    fn prepare_wiring(
        &self,
        state: &RunState,
        unit: &Unit,
    ) -> Result<Vec<PreparedCall>, DeployError> {
        unit.wiring
            .iter()
            .map(|call| self.prepare_call(state, unit, call))
            .collect()
    }

    fn prepare_call(
        &self,
        state: &RunState,
        unit: &Unit,
        call: &WiringCall,
    ) -> Result<PreparedCall, DeployError> {
        let (address, _) = state.resolver.resolve(
            self.ctx.ledger,
            self.ctx.network_name(),
            &unit.name,
            &call.target,
        )?;

        let failed = |cause| DeployError::WiringCallFailed {
            unit: unit.name.clone(),
            target: call.target.clone(),
            address,
            method: call.method.clone(),
            cause,
        };

        let args = self.render_args(state, &unit.name, &call.args)?;
        let target_abi = match state.artifacts.get(&call.target) {
            Some(artifact) => artifact.abi.clone(),
            None => self
                .ctx
                .ledger
                .get(self.ctx.network_name(), &call.target)
                .map_err(DeployError::Ledger)?
                .map(|record| record.abi)
                .ok_or_else(|| failed(anyhow::anyhow!("No ABI known for `{}`", call.target)))?,
        };
        let function = abi::find_function(&target_abi, &call.method).map_err(failed)?;
        let calldata = abi::encode_call(function, &args).map_err(failed)?;

        let from = self
            .ctx
            .account(&unit.name, call.from.as_deref().unwrap_or(unit.sender()))?;

        Ok(PreparedCall {
            target: call.target.clone(),
            address,
            method: call.method.clone(),
            signature: function.signature(),
            from,
            calldata,
        })
    }

    /// Send one wiring call of `unit`.
    async fn wire(&self, unit: &Unit, call: &PreparedCall) -> Result<(), DeployError> {
        tracing::info!(
            unit = %unit.name,
            target = %call.target,
            method = %call.signature,
            "Wiring..."
        );
        self.ctx
            .transport
            .transact(call.from, call.address, call.calldata.clone(), None)
            .await
            .map_err(|cause| DeployError::WiringCallFailed {
                unit: unit.name.clone(),
                target: call.target.clone(),
                address: call.address,
                method: call.method.clone(),
                cause,
            })?;
        Ok(())
    }

    /// Read the value of `probe`, at most once per run.
    async fn probe(
        &self,
        state: &mut RunState,
        unit: &str,
        probe: &Probe,
    ) -> Result<B256, DeployError> {
        if let Some(value) = state.probe(probe) {
            return Ok(value);
        }

        let (address, abi) = match &probe.target {
            ProbeTarget::Unit(name) => {
                let (address, _) = state.resolver.resolve(
                    self.ctx.ledger,
                    self.ctx.network_name(),
                    unit,
                    name,
                )?;
                (address, state.artifacts.get(name).map(|a| &a.abi))
            }
            ProbeTarget::Address(address) => (*address, None),
        };
        let calldata = adapter::probe_calldata(&probe.method, abi)
            .map_err(|err| DeployError::deployment(unit, err))?;

        let output = self
            .ctx
            .transport
            .call(address, calldata)
            .await
            .map_err(|err| DeployError::deployment(unit, err))?;
        let value =
            adapter::decode_word(&output).map_err(|err| DeployError::deployment(unit, err))?;

        tracing::debug!(unit, probe = %probe.method, target = %address, value = %value, "Probe evaluated");
        state.record_probe(probe.clone(), value);
        Ok(value)
    }

    /// Render argument templates to the strings fed to the ABI encoder.
    fn render_args(
        &self,
        state: &RunState,
        unit: &str,
        templates: &[ArgTemplate],
    ) -> Result<Vec<String>, DeployError> {
        templates
            .iter()
            .map(|template| match template {
                ArgTemplate::Literal(value) => Ok(value.clone()),
                ArgTemplate::Unit(name) => {
                    let (address, resolution) = state.resolver.resolve(
                        self.ctx.ledger,
                        self.ctx.network_name(),
                        unit,
                        name,
                    )?;
                    tracing::trace!(unit, dependency = %name, %address, %resolution, "Resolved address");
                    Ok(address.to_checksum(None))
                }
                ArgTemplate::Account(role) => {
                    Ok(self.ctx.account(unit, role)?.to_checksum(None))
                }
                ArgTemplate::Env(EnvValue::ChainId) => {
                    Ok(self.ctx.chain_id_arg(state.chain_id).to_string())
                }
            })
            .collect()
    }
}
