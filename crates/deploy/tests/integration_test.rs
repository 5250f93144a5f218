//! Integration tests for rigger-deploy.
//!
//! Runs are executed against an in-memory chain that creates contracts at
//! their CREATE/CREATE2 addresses and records every submitted transaction.
//! Run with: cargo test --test integration_test

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, U256, address, keccak256},
};
use anyhow::Result;
use rigger_deploy::{
    ArgTemplate, Artifact, ArtifactProvider, BytecodePatch, DeployError, DeterministicConfig,
    EnvValue, FsLedger, Ledger, MANIFEST_FILENAME, NamedAccounts, NetworkConfig, Orchestrator,
    Probe, ProbeTarget, Receipt, RunContext, RunOptions, RunReport, Transport, Unit, UnitSet,
    UnitStatus, WiringCall, create2_address,
};
use tempdir::TempDir;

const DEPLOYER: Address = address!("d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0");
const CHAIN_ID: u64 = 31337;

/// A transaction sent to the in-memory chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Submission {
    Deploy { init_code: Bytes },
    Transact { to: Address, data: Bytes },
}

#[derive(Debug, Default)]
struct ChainState {
    nonce: u64,
    code: HashMap<Address, Bytes>,
    submissions: Vec<Submission>,
    requests: usize,
    /// Creation transactions whose init code starts with this prefix revert.
    failing_code: Option<Vec<u8>>,
    /// Call transactions with this selector revert.
    failing_selector: Option<[u8; 4]>,
}

/// In-memory chain implementing [`Transport`].
#[derive(Debug, Default)]
struct MockChain {
    state: Mutex<ChainState>,
    /// Return values of read-only calls, by selector.
    views: HashMap<[u8; 4], B256>,
}

impl MockChain {
    fn with_view(signature: &str, value: B256) -> Self {
        let mut chain = Self::default();
        chain.views.insert(selector(signature), value);
        chain
    }

    fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    fn requests(&self) -> usize {
        self.state.lock().unwrap().requests
    }

    fn deployments(&self) -> Vec<Bytes> {
        self.submissions()
            .into_iter()
            .filter_map(|submission| match submission {
                Submission::Deploy { init_code } => Some(init_code),
                _ => None,
            })
            .collect()
    }

    fn calls(&self) -> Vec<(Address, Bytes)> {
        self.submissions()
            .into_iter()
            .filter_map(|submission| match submission {
                Submission::Transact { to, data } => Some((to, data)),
                _ => None,
            })
            .collect()
    }

    fn fail_deployments_of(&self, code: Option<&[u8]>) {
        self.state.lock().unwrap().failing_code = code.map(<[u8]>::to_vec);
    }

    fn fail_calls_to(&self, signature: Option<&str>) {
        self.state.lock().unwrap().failing_selector = signature.map(selector);
    }

    fn receipt(state: &ChainState, contract_address: Option<Address>) -> Receipt {
        Receipt {
            transaction_hash: keccak256(state.nonce.to_be_bytes()),
            contract_address,
        }
    }
}

impl Transport for MockChain {
    async fn chain_id(&self) -> Result<u64> {
        self.state.lock().unwrap().requests += 1;
        Ok(CHAIN_ID)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        if !state.code.contains_key(&to) {
            anyhow::bail!("No contract at {to}");
        }
        let value = self
            .views
            .get(&data[..4])
            .ok_or_else(|| anyhow::anyhow!("Unknown view {}", hex::encode(&data[..4])))?;
        Ok(Bytes::copy_from_slice(value.as_slice()))
    }

    async fn deploy(
        &self,
        from: Address,
        init_code: Bytes,
        _gas_limit: Option<u64>,
    ) -> Result<Receipt> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        if let Some(prefix) = &state.failing_code {
            if init_code.starts_with(prefix) {
                anyhow::bail!("Transaction reverted");
            }
        }

        let address = from.create(state.nonce);
        state.nonce += 1;
        state.code.insert(address, init_code.clone());
        state.submissions.push(Submission::Deploy { init_code });
        Ok(Self::receipt(&state, Some(address)))
    }

    async fn transact(
        &self,
        _from: Address,
        to: Address,
        data: Bytes,
        _gas_limit: Option<u64>,
    ) -> Result<Receipt> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        if state.failing_selector.is_some_and(|sel| data.starts_with(&sel)) {
            anyhow::bail!("Transaction reverted");
        }

        state.nonce += 1;
        if to == DeterministicConfig::default().factory {
            let salt = B256::from_slice(&data[..32]);
            let address = create2_address(to, salt, &data[32..]);
            state.code.insert(address, Bytes::copy_from_slice(&data[32..]));
        }
        state.submissions.push(Submission::Transact { to, data });
        Ok(Self::receipt(&state, None))
    }
}

/// Artifacts held in memory.
#[derive(Debug, Default)]
struct MemoryArtifacts(HashMap<String, Artifact>);

impl MemoryArtifacts {
    fn add(&mut self, contract: &str, bytecode: &[u8], abi: serde_json::Value) -> &mut Self {
        let abi: JsonAbi = serde_json::from_value(abi).expect("Invalid test ABI");
        self.0.insert(
            contract.to_string(),
            Artifact {
                contract: contract.to_string(),
                abi,
                bytecode: Bytes::copy_from_slice(bytecode),
            },
        );
        self
    }
}

impl ArtifactProvider for MemoryArtifacts {
    fn artifact(&self, contract: &str) -> Result<Artifact, DeployError> {
        self.0
            .get(contract)
            .cloned()
            .ok_or_else(|| DeployError::ArtifactNotFound {
                unit: contract.to_string(),
                contract: contract.to_string(),
            })
    }
}

fn selector(signature: &str) -> [u8; 4] {
    keccak256(signature.as_bytes())[..4]
        .try_into()
        .expect("Selector is 4 bytes")
}

fn setter_abi(method: &str) -> serde_json::Value {
    serde_json::json!([{
        "type": "function",
        "name": method,
        "stateMutability": "nonpayable",
        "inputs": [{ "name": "value", "type": "address" }],
        "outputs": []
    }])
}

/// Test setup: a ledger in a temporary directory and the run configuration.
struct TestContext {
    _dir: TempDir,
    ledger: FsLedger,
    network: NetworkConfig,
    accounts: NamedAccounts,
    deterministic: DeterministicConfig,
    options: RunOptions,
}

impl TestContext {
    fn new(live: bool) -> Self {
        let dir = TempDir::new("rigger-it").expect("Failed to create temp dir");
        let ledger = FsLedger::new(dir.path().join("deployments"));

        let mut named = BTreeMap::new();
        named.insert("deployer".to_string(), DEPLOYER);
        named.insert("feeCollector".to_string(), Address::repeat_byte(0xfe));

        Self {
            _dir: dir,
            ledger,
            network: NetworkConfig::new(
                "hardhat",
                "http://127.0.0.1:8545".parse().unwrap(),
                live,
            ),
            accounts: NamedAccounts::new(named),
            deterministic: DeterministicConfig::default(),
            options: RunOptions::default(),
        }
    }

    async fn run(
        &self,
        units: &UnitSet,
        artifacts: &MemoryArtifacts,
        chain: &MockChain,
    ) -> Result<RunReport, DeployError> {
        let ctx = RunContext {
            network: &self.network,
            accounts: &self.accounts,
            deterministic: &self.deterministic,
            transport: chain,
            ledger: &self.ledger,
            options: &self.options,
        };
        Orchestrator::new(units, artifacts, ctx).run().await
    }
}

fn unit(name: &str, deps: &[&str]) -> Unit {
    let mut unit = Unit::new(name);
    unit.dependencies = deps.iter().map(|d| d.to_string()).collect();
    unit
}

/// A and B, where B is wired to A after deployment.
fn wired_pair() -> (UnitSet, MemoryArtifacts) {
    let mut b = unit("B", &["A"]);
    b.wiring = vec![WiringCall {
        target: "B".to_string(),
        method: "setA".to_string(),
        args: vec![ArgTemplate::Unit("A".to_string())],
        from: None,
    }];

    let mut artifacts = MemoryArtifacts::default();
    artifacts
        .add("A", &[0x60, 0x01], serde_json::json!([]))
        .add("B", &[0x60, 0x02], setter_abi("setA"));

    (UnitSet::new(vec![unit("A", &[]), b]), artifacts)
}

#[tokio::test]
async fn test_wiring_runs_once() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (units, artifacts) = wired_pair();

    let report = ctx.run(&units, &artifacts, &chain).await.expect("First run failed");

    let a = report.outcomes[0].address;
    let b = report.outcomes[1].address;
    assert_eq!(a, DEPLOYER.create(0), "A deploys first");
    assert_eq!(chain.deployments().len(), 2);

    let calls = chain.calls();
    assert_eq!(calls.len(), 1, "B.setA(A) is called exactly once");
    assert_eq!(calls[0].0, b);
    assert_eq!(&calls[0].1[..4], &selector("setA(address)"));
    assert_eq!(&calls[0].1[4 + 12..], a.as_slice());

    let record = ctx.ledger.get("hardhat", "B").unwrap().expect("B is recorded");
    assert_eq!(record.address, b);
    assert!(record.wiring_hash.is_some());

    // Second run over the same ledger: nothing left to do.
    let before = chain.submissions().len();
    let report = ctx.run(&units, &artifacts, &chain).await.expect("Second run failed");

    assert_eq!(chain.submissions().len(), before, "No transaction on the second run");
    assert!(report.outcomes.iter().all(|o| o.status == UnitStatus::Reused));
    assert_eq!(report.outcomes[0].address, a);
    assert_eq!(report.outcomes[1].address, b);
    assert_eq!(report.outcomes[1].wiring_calls, 0);
}

#[tokio::test]
async fn test_force_wiring_reissues_calls() {
    let mut ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (units, artifacts) = wired_pair();

    ctx.run(&units, &artifacts, &chain).await.unwrap();
    ctx.options.force_wiring = true;
    let report = ctx.run(&units, &artifacts, &chain).await.unwrap();

    assert_eq!(chain.deployments().len(), 2, "Nothing is redeployed");
    assert_eq!(chain.calls().len(), 2, "The wiring call is sent again");
    assert_eq!(report.outcomes[1].wiring_calls, 1);
}

#[tokio::test]
async fn test_redeploy_ignores_ledger() {
    let mut ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (units, artifacts) = wired_pair();

    let first = ctx.run(&units, &artifacts, &chain).await.unwrap();
    ctx.options.redeploy = true;
    let second = ctx.run(&units, &artifacts, &chain).await.unwrap();

    assert_eq!(chain.deployments().len(), 4);
    assert!(second.outcomes.iter().all(|o| o.status == UnitStatus::Deployed));
    assert_ne!(first.outcomes[0].address, second.outcomes[0].address);
    assert_eq!(
        ctx.ledger.get("hardhat", "A").unwrap().unwrap().address,
        second.outcomes[0].address
    );
}

#[tokio::test]
async fn test_missing_dependency_submits_nothing() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let mut artifacts = MemoryArtifacts::default();
    artifacts.add("C", &[0x60, 0x03], serde_json::json!([]));
    let units = UnitSet::new(vec![unit("C", &["D"])]);

    let err = ctx.run(&units, &artifacts, &chain).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::MissingDependency { ref unit, ref dependency } if unit == "C" && dependency == "D"
    ));
    assert!(err.is_configuration());
    assert_eq!(chain.requests(), 0, "No network call before the plan is valid");
    assert_eq!(ctx.ledger.get("hardhat", "C").unwrap(), None);
}

#[tokio::test]
async fn test_cycle_makes_no_network_calls() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let mut artifacts = MemoryArtifacts::default();
    artifacts
        .add("A", &[0x60, 0x01], serde_json::json!([]))
        .add("B", &[0x60, 0x02], serde_json::json!([]));
    let units = UnitSet::new(vec![unit("A", &["B"]), unit("B", &["A"])]);

    let err = ctx.run(&units, &artifacts, &chain).await.unwrap_err();

    assert!(matches!(err, DeployError::DependencyCycle { ref units } if units == &["A", "B"]));
    assert_eq!(chain.requests(), 0);
}

#[tokio::test]
async fn test_missing_artifact_names_unit() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let mut wrapper = Unit::new("RouterWrapper");
    wrapper.contract = Some("UniswapRouterWrapper".to_string());

    let err = ctx
        .run(&UnitSet::new(vec![wrapper]), &MemoryArtifacts::default(), &chain)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::ArtifactNotFound { ref unit, ref contract }
            if unit == "RouterWrapper" && contract == "UniswapRouterWrapper"
    ));
    assert_eq!(chain.requests(), 0);
}

#[tokio::test]
async fn test_constructor_arity_is_checked_before_deploying() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let mut artifacts = MemoryArtifacts::default();
    artifacts.add(
        "Settlement",
        &[0x60, 0x05],
        serde_json::json!([{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "chainId", "type": "uint256" }]
        }]),
    );

    let err = ctx
        .run(&UnitSet::new(vec![Unit::new("Settlement")]), &artifacts, &chain)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::InvalidUnit { ref unit, .. } if unit == "Settlement"));
    assert_eq!(chain.requests(), 0);
}

#[tokio::test]
async fn test_constructor_arguments_are_rendered() {
    let mut ctx = TestContext::new(false);
    let mut artifacts = MemoryArtifacts::default();
    artifacts
        .add("OrderBook", &[0x60, 0x04], serde_json::json!([]))
        .add(
            "Settlement",
            &[0x60, 0x05],
            serde_json::json!([{
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "chainId", "type": "uint256" },
                    { "name": "orderBook", "type": "address" },
                    { "name": "feeCollector", "type": "address" },
                    { "name": "fee", "type": "uint256" }
                ]
            }]),
        );

    let mut settlement = unit("Settlement", &["OrderBook"]);
    settlement.args = vec![
        ArgTemplate::Env(EnvValue::ChainId),
        ArgTemplate::Unit("OrderBook".to_string()),
        ArgTemplate::Account("feeCollector".to_string()),
        ArgTemplate::Literal("1000000000000000000".to_string()),
    ];
    let units = UnitSet::new(vec![Unit::new("OrderBook"), settlement]);

    let chain = MockChain::default();
    let report = ctx.run(&units, &artifacts, &chain).await.unwrap();
    let order_book = report.outcomes[0].address;

    let deployments = chain.deployments();
    let init_code = &deployments[1];
    assert_eq!(&init_code[..2], &[0x60, 0x05]);
    let words: Vec<&[u8]> = init_code[2..].chunks(32).collect();
    assert_eq!(words.len(), 4);
    assert_eq!(B256::from_slice(words[0]), B256::from(U256::from(CHAIN_ID)));
    assert_eq!(&words[1][12..], order_book.as_slice());
    assert_eq!(&words[2][12..], Address::repeat_byte(0xfe).as_slice());

    let record = ctx.ledger.get("hardhat", "Settlement").unwrap().unwrap();
    assert_eq!(record.args[0], CHAIN_ID.to_string());
    assert_eq!(record.args[1], order_book.to_checksum(None));
    assert_eq!(record.bytecode_hash, keccak256(init_code));

    // A chain id override is used instead of the node's chain id.
    ctx.network.chain_id_override = Some(42);
    ctx.options.redeploy = true;
    let chain = MockChain::default();
    ctx.run(&units, &artifacts, &chain).await.unwrap();
    assert_eq!(chain.deployments()[1][2 + 31], 42);
}

fn patched_router(placeholder: B256) -> (UnitSet, MemoryArtifacts, Vec<u8>) {
    let mut router_code = vec![0x60, 0x06];
    router_code.extend_from_slice(placeholder.as_slice());
    router_code.push(0x00);

    let mut router = Unit::new("Router");
    router.patch = Some(BytecodePatch {
        placeholder,
        probe: Probe {
            target: ProbeTarget::Unit("Factory".to_string()),
            method: "pairCodeHash".to_string(),
        },
    });

    let mut artifacts = MemoryArtifacts::default();
    artifacts
        .add(
            "Factory",
            &[0x60, 0x07],
            serde_json::json!([{
                "type": "function",
                "name": "pairCodeHash",
                "stateMutability": "view",
                "inputs": [],
                "outputs": [{ "name": "", "type": "bytes32" }]
            }]),
        )
        .add("Router", &router_code, serde_json::json!([]));

    (
        UnitSet::new(vec![Unit::new("Factory"), router]),
        artifacts,
        router_code,
    )
}

#[tokio::test]
async fn test_placeholder_replaced_on_simulated_network() {
    let placeholder = B256::repeat_byte(0xaa);
    let fingerprint = B256::repeat_byte(0xcc);
    let ctx = TestContext::new(false);
    let chain = MockChain::with_view("pairCodeHash()", fingerprint);
    let (units, artifacts, router_code) = patched_router(placeholder);

    ctx.run(&units, &artifacts, &chain).await.expect("Run failed");

    let deployments = chain.deployments();
    let deployed = &deployments[1];
    assert_eq!(deployed.len(), router_code.len());
    assert_eq!(&deployed[2..34], fingerprint.as_slice());
    assert!(
        !deployed.windows(32).any(|w| w == placeholder.as_slice()),
        "Placeholder must not survive on a simulated network"
    );
}

#[tokio::test]
async fn test_placeholder_kept_on_live_network() {
    let placeholder = B256::repeat_byte(0xaa);
    let ctx = TestContext::new(true);
    let chain = MockChain::with_view("pairCodeHash()", B256::repeat_byte(0xcc));
    let (units, artifacts, router_code) = patched_router(placeholder);

    ctx.run(&units, &artifacts, &chain).await.expect("Run failed");

    assert_eq!(&chain.deployments()[1][..], &router_code[..]);
}

#[tokio::test]
async fn test_deterministic_address_matches_prediction() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let mut artifacts = MemoryArtifacts::default();
    artifacts.add("RouterWrapper", &[0x60, 0x08], serde_json::json!([]));
    let mut wrapper = Unit::new("RouterWrapper");
    wrapper.deterministic = true;
    let units = UnitSet::new(vec![wrapper]);

    let report = ctx.run(&units, &artifacts, &chain).await.unwrap();

    let predicted = create2_address(ctx.deterministic.factory, ctx.deterministic.salt, &[0x60, 0x08]);
    assert_eq!(report.outcomes[0].address, predicted);
    assert_eq!(report.outcomes[0].status, UnitStatus::Deployed);

    let calls = chain.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, ctx.deterministic.factory);
    assert_eq!(&calls[0].1[..32], ctx.deterministic.salt.as_slice());
    assert_eq!(&calls[0].1[32..], &[0x60, 0x08]);

    let record = ctx.ledger.get("hardhat", "RouterWrapper").unwrap().unwrap();
    assert!(record.deterministic);

    // With a fresh ledger the existing code is adopted without a transaction.
    let other = TestContext::new(false);
    let report = other.run(&units, &artifacts, &chain).await.unwrap();
    assert_eq!(report.outcomes[0].status, UnitStatus::Adopted);
    assert_eq!(report.outcomes[0].address, predicted);
    assert_eq!(report.outcomes[0].transaction_hash, None);
    assert_eq!(chain.calls().len(), 1);
}

#[tokio::test]
async fn test_resume_after_failure() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let mut artifacts = MemoryArtifacts::default();
    artifacts
        .add("A", &[0x60, 0x01], serde_json::json!([]))
        .add("B", &[0x60, 0x02], serde_json::json!([]))
        .add("C", &[0x60, 0x03], serde_json::json!([]));
    let units = UnitSet::new(vec![unit("A", &[]), unit("B", &["A"]), unit("C", &["B"])]);

    chain.fail_deployments_of(Some(&[0x60, 0x02][..]));
    let err = ctx.run(&units, &artifacts, &chain).await.unwrap_err();

    assert!(matches!(err, DeployError::DeploymentFailed { ref unit, .. } if unit == "B"));
    assert!(ctx.ledger.get("hardhat", "A").unwrap().is_some(), "A stays committed");
    assert!(ctx.ledger.get("hardhat", "B").unwrap().is_none());
    assert!(ctx.ledger.get("hardhat", "C").unwrap().is_none());

    chain.fail_deployments_of(None);
    let report = ctx.run(&units, &artifacts, &chain).await.expect("Resumed run failed");

    let statuses: Vec<UnitStatus> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![UnitStatus::Reused, UnitStatus::Deployed, UnitStatus::Deployed]
    );
    assert_eq!(chain.deployments().len(), 3, "A is deployed only once");
}

#[tokio::test]
async fn test_failed_wiring_is_retried() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (units, artifacts) = wired_pair();

    chain.fail_calls_to(Some("setA(address)"));
    let err = ctx.run(&units, &artifacts, &chain).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::WiringCallFailed { ref unit, ref target, ref method, .. }
            if unit == "B" && target == "B" && method == "setA"
    ));
    let record = ctx.ledger.get("hardhat", "B").unwrap().expect("B is recorded before wiring");
    assert_eq!(record.wiring_hash, None);

    chain.fail_calls_to(None);
    let report = ctx.run(&units, &artifacts, &chain).await.expect("Resumed run failed");

    assert_eq!(chain.deployments().len(), 2, "B is not redeployed");
    assert_eq!(report.outcomes[1].status, UnitStatus::Reused);
    assert_eq!(report.outcomes[1].wiring_calls, 1);
    assert!(ctx.ledger.get("hardhat", "B").unwrap().unwrap().wiring_hash.is_some());
}

#[tokio::test]
async fn test_wiring_follows_redeployed_argument() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (units, mut artifacts) = wired_pair();

    let first = ctx.run(&units, &artifacts, &chain).await.unwrap();
    let old_a = first.outcomes[0].address;

    // A changes, B's own init code does not.
    artifacts.add("A", &[0x60, 0x11], serde_json::json!([]));
    let report = ctx.run(&units, &artifacts, &chain).await.unwrap();

    let new_a = report.outcomes[0].address;
    assert_eq!(report.outcomes[0].status, UnitStatus::Deployed);
    assert_ne!(new_a, old_a);
    assert_eq!(report.outcomes[1].status, UnitStatus::Reused);
    assert_eq!(report.outcomes[1].wiring_calls, 1);

    let calls = chain.calls();
    assert_eq!(calls.len(), 2);
    let last = &calls[1].1;
    assert_eq!(&last[4 + 12..], new_a.as_slice(), "B is rewired to the new A");

    // Same wiring again: nothing to send.
    let before = chain.submissions().len();
    let report = ctx.run(&units, &artifacts, &chain).await.unwrap();
    assert_eq!(chain.submissions().len(), before);
    assert_eq!(report.outcomes[1].wiring_calls, 0);
}

#[tokio::test]
async fn test_wiring_added_to_recorded_unit() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (wired, artifacts) = wired_pair();
    let unwired = UnitSet::new(vec![unit("A", &[]), unit("B", &["A"])]);

    ctx.run(&unwired, &artifacts, &chain).await.unwrap();
    assert!(chain.calls().is_empty());
    assert_eq!(
        ctx.ledger.get("hardhat", "B").unwrap().unwrap().wiring_hash,
        None
    );

    let report = ctx.run(&wired, &artifacts, &chain).await.unwrap();

    assert_eq!(chain.deployments().len(), 2, "Nothing is redeployed");
    assert_eq!(report.outcomes[1].status, UnitStatus::Reused);
    assert_eq!(report.outcomes[1].wiring_calls, 1);
    assert_eq!(chain.calls().len(), 1);
    assert!(ctx.ledger.get("hardhat", "B").unwrap().unwrap().wiring_hash.is_some());
}

#[tokio::test]
async fn test_tags_select_dependencies() {
    let mut ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (units, mut artifacts) = wired_pair();
    artifacts.add("Extra", &[0x60, 0x09], serde_json::json!([]));

    let mut units = units.to_vec();
    units[1].tags = vec!["core".to_string()];
    units.push(Unit::new("Extra"));
    let units = UnitSet::new(units);

    ctx.options.tags = vec!["core".to_string()];
    let report = ctx.run(&units, &artifacts, &chain).await.unwrap();

    let names: Vec<&str> = report.outcomes.iter().map(|o| o.unit.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(ctx.ledger.get("hardhat", "Extra").unwrap().is_none());
}

#[tokio::test]
async fn test_run_writes_manifest_and_chain_id() {
    let ctx = TestContext::new(false);
    let chain = MockChain::default();
    let (units, artifacts) = wired_pair();

    let report = ctx.run(&units, &artifacts, &chain).await.unwrap();
    assert!(!report.definitions_changed);
    assert_eq!(report.chain_id, CHAIN_ID);
    assert_eq!(ctx.ledger.chain_id("hardhat").unwrap(), Some(CHAIN_ID));
    assert!(ctx.ledger.network_dir("hardhat").join(MANIFEST_FILENAME).exists());

    let mut changed = units.to_vec();
    changed[0].tags = vec!["base".to_string()];
    let report = ctx
        .run(&UnitSet::new(changed), &artifacts, &chain)
        .await
        .unwrap();
    assert!(report.definitions_changed);
}
