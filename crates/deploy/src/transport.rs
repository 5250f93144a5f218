//! Network access needed by a deployment run.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;

/// Outcome of a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    /// Address of the contract created by the transaction, if any.
    pub contract_address: Option<Address>,
}

/// Narrow view of the node a run deploys to.
///
/// Sending methods only return once the transaction is confirmed; a reverted
/// transaction is an error. Senders are accounts unlocked on the node.
pub trait Transport {
    /// Chain id reported by the node.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Runtime code at `address`; empty when nothing is deployed there.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;

    /// Read-only call against the latest block.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Submit a contract-creation transaction and wait for its receipt.
    fn deploy(
        &self,
        from: Address,
        init_code: Bytes,
        gas_limit: Option<u64>,
    ) -> impl Future<Output = Result<Receipt>> + Send;

    /// Submit a call transaction and wait for its receipt.
    fn transact(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        gas_limit: Option<u64>,
    ) -> impl Future<Output = Result<Receipt>> + Send;
}
