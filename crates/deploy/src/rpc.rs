//! JSON-RPC implementation of [`Transport`].

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::transport::{Receipt, Transport};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Transaction receipt fields used by the transport.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    contract_address: Option<Address>,
    status: Option<String>,
}

/// The receipt of a transaction is not available yet.
#[derive(Debug, thiserror::Error)]
#[error("transaction {0} is not mined yet")]
struct ReceiptPending(B256);

/// Parse a hex quantity such as `0x7a69`.
fn parse_quantity(quantity: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(quantity.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity `{quantity}`"))
}

/// [`Transport`] talking to a node over HTTP JSON-RPC.
///
/// Transactions are sent with `eth_sendTransaction`, so the sending accounts
/// must be unlocked on the node (hardhat, anvil, or a signing proxy).
#[derive(Debug, Clone)]
pub struct JsonRpcTransport {
    client: reqwest::Client,
    url: Url,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl JsonRpcTransport {
    pub fn new(
        url: Url,
        confirmation_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: create_client()?,
            url,
            confirmation_timeout,
            poll_interval,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC call and deserialize the result.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        tracing::trace!(method, url = %self.url, "JSON-RPC request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let result: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = result.get("error") {
            anyhow::bail!(
                "RPC error from {}: {}",
                method,
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown")
            );
        }

        let result_value = result
            .get("result")
            .context("No result in response")?
            .clone();

        serde_json::from_value(result_value)
            .with_context(|| format!("Failed to deserialize {} result", method))
    }

    /// Poll for the receipt of `hash` until it is mined or the confirmation timeout elapses.
    async fn wait_for_receipt(&self, hash: B256) -> Result<Receipt, anyhow::Error> {
        let attempts = (self.confirmation_timeout.as_millis()
            / self.poll_interval.as_millis().max(1))
        .max(1) as usize;

        let fetch = || async move {
            let receipt: Option<RpcReceipt> = self
                .request("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
                .await?;
            receipt.ok_or_else(|| anyhow::Error::new(ReceiptPending(hash)))
        };

        let receipt = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(attempts),
            )
            .notify(|err: &anyhow::Error, delay: Duration| {
                tracing::trace!(tx = %hash, error = %err, ?delay, "Receipt not available, retrying...");
            })
            .await
            .with_context(|| {
                format!(
                    "Timeout waiting for transaction {} after {:?}",
                    hash, self.confirmation_timeout
                )
            })?;

        if receipt.status.as_deref() == Some("0x0") {
            anyhow::bail!("Transaction {} reverted", receipt.transaction_hash);
        }

        tracing::debug!(
            tx = %receipt.transaction_hash,
            contract_address = ?receipt.contract_address,
            "Transaction confirmed"
        );

        Ok(Receipt {
            transaction_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
        })
    }

    async fn send_transaction(&self, tx: Value) -> Result<Receipt, anyhow::Error> {
        let hash: B256 = self
            .request("eth_sendTransaction", vec![tx])
            .await
            .context("Failed to send transaction")?;

        tracing::debug!(tx = %hash, "Transaction sent, waiting for confirmation...");

        self.wait_for_receipt(hash).await
    }
}

fn transaction(from: Address, to: Option<Address>, data: &Bytes, gas_limit: Option<u64>) -> Value {
    let mut tx = serde_json::json!({
        "from": from,
        "data": data,
    });
    if let Some(to) = to {
        tx["to"] = serde_json::json!(to);
    }
    if let Some(gas) = gas_limit {
        tx["gas"] = Value::String(format!("0x{:x}", gas));
    }
    tx
}

impl Transport for JsonRpcTransport {
    async fn chain_id(&self) -> Result<u64, anyhow::Error> {
        let chain_id: String = self.request("eth_chainId", vec![]).await?;
        parse_quantity(&chain_id)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, anyhow::Error> {
        self.request(
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, anyhow::Error> {
        self.request(
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": data }),
                serde_json::json!("latest"),
            ],
        )
        .await
    }

    async fn deploy(
        &self,
        from: Address,
        init_code: Bytes,
        gas_limit: Option<u64>,
    ) -> Result<Receipt, anyhow::Error> {
        let receipt = self
            .send_transaction(transaction(from, None, &init_code, gas_limit))
            .await?;

        if receipt.contract_address.is_none() {
            anyhow::bail!(
                "Receipt of creation transaction {} has no contract address",
                receipt.transaction_hash
            );
        }
        Ok(receipt)
    }

    async fn transact(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        gas_limit: Option<u64>,
    ) -> Result<Receipt, anyhow::Error> {
        self.send_transaction(transaction(from, Some(to), &data, gas_limit))
            .await
    }
}
