// Chain RPC client implementation
// This file talks EVM JSON-RPC for gas estimation and Cosmos REST for
// broadcast and staking params, with retries on transport failures
//
// Numan Thabit 2025 Nov

use super::{
    ChainClient, ChainInfo, EstimationVariant, FeeEstimate, SignedTx, StakingParams, Transfer,
    TxResponse,
};
use crate::errors::ChainError;
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// `transfer(address,uint256)` selector.
const ERC20_TRANSFER_SELECTOR: &str = "a9059cbb";

#[derive(Debug, Clone)]
pub struct RpcChainClient {
    http: Client,
    retry_budget: Duration,
}

impl RpcChainClient {
    pub fn new(timeout: Duration, retry_budget: Duration) -> Result<Self, ChainError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport(format!("http client: {e}")))?;
        Ok(Self { http, retry_budget })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(self.retry_budget),
            ..Default::default()
        }
    }

    /// Single JSON-RPC call; returns the `result` member.
    async fn rpc_call(&self, url: &Url, method: &str, params: Value) -> Result<Value, ChainError> {
        let timer = REQ_LATENCY.with_label_values(&["evm", method]).start_timer();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let result: Result<Value, ChainError> = async {
            let resp = self
                .http
                .post(url.clone())
                .json(&payload)
                .send()
                .await
                .map_err(|e| ChainError::Transport(format!("jsonrpc send: {e}")))?;
            if !resp.status().is_success() {
                return Err(ChainError::Provider(format!("http {}", resp.status())));
            }
            let mut body: Value = resp
                .json()
                .await
                .map_err(|e| ChainError::Transport(format!("json parse: {e}")))?;
            if let Some(err) = body.get("error") {
                return Err(ChainError::Provider(err.to_string()));
            }
            Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
        }
        .await;
        timer.observe_duration();
        if result.is_err() {
            REQ_ERRORS.with_label_values(&["evm", method]).inc();
        }
        result
    }

    async fn rpc_call_retrying(
        &self,
        url: &Url,
        method: &str,
        params: Value,
    ) -> Result<Value, ChainError> {
        retry(self.backoff(), || {
            let params = params.clone();
            async move {
                self.rpc_call(url, method, params).await.map_err(|e| {
                    if e.is_transient() {
                        debug!(method, error = %e, "retrying rpc call");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    async fn quantity(&self, url: &Url, method: &str, params: Value) -> Result<u128, ChainError> {
        let value = self.rpc_call_retrying(url, method, params).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("{method}: expected hex quantity")))?;
        parse_quantity(raw)
    }

    async fn estimate_call(
        &self,
        chain: &ChainInfo,
        call: Value,
        variant: EstimationVariant,
    ) -> Result<FeeEstimate, ChainError> {
        let url = evm_endpoint(chain)?;
        let gas = self.quantity(url, "eth_estimateGas", json!([call])).await?;
        let gas_limit = u64::try_from(gas)
            .map_err(|_| ChainError::Decode(format!("gas limit out of range: {gas}")))?;
        let node_price = self.quantity(url, "eth_gasPrice", json!([])).await?;
        let gas_price = variant.scale(node_price);
        Ok(FeeEstimate {
            expected_fee: u128::from(gas_limit).saturating_mul(gas_price),
            gas_limit,
            gas_price,
            bandwidth_units: chain.is_bandwidth.then_some(gas_limit),
        })
    }

    async fn rest_get<T: DeserializeOwned + Send>(
        &self,
        chain: &ChainInfo,
        path: &str,
    ) -> Result<T, ChainError> {
        let url = rest_endpoint(chain, path)?;
        retry(self.backoff(), || {
            let url = url.clone();
            async move {
                let timer = REQ_LATENCY.with_label_values(&["rest", path]).start_timer();
                let result: Result<T, ChainError> = async {
                    let resp = self
                        .http
                        .get(url)
                        .send()
                        .await
                        .map_err(|e| ChainError::Transport(format!("rest get: {e}")))?;
                    if !resp.status().is_success() {
                        return Err(ChainError::Provider(format!("http {}", resp.status())));
                    }
                    resp.json::<T>()
                        .await
                        .map_err(|e| ChainError::Decode(format!("rest body: {e}")))
                }
                .await;
                timer.observe_duration();
                result.map_err(|e| {
                    REQ_ERRORS.with_label_values(&["rest", path]).inc();
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }
}

fn evm_endpoint(chain: &ChainInfo) -> Result<&Url, ChainError> {
    chain
        .evm_rpc
        .as_ref()
        .ok_or_else(|| ChainError::Provider(format!("{} has no evm rpc endpoint", chain.name)))
}

fn rest_endpoint(chain: &ChainInfo, path: &str) -> Result<Url, ChainError> {
    let base = chain
        .rest_url
        .as_ref()
        .ok_or_else(|| ChainError::Provider(format!("{} has no rest endpoint", chain.name)))?;
    base.join(path)
        .map_err(|e| ChainError::Provider(format!("bad rest url: {e}")))
}

/// Parse an EVM hex quantity ("0x5208").
pub fn parse_quantity(raw: &str) -> Result<u128, ChainError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("quantity {raw}: {e}")))
}

/// ABI calldata for `transfer(to, amount)`.
pub fn erc20_transfer_calldata(to: &str, amount: u128) -> Result<String, ChainError> {
    let to = to.strip_prefix("0x").unwrap_or(to);
    if to.len() != 40 || !to.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChainError::Decode(format!("invalid recipient address: {to}")));
    }
    Ok(format!(
        "0x{ERC20_TRANSFER_SELECTOR}{:0>64}{:064x}",
        to.to_ascii_lowercase(),
        amount
    ))
}

/// Body for the broadcast endpoint.
///
/// `tx_bytes` carries the JSON-encoded [`SignedTx`] envelope, not a protobuf
/// `TxRaw`. Stock Cosmos SDK nodes reject it; `rest_url` must point at a
/// signing gateway that accepts the relay envelope and re-encodes it.
// TODO: encode a protobuf TxRaw once sign docs are built as Cosmos TxBody/AuthInfo.
pub fn broadcast_payload(tx: &SignedTx) -> Result<Value, ChainError> {
    let tx_bytes =
        serde_json::to_vec(tx).map_err(|e| ChainError::Decode(format!("encode tx: {e}")))?;
    Ok(json!({
        "tx_bytes": B64.encode(tx_bytes),
        "mode": "BROADCAST_MODE_SYNC",
    }))
}

#[derive(Debug, Deserialize)]
struct BroadcastEnvelope {
    #[serde(default)]
    tx_response: Option<TxResponse>,
}

#[derive(Debug, Deserialize)]
struct StakingEnvelope {
    #[serde(default)]
    params: StakingParams,
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn estimate(
        &self,
        chain: &ChainInfo,
        transfer: &Transfer,
        variant: EstimationVariant,
    ) -> Result<FeeEstimate, ChainError> {
        let call = json!({
            "from": transfer.from,
            "to": transfer.to,
            "value": format!("0x{:x}", transfer.amount),
        });
        self.estimate_call(chain, call, variant).await
    }

    async fn estimate_token_transfer(
        &self,
        chain: &ChainInfo,
        transfer: &Transfer,
        variant: EstimationVariant,
    ) -> Result<FeeEstimate, ChainError> {
        let token = transfer
            .token
            .as_ref()
            .ok_or_else(|| ChainError::Provider("token transfer without token".into()))?;
        let call = json!({
            "from": transfer.from,
            "to": token.contract,
            "data": erc20_transfer_calldata(&transfer.to, transfer.amount)?,
        });
        self.estimate_call(chain, call, variant).await
    }

    async fn broadcast(
        &self,
        chain: &ChainInfo,
        tx: &SignedTx,
    ) -> Result<Option<TxResponse>, ChainError> {
        // Never retried: a resend after an ambiguous failure could double-submit.
        let url = rest_endpoint(chain, "/cosmos/tx/v1beta1/txs")?;
        let payload = broadcast_payload(tx)?;
        let timer = REQ_LATENCY
            .with_label_values(&["rest", "broadcast"])
            .start_timer();
        let result: Result<BroadcastEnvelope, ChainError> = async {
            let resp = self
                .http
                .post(url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| ChainError::Transport(format!("broadcast send: {e}")))?;
            if !resp.status().is_success() {
                return Err(ChainError::Provider(format!("http {}", resp.status())));
            }
            resp.json::<BroadcastEnvelope>()
                .await
                .map_err(|e| ChainError::Decode(format!("broadcast body: {e}")))
        }
        .await;
        timer.observe_duration();
        match result {
            Ok(envelope) => Ok(envelope.tx_response),
            Err(e) => {
                REQ_ERRORS.with_label_values(&["rest", "broadcast"]).inc();
                Err(e)
            }
        }
    }

    async fn staking_params(&self, chain: &ChainInfo) -> Result<StakingParams, ChainError> {
        let envelope: StakingEnvelope = self
            .rest_get(chain, "/cosmos/staking/v1beta1/params")
            .await?;
        Ok(envelope.params)
    }
}
