// Chain directory and chain client abstraction
// This file defines per-chain metadata, the transfer / fee / broadcast value
// types and the async client trait the fee estimator and pipeline call into
//
// Numan Thabit 2025 Nov

pub mod rpc;

pub use rpc::RpcChainClient;

use crate::errors::ChainError;
use crate::signing::Signature;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Unbonding period assumed when the chain does not report one (7 days).
pub const DEFAULT_UNBONDING_PERIOD: Duration = Duration::from_millis(604_800_000);

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChainInfo {
    /// EVM chain id, the directory key
    pub eth_chain_id: u64,
    pub name: String,
    /// Cosmos chain id for chains with a Cosmos SDK side (staking, broadcast)
    #[serde(default)]
    pub cosmos_chain_id: Option<String>,
    pub denom: String,
    /// Fees can be paid from pre-staked bandwidth; a zero fee is valid
    #[serde(default)]
    pub is_bandwidth: bool,
    /// EVM JSON-RPC endpoint used for gas estimation
    #[serde(default)]
    pub evm_rpc: Option<Url>,
    /// Cosmos REST (LCD) endpoint used for broadcast and staking params
    #[serde(default)]
    pub rest_url: Option<Url>,
}

/// Chain lookup by EVM chain id.
#[derive(Debug, Clone, Default)]
pub struct ChainDirectory {
    chains: HashMap<u64, ChainInfo>,
}

impl ChainDirectory {
    pub fn new(chains: impl IntoIterator<Item = ChainInfo>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.eth_chain_id, c)).collect(),
        }
    }

    pub fn get_by_eth_chain_id(&self, id: u64) -> Result<&ChainInfo, ChainError> {
        self.chains.get(&id).ok_or(ChainError::UnknownChain(id))
    }

    pub fn all(&self) -> impl Iterator<Item = &ChainInfo> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// ERC-20 contract a transfer moves, and the chain it lives on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TokenRef {
    pub contract: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub amount: u128,
    #[serde(default)]
    pub token: Option<TokenRef>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EstimationVariant {
    Low,
    #[default]
    Average,
    High,
}

impl EstimationVariant {
    /// Percentage applied to the node's gas price.
    pub fn percent(self) -> u128 {
        match self {
            EstimationVariant::Low => 90,
            EstimationVariant::Average => 100,
            EstimationVariant::High => 125,
        }
    }

    pub fn scale(self, gas_price: u128) -> u128 {
        gas_price.saturating_mul(self.percent()) / 100
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeEstimate {
    /// Fee in the chain's smallest native unit
    pub expected_fee: u128,
    pub gas_limit: u64,
    pub gas_price: u128,
    #[serde(default)]
    pub bandwidth_units: Option<u64>,
}

/// Chain answer to a broadcast.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TxResponse {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub txhash: Option<String>,
    #[serde(default)]
    pub raw_log: Option<String>,
}

impl TxResponse {
    /// Accepted only with code 0 and a non-empty hash.
    pub fn accepted_hash(&self) -> Option<&str> {
        match (self.code, self.txhash.as_deref()) {
            (0, Some(hash)) if !hash.is_empty() => Some(hash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StakingParams {
    /// Protobuf duration string, e.g. "1814400s"
    #[serde(default)]
    pub unbonding_time: Option<String>,
}

impl StakingParams {
    pub fn unbonding_period(&self) -> Duration {
        self.unbonding_time
            .as_deref()
            .and_then(parse_duration_secs)
            .unwrap_or(DEFAULT_UNBONDING_PERIOD)
    }
}

fn parse_duration_secs(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

/// Signed sign document ready for broadcast.
///
/// Relay envelope submitted through [`ChainClient::broadcast`]; serialized as
/// JSON (hex body) into the broadcast `tx_bytes`.
#[derive(Debug, Clone, Serialize)]
pub struct SignedTx {
    pub chain: String,
    #[serde(with = "hex_body")]
    pub body: Vec<u8>,
    pub signature: Signature,
}

mod hex_body {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }
}

/// Per-chain RPC collaborator.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn estimate(
        &self,
        chain: &ChainInfo,
        transfer: &Transfer,
        variant: EstimationVariant,
    ) -> Result<FeeEstimate, ChainError>;

    async fn estimate_token_transfer(
        &self,
        chain: &ChainInfo,
        transfer: &Transfer,
        variant: EstimationVariant,
    ) -> Result<FeeEstimate, ChainError>;

    /// `Ok(None)` when the node accepted the request but returned no tx response.
    async fn broadcast(
        &self,
        chain: &ChainInfo,
        tx: &SignedTx,
    ) -> Result<Option<TxResponse>, ChainError>;

    async fn staking_params(&self, chain: &ChainInfo) -> Result<StakingParams, ChainError>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::mock::chain;

    #[test]
    fn directory_lookup() {
        let dir = ChainDirectory::new([chain(1, false), chain(728126428, true)]);
        assert!(dir.get_by_eth_chain_id(728126428).unwrap().is_bandwidth);
        assert!(matches!(
            dir.get_by_eth_chain_id(5),
            Err(ChainError::UnknownChain(5))
        ));
    }

    #[test]
    fn variant_scales_gas_price() {
        assert_eq!(EstimationVariant::Low.scale(1_000), 900);
        assert_eq!(EstimationVariant::Average.scale(1_000), 1_000);
        assert_eq!(EstimationVariant::High.scale(1_000), 1_250);
        assert_eq!(EstimationVariant::default(), EstimationVariant::Average);
    }

    #[test]
    fn tx_response_acceptance() {
        let ok = TxResponse {
            code: 0,
            txhash: Some("0xabc".into()),
            raw_log: None,
        };
        assert_eq!(ok.accepted_hash(), Some("0xabc"));

        let empty_hash = TxResponse {
            code: 0,
            txhash: Some(String::new()),
            raw_log: None,
        };
        assert_eq!(empty_hash.accepted_hash(), None);

        let rejected = TxResponse {
            code: 5,
            txhash: Some("0xabc".into()),
            raw_log: Some("insufficient funds".into()),
        };
        assert_eq!(rejected.accepted_hash(), None);
    }

    #[test]
    fn unbonding_period_parses_or_defaults() {
        let params = StakingParams {
            unbonding_time: Some("1814400s".into()),
        };
        assert_eq!(params.unbonding_period(), Duration::from_secs(1_814_400));
        assert_eq!(
            StakingParams::default().unbonding_period(),
            DEFAULT_UNBONDING_PERIOD
        );
        let garbage = StakingParams {
            unbonding_time: Some("three weeks".into()),
        };
        assert_eq!(garbage.unbonding_period(), DEFAULT_UNBONDING_PERIOD);
    }
}
