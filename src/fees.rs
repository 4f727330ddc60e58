// Fee estimation module
// This file routes a pending transfer to native or token estimation and
// applies the per-chain acceptance rule for the returned fee
//
// Numan Thabit 2025 Nov

use crate::chain::{ChainClient, ChainInfo, EstimationVariant, FeeEstimate, Transfer};
use crate::errors::RelayError;
use crate::wallet::{BalanceKind, WalletStore};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct FeeEstimator {
    client: Arc<dyn ChainClient>,
    variant: EstimationVariant,
}

impl FeeEstimator {
    pub fn new(client: Arc<dyn ChainClient>, variant: EstimationVariant) -> Self {
        Self { client, variant }
    }

    pub fn variant(&self) -> EstimationVariant {
        self.variant
    }

    /// Estimate the fee for `transfer`. `None` means no estimate could be
    /// produced; the RPC error is logged, never raised.
    pub async fn estimate(&self, transfer: &Transfer, chain: &ChainInfo) -> Option<FeeEstimate> {
        let result = match &transfer.token {
            Some(token) => {
                debug!(chain = %chain.name, contract = %token.contract, "estimating token transfer");
                self.client
                    .estimate_token_transfer(chain, transfer, self.variant)
                    .await
            }
            None => self.client.estimate(chain, transfer, self.variant).await,
        };
        match result {
            Ok(estimate) => Some(estimate),
            Err(err) => {
                warn!(
                    chain = %chain.name,
                    from = %transfer.from,
                    to = %transfer.to,
                    error = %err,
                    "fee estimation failed"
                );
                None
            }
        }
    }

    /// Bandwidth chains accept any present estimate, zero included; every
    /// other chain needs a strictly positive fee.
    pub fn accept(estimate: Option<FeeEstimate>, chain: &ChainInfo) -> Result<FeeEstimate, RelayError> {
        match estimate {
            Some(estimate) if chain.is_bandwidth => Ok(estimate),
            Some(estimate) if estimate.expected_fee > 0 => Ok(estimate),
            Some(_) => Err(RelayError::EstimationFailed(format!(
                "non-positive fee on {}",
                chain.name
            ))),
            None => Err(RelayError::EstimationFailed(format!(
                "no estimate for {}",
                chain.name
            ))),
        }
    }

    pub async fn estimate_accepted(
        &self,
        transfer: &Transfer,
        chain: &ChainInfo,
    ) -> Result<FeeEstimate, RelayError> {
        Self::accept(self.estimate(transfer, chain).await, chain)
    }

    /// Fee for sending the sender's whole available balance.
    pub async fn preview_max_fee(
        &self,
        wallets: &dyn WalletStore,
        from: &str,
        to: &str,
        chain: &ChainInfo,
    ) -> Option<FeeEstimate> {
        let amount = wallets.get_balance(from, BalanceKind::Available);
        let transfer = Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            token: None,
        };
        self.estimate(&transfer, chain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{chain, MockChainClient};
    use crate::chain::TokenRef;
    use crate::wallet::InMemoryWalletStore;
    use std::sync::atomic::Ordering;

    fn transfer(token: Option<TokenRef>) -> Transfer {
        Transfer {
            from: "0xfrom".into(),
            to: "0xto".into(),
            amount: 1_000,
            token,
        }
    }

    #[tokio::test]
    async fn zero_fee_is_success_only_on_bandwidth_chains() {
        let estimator = FeeEstimator::new(
            Arc::new(MockChainClient::with_fee(0)),
            EstimationVariant::Average,
        );

        let bandwidth = chain(728126428, true);
        let estimate = estimator.estimate_accepted(&transfer(None), &bandwidth).await.unwrap();
        assert_eq!(estimate.expected_fee, 0);

        let evm = chain(1, false);
        assert!(matches!(
            estimator.estimate_accepted(&transfer(None), &evm).await,
            Err(RelayError::EstimationFailed(_))
        ));
    }

    #[tokio::test]
    async fn rpc_failure_yields_sentinel() {
        let client = Arc::new(MockChainClient::default());
        client.queue_fees([None]);
        let estimator = FeeEstimator::new(client, EstimationVariant::Average);
        let bandwidth = chain(728126428, true);
        assert!(estimator.estimate(&transfer(None), &bandwidth).await.is_none());
        assert!(FeeEstimator::accept(None, &bandwidth).is_err());
    }

    #[tokio::test]
    async fn token_transfers_use_token_estimation() {
        let client = Arc::new(MockChainClient::with_fee(42_000));
        let estimator = FeeEstimator::new(client.clone(), EstimationVariant::High);
        let token = TokenRef {
            contract: "0xdac17f958d2ee523a2206206994597c13d831ec7".into(),
            chain_id: 1,
        };
        let evm = chain(1, false);
        estimator.estimate_accepted(&transfer(Some(token)), &evm).await.unwrap();
        estimator.estimate_accepted(&transfer(None), &evm).await.unwrap();
        assert_eq!(client.token_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.native_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn max_preview_uses_available_balance() {
        let client = Arc::new(MockChainClient::with_fee(21_000));
        let estimator = FeeEstimator::new(client.clone(), EstimationVariant::Average);
        let store = InMemoryWalletStore::new(Vec::new());
        store.set_balance("0xFrom", BalanceKind::Available, 5_000);
        let fee = estimator
            .preview_max_fee(&store, "0xFrom", "0xto", &chain(1, false))
            .await
            .unwrap();
        assert_eq!(fee.expected_fee, 21_000);
        assert_eq!(client.native_calls.load(Ordering::SeqCst), 1);
    }
}
