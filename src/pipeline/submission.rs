// Submission engine - estimates, waits for the device, signs and broadcasts
// This file implements the submission state machine shared by every flow,
// along with outcome statistics and failure classification
//
// Numan Thabit 2025 Nov

use super::device::BluetoothGate;
use super::failure::{DiagnosticsSink, SubmissionFailure};
use super::flow::SubmissionFlow;
use super::{Operation, SubmissionReceipt, SubmissionState};
use crate::chain::{ChainClient, ChainInfo, FeeEstimate, SignedTx, Transfer};
use crate::errors::RelayError;
use crate::fees::FeeEstimator;
use crate::metrics::SUBMISSIONS;
use crate::registry::TransportRegistry;
use crate::surfaces::{ErrorModal, Notification, Surfaces};
use crate::wallet::Wallet;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Submission statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionStats {
    pub total_submissions: u64,
    pub successful_submissions: u64,
    pub failed_submissions: u64,
    pub expected_failures: u64,
    pub avg_success_time_ms: Option<f64>,
    pub success_rate: f64,
}

/// Sign document covering the operation and its fee.
#[derive(Serialize)]
struct SignDoc<'a> {
    chain_id: String,
    from: &'a str,
    operation: &'a Operation,
    fee: FeeDoc<'a>,
}

#[derive(Serialize)]
struct FeeDoc<'a> {
    amount: u128,
    denom: &'a str,
    gas_limit: u64,
}

async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, RelayError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        out = fut => Ok(out),
    }
}

pub struct SubmissionPipeline {
    registry: Arc<TransportRegistry>,
    fees: FeeEstimator,
    client: Arc<dyn ChainClient>,
    bluetooth: BluetoothGate,
    diagnostics: Arc<dyn DiagnosticsSink>,
    surfaces: Arc<dyn Surfaces>,
    total_submissions: AtomicU64,
    successful_submissions: AtomicU64,
    failed_submissions: AtomicU64,
    expected_failures: AtomicU64,
    total_success_time_us: AtomicU64,
}

impl SubmissionPipeline {
    pub fn new(
        registry: Arc<TransportRegistry>,
        fees: FeeEstimator,
        client: Arc<dyn ChainClient>,
        bluetooth: BluetoothGate,
        diagnostics: Arc<dyn DiagnosticsSink>,
        surfaces: Arc<dyn Surfaces>,
    ) -> Self {
        Self {
            registry,
            fees,
            client,
            bluetooth,
            diagnostics,
            surfaces,
            total_submissions: AtomicU64::new(0),
            successful_submissions: AtomicU64::new(0),
            failed_submissions: AtomicU64::new(0),
            expected_failures: AtomicU64::new(0),
            total_success_time_us: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    pub fn fees(&self) -> &FeeEstimator {
        &self.fees
    }

    /// Open a flow for one wallet on one chain.
    pub fn begin(self: &Arc<Self>, wallet: Wallet, chain: ChainInfo) -> SubmissionFlow {
        SubmissionFlow::new(self.clone(), wallet, chain)
    }

    pub fn get_stats(&self) -> SubmissionStats {
        let total = self.total_submissions.load(Ordering::Relaxed);
        let successful = self.successful_submissions.load(Ordering::Relaxed);
        let total_ms = self.total_success_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        SubmissionStats {
            total_submissions: total,
            successful_submissions: successful,
            failed_submissions: self.failed_submissions.load(Ordering::Relaxed),
            expected_failures: self.expected_failures.load(Ordering::Relaxed),
            avg_success_time_ms: (successful > 0).then(|| total_ms / successful as f64),
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Unbonding period reported by the chain, or the 7-day default.
    pub async fn unbonding_period(&self, chain: &ChainInfo) -> Duration {
        match self.client.staking_params(chain).await {
            Ok(params) => params.unbonding_period(),
            Err(err) => {
                warn!(chain = %chain.name, error = %err, "staking params unavailable, using default");
                crate::chain::DEFAULT_UNBONDING_PERIOD
            }
        }
    }

    /// Run one attempt to a terminal state, publishing each transition.
    #[tracing::instrument(skip_all, fields(address = %wallet.address, op = operation.label(), chain = %chain.name))]
    pub async fn run(
        &self,
        wallet: &Wallet,
        chain: &ChainInfo,
        operation: &Operation,
        state: &watch::Sender<SubmissionState>,
        cancel: &CancellationToken,
    ) -> Result<SubmissionReceipt, SubmissionFailure> {
        self.total_submissions.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        match self.drive(wallet, chain, operation, state, cancel).await {
            Ok(receipt) => {
                let elapsed_us = started.elapsed().as_micros() as u64;
                self.successful_submissions.fetch_add(1, Ordering::Relaxed);
                self.total_success_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
                SUBMISSIONS.with_label_values(&["succeeded"]).inc();
                info!(txhash = %receipt.txhash, fee = %receipt.fee.expected_fee, "submission succeeded");

                self.surfaces.send_notification(match operation {
                    Operation::Transfer { .. } => Notification::TransactionSent {
                        txhash: receipt.txhash.clone(),
                    },
                    Operation::Delegate { validator, .. } => Notification::DelegationSent {
                        txhash: receipt.txhash.clone(),
                        validator: validator.clone(),
                    },
                });
                state.send_replace(SubmissionState::Succeeded {
                    txhash: receipt.txhash.clone(),
                });
                Ok(receipt)
            }
            Err(err) => {
                if err == RelayError::Cancelled || cancel.is_cancelled() {
                    self.registry.abort(wallet).await;
                }
                let failure = SubmissionFailure::report(err, operation.label(), self.diagnostics.as_ref());
                if failure.is_expected() {
                    self.expected_failures.fetch_add(1, Ordering::Relaxed);
                    SUBMISSIONS.with_label_values(&["expected_failure"]).inc();
                    info!(id = %failure.correlation_id, reason = %failure.message, "submission stopped");
                } else {
                    self.failed_submissions.fetch_add(1, Ordering::Relaxed);
                    SUBMISSIONS.with_label_values(&["failed"]).inc();
                    warn!(id = %failure.correlation_id, reason = %failure.message, "submission failed");
                }
                state.send_replace(SubmissionState::Failed {
                    correlation_id: failure.correlation_id.clone(),
                    message: failure.message.clone(),
                });
                Err(failure)
            }
        }
    }

    async fn drive(
        &self,
        wallet: &Wallet,
        chain: &ChainInfo,
        operation: &Operation,
        state: &watch::Sender<SubmissionState>,
        cancel: &CancellationToken,
    ) -> Result<SubmissionReceipt, RelayError> {
        // 1. Estimate fee; delegations arrive with the fee from their preview
        state.send_replace(SubmissionState::Estimating);
        let fee = match operation.supplied_fee(chain) {
            Some(fee) => FeeEstimator::accept(Some(fee), chain)?,
            None => {
                let transfer = Transfer {
                    from: wallet.address.clone(),
                    to: operation.target().to_string(),
                    amount: operation.amount(),
                    token: match operation {
                        Operation::Transfer { token, .. } => token.clone(),
                        Operation::Delegate { .. } => None,
                    },
                };
                self.surfaces.show_loading();
                let fee = self.estimate_with_retry(&transfer, chain, cancel).await;
                self.surfaces.hide_loading();
                fee?
            }
        };

        // 2. Hardware wallets need the radio up before the transport connects
        if wallet.kind.requires_device() {
            state.send_replace(SubmissionState::AwaitingDevice);
            self.bluetooth.wait_ready(cancel).await?;
        }

        // 3. Sign
        state.send_replace(SubmissionState::Signing);
        let path = wallet
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                RelayError::CustodyDataUnavailable(format!("no derivation path for {}", wallet.address))
            })?;
        // A left flow must not repopulate the registry.
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        let transport = self.registry.get(wallet).await?;
        let body = sign_document(wallet, chain, operation, &fee)?;
        let signature = cancellable(cancel, transport.sign(path, &body)).await??;
        debug!(transport = transport.kind(), "payload signed");

        // 4. Broadcast; once sent it runs to completion
        state.send_replace(SubmissionState::Broadcasting);
        let tx = SignedTx {
            chain: chain.name.clone(),
            body,
            signature,
        };
        let response = self
            .client
            .broadcast(chain, &tx)
            .await?
            .ok_or_else(|| RelayError::Unexpected("transaction_error".into()))?;

        match response.accepted_hash() {
            Some(txhash) => Ok(SubmissionReceipt {
                txhash: txhash.to_string(),
                fee,
            }),
            None => Err(RelayError::BroadcastRejected {
                code: response.code,
                raw_log: response.raw_log,
            }),
        }
    }

    /// Estimate and accept the fee; on failure show the fee error and retry
    /// once after it is dismissed.
    async fn estimate_with_retry(
        &self,
        transfer: &Transfer,
        chain: &ChainInfo,
        cancel: &CancellationToken,
    ) -> Result<FeeEstimate, RelayError> {
        let mut repeated = false;
        loop {
            let estimate = cancellable(cancel, self.fees.estimate(transfer, chain)).await?;
            match FeeEstimator::accept(estimate, chain) {
                Ok(fee) => return Ok(fee),
                Err(err) => {
                    self.surfaces.show_error(ErrorModal::fee_rpc_error(repeated)).await;
                    if repeated {
                        return Err(err);
                    }
                    debug!(chain = %chain.name, "retrying fee estimate after dismissal");
                    repeated = true;
                }
            }
        }
    }
}

fn sign_document(
    wallet: &Wallet,
    chain: &ChainInfo,
    operation: &Operation,
    fee: &FeeEstimate,
) -> Result<Vec<u8>, RelayError> {
    let doc = SignDoc {
        chain_id: chain
            .cosmos_chain_id
            .clone()
            .unwrap_or_else(|| chain.eth_chain_id.to_string()),
        from: &wallet.address,
        operation,
        fee: FeeDoc {
            amount: fee.expected_fee,
            denom: &chain.denom,
            gas_limit: fee.gas_limit,
        },
    };
    serde_json::to_vec(&doc).map_err(|e| RelayError::Unexpected(format!("encode sign doc: {e}")))
}

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::chain::mock::{chain, MockChainClient};
    use crate::chain::{EstimationVariant, TxResponse};
    use crate::pipeline::device::AdapterState;
    use crate::pipeline::failure::mock::RecordingDiagnostics;
    use crate::registry::Backends;
    use crate::surfaces::mock::RecordingSurfaces;
    use crate::transport::bluetooth::mock::MockConnector;
    use crate::wallet::{AccountData, CustodyKind, InMemoryAccountSource};

    pub struct Harness {
        pub pipeline: Arc<SubmissionPipeline>,
        pub client: Arc<MockChainClient>,
        pub diagnostics: Arc<RecordingDiagnostics>,
        pub surfaces: Arc<RecordingSurfaces>,
        pub adapter: watch::Sender<AdapterState>,
        pub chain: ChainInfo,
    }

    pub fn harness(client: MockChainClient, adapter: AdapterState) -> Harness {
        harness_with_connector(client, adapter, Arc::new(MockConnector::default()))
    }

    pub fn harness_with_connector(
        client: MockChainClient,
        adapter: AdapterState,
        connector: Arc<MockConnector>,
    ) -> Harness {
        let accounts = InMemoryAccountSource::new();
        accounts.insert(AccountData::new("acc-1", vec![9u8; 32]));
        let registry = Arc::new(TransportRegistry::new(
            Backends::software_only(Arc::new(accounts))
                .with_bluetooth(connector),
        ));
        let client = Arc::new(client);
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let surfaces = Arc::new(RecordingSurfaces::default());
        let (adapter, gate) = BluetoothGate::fixed(adapter, Duration::from_secs(30));
        let pipeline = Arc::new(SubmissionPipeline::new(
            registry,
            FeeEstimator::new(client.clone(), EstimationVariant::Average),
            client.clone(),
            gate,
            diagnostics.clone(),
            surfaces.clone(),
        ));
        Harness {
            pipeline,
            client,
            diagnostics,
            surfaces,
            adapter,
            chain: chain(11235, false),
        }
    }

    pub fn accepted(txhash: &str) -> Option<TxResponse> {
        Some(TxResponse {
            code: 0,
            txhash: Some(txhash.into()),
            raw_log: None,
        })
    }

    pub fn software_wallet() -> Wallet {
        Wallet {
            id: "w1".into(),
            address: "0x1111111111111111111111111111111111111111".into(),
            account_id: "acc-1".into(),
            kind: CustodyKind::SoftwareMnemonic,
            device_id: None,
            path: Some("m/44'/60'/0'/0/0".into()),
        }
    }

    pub fn bluetooth_wallet() -> Wallet {
        Wallet {
            id: "w2".into(),
            address: "0x2222222222222222222222222222222222222222".into(),
            account_id: "acc-2".into(),
            kind: CustodyKind::HardwareBluetooth,
            device_id: Some("dev-1".into()),
            path: Some("m/44'/60'/0'/0/0".into()),
        }
    }

    pub fn transfer_op() -> Operation {
        Operation::Transfer {
            to: "0x3333333333333333333333333333333333333333".into(),
            amount: 1_000_000,
            token: None,
        }
    }
}
