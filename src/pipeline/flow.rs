// Submission flow lifetime
// A flow is the caller-side scope of one wallet's submissions: it owns the
// cancellation token and state channel, and releases the wallet's transport
// when left or dropped
//
// Numan Thabit 2025 Nov

use super::failure::SubmissionFailure;
use super::submission::SubmissionPipeline;
use super::{Operation, SubmissionReceipt, SubmissionState};
use crate::chain::ChainInfo;
use crate::wallet::Wallet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct SubmissionFlow {
    pipeline: Arc<SubmissionPipeline>,
    wallet: Wallet,
    chain: ChainInfo,
    cancel: CancellationToken,
    state: watch::Sender<SubmissionState>,
    left: AtomicBool,
}

impl SubmissionFlow {
    pub(crate) fn new(pipeline: Arc<SubmissionPipeline>, wallet: Wallet, chain: ChainInfo) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            pipeline,
            wallet,
            chain,
            cancel: CancellationToken::new(),
            state,
            left: AtomicBool::new(false),
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Run one attempt. Repeating after a failure is safe: nothing is kept
    /// between attempts.
    pub async fn submit(&self, operation: Operation) -> Result<SubmissionReceipt, SubmissionFailure> {
        self.pipeline
            .run(&self.wallet, &self.chain, &operation, &self.state, &self.cancel)
            .await
    }

    pub async fn unbonding_period(&self) -> std::time::Duration {
        self.pipeline.unbonding_period(&self.chain).await
    }

    /// Cancel in-flight waits and dispose the wallet's transport.
    pub async fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.pipeline.registry().abort(&self.wallet).await;
        debug!(address = %self.wallet.address, "submission flow left");
    }
}

impl Drop for SubmissionFlow {
    fn drop(&mut self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let registry = self.pipeline.registry().clone();
        let wallet = self.wallet.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    registry.abort(&wallet).await;
                });
            }
            Err(_) => {
                warn!(address = %wallet.address, "flow dropped outside runtime; transport left cached");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::submission::harness::*;
    use super::*;
    use crate::chain::mock::MockChainClient;
    use crate::errors::RelayError;
    use crate::pipeline::device::AdapterState;
    use std::time::Duration;

    #[tokio::test]
    async fn leaving_while_awaiting_device_releases_transport() {
        let h = harness(MockChainClient::answering(21_000, accepted("0xabc")), AdapterState::PoweredOff);
        let wallet = bluetooth_wallet();
        // another screen already holds the transport
        h.pipeline.registry().get(&wallet).await.unwrap();

        let flow = Arc::new(h.pipeline.begin(wallet.clone(), h.chain.clone()));
        let mut states = flow.subscribe();
        let submitting = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.submit(transfer_op()).await })
        };

        states
            .wait_for(|s| *s == SubmissionState::AwaitingDevice)
            .await
            .unwrap();
        assert!(h.pipeline.registry().has(&wallet.address).await);

        flow.leave().await;
        assert!(!h.pipeline.registry().has(&wallet.address).await);

        let failure = tokio::time::timeout(Duration::from_secs(1), submitting)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(failure.error, RelayError::Cancelled);
        assert!(!failure.captured);
        assert_eq!(h.diagnostics.count(), 0);
        assert!(h.client.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropping_flow_disposes_transport() {
        let h = harness(MockChainClient::answering(21_000, accepted("0xabc")), AdapterState::PoweredOn);
        let wallet = software_wallet();
        {
            let flow = h.pipeline.begin(wallet.clone(), h.chain.clone());
            flow.submit(transfer_op()).await.unwrap();
            assert_eq!(flow.state(), SubmissionState::Succeeded { txhash: "0xabc".into() });
            assert!(h.pipeline.registry().has(&wallet.address).await);
        }
        for _ in 0..50 {
            if !h.pipeline.registry().has(&wallet.address).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!h.pipeline.registry().has(&wallet.address).await);
    }

    #[tokio::test]
    async fn repeating_after_failure_is_safe() {
        let h = harness(MockChainClient::answering(21_000, accepted("0xabc")), AdapterState::PoweredOn);
        let mut wallet = software_wallet();
        wallet.path = None;
        let flow = h.pipeline.begin(wallet, h.chain.clone());
        let failure = flow.submit(transfer_op()).await.unwrap_err();
        assert!(matches!(failure.error, RelayError::CustodyDataUnavailable(_)));
        assert!(matches!(flow.state(), SubmissionState::Failed { .. }));

        let again = flow.submit(transfer_op()).await.unwrap_err();
        assert_eq!(failure.error, again.error);
        assert!(matches!(flow.state(), SubmissionState::Failed { .. }));
        assert!(h.client.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_after_leave_is_cancelled() {
        let h = harness(MockChainClient::answering(21_000, accepted("0xabc")), AdapterState::PoweredOn);
        let flow = h.pipeline.begin(software_wallet(), h.chain.clone());
        flow.leave().await;
        flow.leave().await;
        let failure = flow.submit(transfer_op()).await.unwrap_err();
        assert_eq!(failure.error, RelayError::Cancelled);
        assert_eq!(h.client.estimate_calls(), 0);
    }
}
