// Hardware device readiness gate
// Waits for the Bluetooth adapter to come up before a hardware wallet is
// asked to sign; bounded by a timeout and cancelled when the flow is left
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Unknown,
    PoweredOff,
    Unauthorized,
    PoweredOn,
}

impl AdapterState {
    pub fn is_ready(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

#[derive(Clone)]
pub struct BluetoothGate {
    adapter: watch::Receiver<AdapterState>,
    timeout: Duration,
}

impl BluetoothGate {
    pub fn new(adapter: watch::Receiver<AdapterState>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }

    /// Gate over a fixed adapter state, for hosts without a radio monitor.
    pub fn fixed(state: AdapterState, timeout: Duration) -> (watch::Sender<AdapterState>, Self) {
        let (tx, rx) = watch::channel(state);
        (tx, Self::new(rx, timeout))
    }

    pub fn current(&self) -> AdapterState {
        *self.adapter.borrow()
    }

    /// Resolve once the adapter is powered on.
    ///
    /// Timeout and a closed monitor both read as `DeviceNotConnected`;
    /// cancellation wins over either.
    pub async fn wait_ready(&self, cancel: &CancellationToken) -> Result<(), RelayError> {
        let mut adapter = self.adapter.clone();
        let ready = async move {
            adapter
                .wait_for(|state| state.is_ready())
                .await
                .map(|_| ())
                .map_err(|_| RelayError::DeviceNotConnected)
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("device wait cancelled");
                Err(RelayError::Cancelled)
            }
            res = tokio::time::timeout(self.timeout, ready) => match res {
                Ok(inner) => inner,
                Err(_) => {
                    warn!(timeout_ms = self.timeout.as_millis() as u64, state = ?self.current(), "bluetooth adapter not ready");
                    Err(RelayError::DeviceNotConnected)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_adapter_passes_immediately() {
        let (_tx, gate) = BluetoothGate::fixed(AdapterState::PoweredOn, Duration::from_millis(10));
        gate.wait_ready(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn waits_for_power_on() {
        let (tx, gate) = BluetoothGate::fixed(AdapterState::PoweredOff, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move { gate.wait_ready(&cancel).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(AdapterState::PoweredOn).unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn times_out_as_not_connected() {
        let (_tx, gate) = BluetoothGate::fixed(AdapterState::PoweredOff, Duration::from_millis(20));
        assert_eq!(
            gate.wait_ready(&CancellationToken::new()).await,
            Err(RelayError::DeviceNotConnected)
        );
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let (_tx, gate) = BluetoothGate::fixed(AdapterState::PoweredOff, Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let waiter = tokio::spawn(async move { gate.wait_ready(&child).await });
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(RelayError::Cancelled));
    }
}
