// Signing transports, one variant per custody backend
// This file defines the tagged union the registry hands out and dispatches
// sign / pin / dispose calls to the backend that owns the key
//
// Numan Thabit 2025 Nov

pub mod bluetooth;
pub mod mpc;
pub mod software;

pub use bluetooth::{BluetoothTransport, DeviceConnector, DeviceError, DeviceLink};
pub use mpc::{MpcBackend, MpcTransport};
pub use software::SoftwareTransport;

use crate::errors::RelayError;
use crate::signing::Signature;
use std::sync::Arc;

/// Stateful signing handle bound to one wallet address.
pub enum Transport {
    Software(SoftwareTransport),
    Bluetooth(BluetoothTransport),
    Mpc(MpcTransport),
}

/// Shared handle; identity (`Arc::ptr_eq`) is the registry's cache key.
pub type TransportHandle = Arc<Transport>;

impl Transport {
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Software(_) => "software",
            Transport::Bluetooth(_) => "bluetooth",
            Transport::Mpc(_) => "mpc",
        }
    }

    pub async fn sign(&self, path: &str, payload: &[u8]) -> Result<Signature, RelayError> {
        match self {
            Transport::Software(t) => t.sign(path, payload).await,
            Transport::Bluetooth(t) => t.sign(path, payload).await,
            Transport::Mpc(t) => t.sign(path, payload).await,
        }
    }

    pub async fn update_pin(&self, pin: &str) -> Result<(), RelayError> {
        match self {
            Transport::Software(t) => t.update_pin(pin).await,
            Transport::Bluetooth(t) => t.update_pin(pin).await,
            Transport::Mpc(t) => t.update_pin(pin).await,
        }
    }

    /// Close connections and clear cached secrets. Safe to call repeatedly.
    pub async fn dispose(&self) {
        match self {
            Transport::Software(t) => t.dispose().await,
            Transport::Bluetooth(t) => t.dispose().await,
            Transport::Mpc(t) => t.dispose().await,
        }
    }
}
