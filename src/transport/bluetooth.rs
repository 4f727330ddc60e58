// Bluetooth hardware-wallet transport
// This file wraps an external device library behind a lazily connected link:
// construction never touches the radio, the first sign or pin call connects
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use crate::signing::Signature;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Error surfaced by a device library. Codes follow the library's strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    pub code: String,
}

impl DeviceError {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl From<DeviceError> for RelayError {
    fn from(err: DeviceError) -> Self {
        RelayError::from_device_message(&err.code)
    }
}

/// Open connection to one hardware device.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn sign(&self, path: &str, payload: &[u8]) -> Result<Signature, DeviceError>;
    async fn close(&self);
}

/// Factory for device connections, provided by the platform's BLE stack.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, device_id: &str) -> Result<Box<dyn DeviceLink>, DeviceError>;
}

pub struct BluetoothTransport {
    address: String,
    device_id: String,
    hd_path: String,
    connector: Arc<dyn DeviceConnector>,
    link: Mutex<Option<Box<dyn DeviceLink>>>,
}

impl BluetoothTransport {
    pub fn new(
        address: impl Into<String>,
        device_id: impl Into<String>,
        hd_path: impl Into<String>,
        connector: Arc<dyn DeviceConnector>,
    ) -> Self {
        Self {
            address: address.into(),
            device_id: device_id.into(),
            hd_path: hd_path.into(),
            connector,
            link: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn hd_path(&self) -> &str {
        &self.hd_path
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    pub async fn sign(&self, path: &str, payload: &[u8]) -> Result<Signature, RelayError> {
        let mut guard = self.link.lock().await;
        if guard.is_none() {
            debug!(device = %self.device_id, address = %self.address, "connecting to device");
            let link = self.connector.connect(&self.device_id).await?;
            info!(device = %self.device_id, "device link established");
            *guard = Some(link);
        }
        let path = if path.is_empty() { self.hd_path.as_str() } else { path };
        let result = match guard.as_ref() {
            Some(link) => link.sign(path, payload).await,
            None => return Err(RelayError::DeviceNotConnected),
        };
        match result {
            Ok(sig) => Ok(sig),
            Err(err) => {
                let relay_err = RelayError::from(err);
                if matches!(relay_err, RelayError::DeviceNotConnected) {
                    // link went away under us; reconnect on next call
                    if let Some(stale) = guard.take() {
                        stale.close().await;
                    }
                }
                Err(relay_err)
            }
        }
    }

    /// The PIN lives on the device; nothing is cached on this side.
    pub async fn update_pin(&self, _pin: &str) -> Result<(), RelayError> {
        debug!(device = %self.device_id, "pin is managed by the device; skipping");
        Ok(())
    }

    pub async fn dispose(&self) {
        if let Some(link) = self.link.lock().await.take() {
            link.close().await;
            debug!(device = %self.device_id, address = %self.address, "device link closed");
        } else {
            debug!(device = %self.device_id, "dispose without open link");
        }
    }
}

impl Drop for BluetoothTransport {
    fn drop(&mut self) {
        if let Ok(guard) = self.link.try_lock() {
            if guard.is_some() {
                warn!(device = %self.device_id, "bluetooth transport dropped with open link");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::signing::{derive_signing_key, sign_payload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test device: counts connects/closes and can be told to fail.
    #[derive(Default)]
    pub struct MockConnector {
        pub connects: AtomicUsize,
        pub closes: Arc<AtomicUsize>,
        pub fail_with: std::sync::Mutex<Option<String>>,
    }

    impl MockConnector {
        pub fn failing(code: &str) -> Self {
            let c = Self::default();
            *c.fail_with.lock().unwrap() = Some(code.to_string());
            c
        }
    }

    struct MockLink {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeviceLink for MockLink {
        async fn sign(&self, path: &str, payload: &[u8]) -> Result<Signature, DeviceError> {
            let key = derive_signing_key(b"device", path).map_err(|e| DeviceError::new(e.to_string()))?;
            Ok(sign_payload(&key, payload))
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DeviceConnector for MockConnector {
        async fn connect(&self, _device_id: &str) -> Result<Box<dyn DeviceLink>, DeviceError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(code) = self.fail_with.lock().unwrap().clone() {
                return Err(DeviceError::new(code));
            }
            Ok(Box::new(MockLink { closes: self.closes.clone() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn connects_lazily_and_reuses_link() {
        let connector = Arc::new(MockConnector::default());
        let t = BluetoothTransport::new("0xabc", "dev-1", "m/44'/60'/0'/0/0", connector.clone());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(!t.is_connected().await);

        t.sign("", b"one").await.unwrap();
        t.sign("m/44'/60'/0'/0/0", b"two").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(t.is_connected().await);

        t.dispose().await;
        assert!(!t.is_connected().await);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        t.dispose().await;
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn device_codes_become_typed_errors() {
        let locked = BluetoothTransport::new(
            "0xabc",
            "dev-1",
            "m/0",
            Arc::new(MockConnector::failing("ledger_locked")),
        );
        assert_eq!(locked.sign("", b"x").await, Err(RelayError::DeviceLocked));

        let absent = BluetoothTransport::new(
            "0xabc",
            "dev-1",
            "m/0",
            Arc::new(MockConnector::failing("can_not_connected")),
        );
        assert_eq!(absent.sign("", b"x").await, Err(RelayError::DeviceNotConnected));
        assert!(!absent.is_connected().await);
    }
}
