// Signing transport registry
// This file owns the address -> transport cache: construction dispatched by
// custody kind, at most one live transport per wallet, explicit disposal
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use crate::metrics::{LIVE_TRANSPORTS, TRANSPORTS_CONSTRUCTED, TRANSPORTS_DISPOSED};
use crate::transport::{
    BluetoothTransport, DeviceConnector, MpcBackend, MpcTransport, SoftwareTransport, Transport,
    TransportHandle,
};
use crate::wallet::{AccountDataSource, CustodyKind, Wallet};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Backend constructors the registry dispatches to.
#[derive(Clone)]
pub struct Backends {
    pub accounts: Arc<dyn AccountDataSource>,
    pub bluetooth: Option<Arc<dyn DeviceConnector>>,
    pub mpc: Option<Arc<dyn MpcBackend>>,
}

impl Backends {
    pub fn software_only(accounts: Arc<dyn AccountDataSource>) -> Self {
        Self {
            accounts,
            bluetooth: None,
            mpc: None,
        }
    }

    pub fn with_bluetooth(mut self, connector: Arc<dyn DeviceConnector>) -> Self {
        self.bluetooth = Some(connector);
        self
    }

    pub fn with_mpc(mut self, backend: Arc<dyn MpcBackend>) -> Self {
        self.mpc = Some(backend);
        self
    }
}

type Slot = Arc<Mutex<Option<TransportHandle>>>;

/// Process-wide transport cache keyed by wallet address.
///
/// Each address owns a slot guarded by its own async lock, so `get` and
/// `abort` for one wallet are linearizable while other wallets proceed in
/// parallel. A slot only ever holds a fully constructed transport.
pub struct TransportRegistry {
    backends: Backends,
    slots: StdMutex<HashMap<String, Slot>>,
}

fn registry_key(address: &str) -> String {
    address.to_ascii_lowercase()
}

impl TransportRegistry {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            slots: StdMutex::new(HashMap::new()),
        }
    }

    fn slot(&self, address: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .entry(registry_key(address))
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn existing_slot(&self, address: &str) -> Option<Slot> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.get(&registry_key(address)).cloned()
    }

    /// Whether `slot` is still the one mapped for `address`.
    fn is_current(&self, address: &str, slot: &Slot) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .get(&registry_key(address))
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Drop the map entry for an empty slot. Callers hold the slot's lock, so
    /// a waiting `get` sees the slot is no longer current and retries.
    fn release_slot(&self, address: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = registry_key(address);
        if slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(&key);
        }
    }

    fn all_slots(&self) -> Vec<(String, Slot)> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// True iff a live transport is cached for `address`.
    pub async fn has(&self, address: &str) -> bool {
        match self.existing_slot(address) {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    /// Cached transport for the wallet, constructing and caching one if absent.
    pub async fn get(&self, wallet: &Wallet) -> Result<TransportHandle, RelayError> {
        // Reject unsupported kinds before touching shared state.
        if let CustodyKind::Unknown(tag) = &wallet.kind {
            warn!(address = %wallet.address, kind = %tag, "no transport for custody kind");
            return Err(RelayError::UnsupportedCustody(tag.clone()));
        }

        let (slot, mut entry) = loop {
            let slot = self.slot(&wallet.address);
            let entry = slot.clone().lock_owned().await;
            if self.is_current(&wallet.address, &slot) {
                break (slot, entry);
            }
        };
        if let Some(existing) = entry.as_ref() {
            return Ok(existing.clone());
        }

        let transport = match self.construct(wallet) {
            Ok(transport) => Arc::new(transport),
            Err(err) => {
                self.release_slot(&wallet.address, &slot);
                return Err(err);
            }
        };
        TRANSPORTS_CONSTRUCTED.with_label_values(&[transport.kind()]).inc();
        LIVE_TRANSPORTS.inc();
        info!(
            address = %wallet.address,
            kind = %wallet.kind,
            transport = transport.kind(),
            "signing transport constructed"
        );
        *entry = Some(transport.clone());
        Ok(transport)
    }

    fn construct(&self, wallet: &Wallet) -> Result<Transport, RelayError> {
        match &wallet.kind {
            CustodyKind::SoftwareMnemonic | CustodyKind::SoftwareHot => {
                let account = self.backends.accounts.account_data(wallet).ok_or_else(|| {
                    RelayError::CustodyDataUnavailable(format!(
                        "no account data for {}",
                        wallet.address
                    ))
                })?;
                Ok(Transport::Software(SoftwareTransport::new(&wallet.address, account)))
            }
            CustodyKind::HardwareBluetooth => {
                let device_id = wallet
                    .device_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        RelayError::UnsupportedCustody(format!(
                            "{} without device id",
                            wallet.kind
                        ))
                    })?;
                let connector = self.backends.bluetooth.clone().ok_or_else(|| {
                    RelayError::UnsupportedCustody(format!("{} backend not installed", wallet.kind))
                })?;
                Ok(Transport::Bluetooth(BluetoothTransport::new(
                    &wallet.address,
                    device_id,
                    wallet.path.clone().unwrap_or_default(),
                    connector,
                )))
            }
            CustodyKind::MpcShare => {
                let backend = self.backends.mpc.clone().ok_or_else(|| {
                    RelayError::UnsupportedCustody(format!("{} backend not installed", wallet.kind))
                })?;
                let share = self.backends.accounts.account_data(wallet).ok_or_else(|| {
                    RelayError::CustodyDataUnavailable(format!(
                        "no key share for {}",
                        wallet.address
                    ))
                })?;
                Ok(Transport::Mpc(MpcTransport::new(&wallet.address, share, backend)))
            }
            CustodyKind::Unknown(tag) => Err(RelayError::UnsupportedCustody(tag.clone())),
        }
    }

    /// Dispose and remove the wallet's transport. No-op when absent.
    pub async fn abort(&self, wallet: &Wallet) {
        self.abort_address(&wallet.address).await;
    }

    pub async fn abort_address(&self, address: &str) -> bool {
        let Some(slot) = self.existing_slot(address) else {
            return false;
        };
        let mut entry = slot.lock().await;
        let taken = entry.take();
        if let Some(transport) = &taken {
            // Dispose while holding the slot so a concurrent get waits
            // for the old connection to close.
            transport.dispose().await;
        }
        self.release_slot(address, &slot);
        match taken {
            Some(transport) => {
                TRANSPORTS_DISPOSED.with_label_values(&[transport.kind()]).inc();
                LIVE_TRANSPORTS.dec();
                info!(address = %address, transport = transport.kind(), "signing transport disposed");
                true
            }
            None => {
                debug!(address = %address, "abort without cached transport");
                false
            }
        }
    }

    /// Dispose every cached transport.
    pub async fn abort_all(&self) -> usize {
        let aborts = self
            .all_slots()
            .into_iter()
            .map(|(address, _)| async move { self.abort_address(&address).await });
        join_all(aborts).await.into_iter().filter(|disposed| *disposed).count()
    }

    /// Addresses with a live transport.
    pub async fn addresses(&self) -> Vec<String> {
        let mut live = Vec::new();
        for (address, slot) in self.all_slots() {
            if slot.lock().await.is_some() {
                live.push(address);
            }
        }
        live.sort();
        live
    }

    pub async fn len(&self) -> usize {
        self.addresses().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}
