// PIN rotation
// Re-keys every account group's transport to a new PIN, then stores the PIN
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use crate::registry::TransportRegistry;
use crate::signing::pin_fingerprint;
use crate::surfaces::{Notification, Surfaces};
use crate::wallet::WalletStore;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

/// Application PIN persistence.
pub trait PinStore: Send + Sync {
    fn set_pin(&self, pin: &str) -> Result<(), RelayError>;
}

/// Keeps only a fingerprint of the current PIN.
#[derive(Default)]
pub struct InMemoryPinStore {
    fingerprint: Mutex<Option<[u8; 32]>>,
}

impl InMemoryPinStore {
    pub fn matches(&self, pin: &str) -> bool {
        let current = self.fingerprint.lock().map(|f| *f).unwrap_or(None);
        current == Some(pin_fingerprint("app", pin))
    }
}

impl PinStore for InMemoryPinStore {
    fn set_pin(&self, pin: &str) -> Result<(), RelayError> {
        let mut slot = self
            .fingerprint
            .lock()
            .map_err(|_| RelayError::Unexpected("pin store poisoned".into()))?;
        *slot = Some(pin_fingerprint("app", pin));
        Ok(())
    }
}

/// Rotate the PIN. A mismatched confirmation returns `Ok(false)` without
/// touching anything; otherwise each account group's first wallet updates its
/// transport exactly once.
pub async fn rotate_pin(
    registry: &TransportRegistry,
    wallets: &dyn WalletStore,
    pins: &dyn PinStore,
    surfaces: &dyn Surfaces,
    pin: &str,
    repeated: &str,
) -> Result<bool, RelayError> {
    if pin != repeated {
        return Ok(false);
    }

    surfaces.show_loading();
    let result: Result<(), RelayError> = async {
        let mut seen = HashSet::new();
        for wallet in wallets.get_all() {
            if !seen.insert(wallet.account_id.clone()) {
                continue;
            }
            let transport = registry.get(&wallet).await?;
            transport.update_pin(pin).await?;
            info!(account = %wallet.account_id, transport = transport.kind(), "pin updated");
        }
        pins.set_pin(pin)
    }
    .await;
    surfaces.hide_loading();
    result?;

    surfaces.send_notification(Notification::PinChanged);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Backends;
    use crate::surfaces::mock::RecordingSurfaces;
    use crate::transport::Transport;
    use crate::wallet::{AccountData, CustodyKind, InMemoryAccountSource, InMemoryWalletStore, Wallet};
    use std::sync::Arc;

    fn wallet(address: &str, account: &str, kind: CustodyKind) -> Wallet {
        Wallet {
            id: address.into(),
            address: address.into(),
            account_id: account.into(),
            kind,
            device_id: None,
            path: Some("m/44'/60'/0'/0/0".into()),
        }
    }

    fn setup() -> (TransportRegistry, InMemoryWalletStore) {
        let accounts = InMemoryAccountSource::new();
        accounts.insert(AccountData::new("acc-1", vec![1u8; 32]));
        accounts.insert(AccountData::new("acc-2", vec![2u8; 32]));
        let registry = TransportRegistry::new(Backends::software_only(Arc::new(accounts)));
        let store = InMemoryWalletStore::new(vec![
            wallet("0x01", "acc-1", CustodyKind::SoftwareMnemonic),
            wallet("0x02", "acc-1", CustodyKind::SoftwareMnemonic),
            wallet("0x03", "acc-2", CustodyKind::SoftwareHot),
        ]);
        (registry, store)
    }

    #[tokio::test]
    async fn mismatch_has_no_side_effects() {
        let (registry, store) = setup();
        let pins = InMemoryPinStore::default();
        let surfaces = RecordingSurfaces::default();
        let changed = rotate_pin(&registry, &store, &pins, &surfaces, "123456", "654321")
            .await
            .unwrap();
        assert!(!changed);
        assert!(registry.is_empty().await);
        assert!(surfaces.events.lock().unwrap().is_empty());
        assert!(!pins.matches("123456"));
    }

    #[tokio::test]
    async fn updates_one_transport_per_account_group() {
        let (registry, store) = setup();
        let pins = InMemoryPinStore::default();
        let surfaces = RecordingSurfaces::default();
        let changed = rotate_pin(&registry, &store, &pins, &surfaces, "123456", "123456")
            .await
            .unwrap();
        assert!(changed);
        assert!(pins.matches("123456"));
        assert_eq!(registry.addresses().await, vec!["0x01", "0x03"]);

        let w1 = registry
            .get(&wallet("0x01", "acc-1", CustodyKind::SoftwareMnemonic))
            .await
            .unwrap();
        let Transport::Software(inner) = w1.as_ref() else {
            panic!("expected software transport");
        };
        assert!(inner.verify_pin("123456").await);

        assert_eq!(
            *surfaces.events.lock().unwrap(),
            vec!["loading", "loaded", "notification"]
        );
        assert_eq!(
            surfaces.notifications.lock().unwrap()[0],
            Notification::PinChanged
        );
    }

    #[tokio::test]
    async fn unsupported_wallet_aborts_rotation() {
        let (registry, _) = setup();
        let store = InMemoryWalletStore::new(vec![wallet(
            "0x09",
            "acc-9",
            CustodyKind::Unknown("watch-only".into()),
        )]);
        let pins = InMemoryPinStore::default();
        let surfaces = RecordingSurfaces::default();
        let err = rotate_pin(&registry, &store, &pins, &surfaces, "1", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedCustody(_)));
        assert!(!pins.matches("1"));
        assert_eq!(*surfaces.events.lock().unwrap(), vec!["loading", "loaded"]);
    }
}
