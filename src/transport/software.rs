// In-process software signing transport
// This file implements the transport used by mnemonic and hot wallets: keys
// are derived from cached account data that is wiped on dispose
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use crate::signing::{derive_signing_key, pin_fingerprint, sign_payload, Signature};
use crate::wallet::AccountData;
use tokio::sync::Mutex;
use tracing::debug;

struct SoftwareState {
    account: Option<AccountData>,
    pin_fingerprint: Option<[u8; 32]>,
}

pub struct SoftwareTransport {
    address: String,
    state: Mutex<SoftwareState>,
}

impl SoftwareTransport {
    pub fn new(address: impl Into<String>, account: AccountData) -> Self {
        Self {
            address: address.into(),
            state: Mutex::new(SoftwareState {
                account: Some(account),
                pin_fingerprint: None,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn sign(&self, path: &str, payload: &[u8]) -> Result<Signature, RelayError> {
        let state = self.state.lock().await;
        let account = state
            .account
            .as_ref()
            .ok_or_else(|| RelayError::CustodyDataUnavailable("transport disposed".into()))?;
        let key = derive_signing_key(account.secret(), path)?;
        Ok(sign_payload(&key, payload))
    }

    /// Re-bind the cached account secret to a new PIN.
    pub async fn update_pin(&self, pin: &str) -> Result<(), RelayError> {
        let mut state = self.state.lock().await;
        let account_id = state
            .account
            .as_ref()
            .map(|a| a.account_id.clone())
            .ok_or_else(|| RelayError::CustodyDataUnavailable("transport disposed".into()))?;
        state.pin_fingerprint = Some(pin_fingerprint(&account_id, pin));
        debug!(address = %self.address, account = %account_id, "software transport pin updated");
        Ok(())
    }

    pub async fn verify_pin(&self, pin: &str) -> bool {
        let state = self.state.lock().await;
        match (&state.account, state.pin_fingerprint) {
            (Some(account), Some(expected)) => pin_fingerprint(&account.account_id, pin) == expected,
            _ => false,
        }
    }

    /// Drop cached secrets; the account data zeroizes itself on drop.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        state.account = None;
        state.pin_fingerprint = None;
    }

    pub async fn is_disposed(&self) -> bool {
        self.state.lock().await.account.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::verify_payload;

    fn transport() -> SoftwareTransport {
        SoftwareTransport::new("0xabc", AccountData::new("acc-1", vec![5u8; 32]))
    }

    #[tokio::test]
    async fn signs_until_disposed() {
        let t = transport();
        let sig = t.sign("m/44'/60'/0'/0/0", b"doc").await.unwrap();
        assert!(verify_payload(&sig, b"doc"));

        t.dispose().await;
        assert!(t.is_disposed().await);
        assert!(matches!(
            t.sign("m/44'/60'/0'/0/0", b"doc").await,
            Err(RelayError::CustodyDataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn pin_update_is_verifiable() {
        let t = transport();
        assert!(!t.verify_pin("1234").await);
        t.update_pin("1234").await.unwrap();
        assert!(t.verify_pin("1234").await);
        assert!(!t.verify_pin("4321").await);
    }
}
