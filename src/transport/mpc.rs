// MPC key-share signing transport
// Signing is delegated to an external MPC backend that holds the local share
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use crate::signing::Signature;
use crate::wallet::AccountData;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// External multi-party computation signer.
#[async_trait]
pub trait MpcBackend: Send + Sync {
    async fn sign(
        &self,
        share: &AccountData,
        path: &str,
        payload: &[u8],
    ) -> Result<Signature, RelayError>;

    /// Re-encrypt the stored share under a new PIN.
    async fn update_pin(&self, share: &AccountData, pin: &str) -> Result<(), RelayError>;
}

pub struct MpcTransport {
    address: String,
    backend: Arc<dyn MpcBackend>,
    share: Mutex<Option<AccountData>>,
}

impl MpcTransport {
    pub fn new(address: impl Into<String>, share: AccountData, backend: Arc<dyn MpcBackend>) -> Self {
        Self {
            address: address.into(),
            backend,
            share: Mutex::new(Some(share)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn sign(&self, path: &str, payload: &[u8]) -> Result<Signature, RelayError> {
        let share = self.share.lock().await;
        let share = share
            .as_ref()
            .ok_or_else(|| RelayError::CustodyDataUnavailable("transport disposed".into()))?;
        self.backend.sign(share, path, payload).await
    }

    pub async fn update_pin(&self, pin: &str) -> Result<(), RelayError> {
        let share = self.share.lock().await;
        let share = share
            .as_ref()
            .ok_or_else(|| RelayError::CustodyDataUnavailable("transport disposed".into()))?;
        self.backend.update_pin(share, pin).await
    }

    pub async fn dispose(&self) {
        self.share.lock().await.take();
    }

    pub async fn is_disposed(&self) -> bool {
        self.share.lock().await.is_none()
    }
}
