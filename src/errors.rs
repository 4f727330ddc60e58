// Error types and error classification module
// This file defines the relay's error taxonomy and the rules that split
// expected device states from failures that need diagnostic capture
//
// Numan Thabit 2025 Nov

use thiserror::Error;

/// Device library code for a hardware wallet that could not be reached.
pub const DEVICE_CODE_NOT_CONNECTED: &str = "can_not_connected";
/// Device library code for a hardware wallet that is PIN-locked.
pub const DEVICE_CODE_LOCKED: &str = "ledger_locked";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("transport not implemented for custody kind: {0}")]
    UnsupportedCustody(String),
    #[error("custody data unavailable: {0}")]
    CustodyDataUnavailable(String),
    #[error("can_not_connected")]
    DeviceNotConnected,
    #[error("ledger_locked")]
    DeviceLocked,
    #[error("fee estimation failed: {0}")]
    EstimationFailed(String),
    #[error("broadcast rejected (code {code}): {}", .raw_log.as_deref().unwrap_or("no log"))]
    BroadcastRejected { code: u32, raw_log: Option<String> },
    #[error("flow cancelled")]
    Cancelled,
    #[error("{0}")]
    Unexpected(String),
}

impl RelayError {
    /// Map an error reported by a hardware device library onto the taxonomy.
    pub fn from_device_message(message: &str) -> Self {
        match message {
            DEVICE_CODE_NOT_CONNECTED => RelayError::DeviceNotConnected,
            DEVICE_CODE_LOCKED => RelayError::DeviceLocked,
            other => RelayError::Unexpected(other.to_string()),
        }
    }

    /// Expected states are shown to the user as retry guidance and are never
    /// sent to the diagnostics sink.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            RelayError::DeviceNotConnected | RelayError::DeviceLocked | RelayError::Cancelled
        )
    }

    /// Whether the user may retry the same attempt in place.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::DeviceNotConnected
                | RelayError::DeviceLocked
                | RelayError::EstimationFailed(_)
        )
    }

    /// Chain-provided detail for the failure, when there is one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RelayError::BroadcastRejected { raw_log, .. } => {
                raw_log.as_deref().filter(|log| !log.is_empty())
            }
            _ => None,
        }
    }

    /// Short label used for metrics and logs.
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::UnsupportedCustody(_) => "unsupported_custody",
            RelayError::CustodyDataUnavailable(_) => "custody_data_unavailable",
            RelayError::DeviceNotConnected => "device_not_connected",
            RelayError::DeviceLocked => "device_locked",
            RelayError::EstimationFailed(_) => "estimation_failed",
            RelayError::BroadcastRejected { .. } => "broadcast_rejected",
            RelayError::Cancelled => "cancelled",
            RelayError::Unexpected(_) => "unexpected",
        }
    }
}

/// Errors raised by chain RPC collaborators.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unknown chain: {0}")]
    UnknownChain(u64),
}

impl ChainError {
    /// Transport failures are worth retrying; provider answers are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

impl From<ChainError> for RelayError {
    fn from(err: ChainError) -> Self {
        RelayError::Unexpected(err.to_string())
    }
}
