// Submission failure reporting
// Correlation ids, the diagnostics sink and the split between expected device
// states and failures that get captured
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use tracing::error;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Short id the user can quote to support.
pub fn correlation_id(len: usize) -> String {
    (0..len)
        .map(|_| {
            let idx = OsRng.next_u32() as usize % ID_ALPHABET.len();
            ID_ALPHABET[idx] as char
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticMetadata {
    pub id: String,
    pub message: String,
}

pub trait DiagnosticsSink: Send + Sync {
    fn capture_exception(&self, error: &RelayError, context: &str, metadata: &DiagnosticMetadata);
}

/// Sink that records captures as error-level log events.
#[derive(Debug, Default, Clone)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn capture_exception(&self, err: &RelayError, context: &str, metadata: &DiagnosticMetadata) {
        error!(
            context,
            id = %metadata.id,
            message = %metadata.message,
            category = err.category(),
            error = %err,
            "captured exception"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionFailure {
    pub correlation_id: String,
    /// Chain detail when present, otherwise the error text
    pub message: String,
    #[serde(skip)]
    pub error: RelayError,
    pub captured: bool,
}

impl SubmissionFailure {
    /// Build the failure and capture it unless the error is an expected state.
    pub fn report(error: RelayError, context: &str, sink: &dyn DiagnosticsSink) -> Self {
        let correlation_id = correlation_id(4);
        let message = error
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        let captured = !error.is_expected();
        if captured {
            sink.capture_exception(
                &error,
                context,
                &DiagnosticMetadata {
                    id: correlation_id.clone(),
                    message: message.clone(),
                },
            );
        }
        Self {
            correlation_id,
            message,
            error,
            captured,
        }
    }

    pub fn is_expected(&self) -> bool {
        self.error.is_expected()
    }
}

impl std::fmt::Display for SubmissionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.correlation_id, self.message)
    }
}

impl std::error::Error for SubmissionFailure {}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingDiagnostics {
        pub captured: Mutex<Vec<(String, DiagnosticMetadata)>>,
    }

    impl RecordingDiagnostics {
        pub fn count(&self) -> usize {
            self.captured.lock().unwrap().len()
        }
    }

    impl DiagnosticsSink for RecordingDiagnostics {
        fn capture_exception(&self, _err: &RelayError, context: &str, metadata: &DiagnosticMetadata) {
            self.captured
                .lock()
                .unwrap()
                .push((context.to_string(), metadata.clone()));
        }
    }
}
