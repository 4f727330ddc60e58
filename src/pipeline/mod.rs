// Transaction submission pipeline
// Drives one user-initiated operation from fee estimation through device
// readiness and signing to broadcast, reporting classified failures
//
// Numan Thabit 2025 Nov

pub mod device;
pub mod failure;
pub mod flow;
pub mod submission;

pub use device::{AdapterState, BluetoothGate};
pub use failure::{correlation_id, DiagnosticsSink, SubmissionFailure, TracingDiagnostics};
pub use flow::SubmissionFlow;
pub use submission::{SubmissionPipeline, SubmissionStats};

use crate::chain::{ChainInfo, FeeEstimate, TokenRef};
use serde::{Deserialize, Serialize};

/// Chain amounts travel as decimal strings; plain JSON integers are accepted
/// on input. Internally tagged enums buffer their fields, which rules out a
/// direct `u128`.
pub mod amount {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        d.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(u128::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount: {v}")))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid amount: {v:?}")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Transfer {
        to: String,
        #[serde(with = "amount")]
        amount: u128,
        #[serde(default)]
        token: Option<TokenRef>,
    },
    /// Staking delegation. The fee comes from the delegation preview; it is
    /// not re-estimated here.
    Delegate {
        validator: String,
        #[serde(with = "amount")]
        amount: u128,
        #[serde(with = "amount")]
        fee: u128,
        #[serde(default)]
        gas_limit: u64,
    },
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Transfer { .. } => "transfer",
            Operation::Delegate { .. } => "staking-delegate",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Operation::Transfer { to, .. } => to,
            Operation::Delegate { validator, .. } => validator,
        }
    }

    pub fn amount(&self) -> u128 {
        match self {
            Operation::Transfer { amount, .. } | Operation::Delegate { amount, .. } => *amount,
        }
    }

    /// Fee supplied with the operation, when it does not need estimating.
    pub fn supplied_fee(&self, chain: &ChainInfo) -> Option<FeeEstimate> {
        match self {
            Operation::Transfer { .. } => None,
            Operation::Delegate { fee, gas_limit, .. } => Some(FeeEstimate {
                expected_fee: *fee,
                gas_limit: *gas_limit,
                gas_price: if *gas_limit > 0 {
                    fee / u128::from(*gas_limit)
                } else {
                    0
                },
                bandwidth_units: chain.is_bandwidth.then_some(*gas_limit),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    #[default]
    Idle,
    Estimating,
    AwaitingDevice,
    Signing,
    Broadcasting,
    Succeeded {
        txhash: String,
    },
    Failed {
        correlation_id: String,
        message: String,
    },
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Succeeded { .. } | SubmissionState::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub txhash: String,
    pub fee: FeeEstimate,
}
