// Wallet records and key-material collaborators
// This file defines the read-only wallet view the relay consumes, the custody
// kinds it dispatches on, and the in-memory store used by the daemon and tests
//
// Numan Thabit 2025 Nov

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::RwLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Which mechanism holds the private key of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CustodyKind {
    SoftwareMnemonic,
    SoftwareHot,
    HardwareBluetooth,
    MpcShare,
    /// Tag found in a wallet record that this build does not know about.
    Unknown(String),
}

impl CustodyKind {
    pub fn as_str(&self) -> &str {
        match self {
            CustodyKind::SoftwareMnemonic => "software-mnemonic",
            CustodyKind::SoftwareHot => "software-hot",
            CustodyKind::HardwareBluetooth => "hardware-bluetooth",
            CustodyKind::MpcShare => "mpc-share",
            CustodyKind::Unknown(tag) => tag,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self, CustodyKind::SoftwareMnemonic | CustodyKind::SoftwareHot)
    }

    /// Custody kinds whose signing needs an external device link.
    pub fn requires_device(&self) -> bool {
        matches!(self, CustodyKind::HardwareBluetooth)
    }
}

impl From<String> for CustodyKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "software-mnemonic" => CustodyKind::SoftwareMnemonic,
            "software-hot" => CustodyKind::SoftwareHot,
            "hardware-bluetooth" => CustodyKind::HardwareBluetooth,
            "mpc-share" => CustodyKind::MpcShare,
            _ => CustodyKind::Unknown(tag),
        }
    }
}

impl From<CustodyKind> for String {
    fn from(kind: CustodyKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for CustodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wallet record as exposed by the wallet store. Address is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub address: String,
    /// Account group; wallets derived from one secret share an account id.
    pub account_id: String,
    pub kind: CustodyKind,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Derived account secret used to seed software and MPC transports.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccountData {
    #[zeroize(skip)]
    pub account_id: String,
    secret: Vec<u8>,
}

impl AccountData {
    pub fn new(account_id: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            account_id: account_id.into(),
            secret,
        }
    }

    pub fn from_hex(account_id: impl Into<String>, secret_hex: &str) -> Result<Self> {
        let secret = hex::decode(secret_hex.trim_start_matches("0x"))
            .context("account secret must be hex encoded")?;
        Ok(Self::new(account_id, secret))
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for AccountData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountData")
            .field("account_id", &self.account_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Balance buckets a wallet store can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceKind {
    Available,
    Staked,
    Locked,
}

/// Read-only wallet queries.
pub trait WalletStore: Send + Sync {
    fn get_all(&self) -> Vec<Wallet>;
    fn get_by_id(&self, id: &str) -> Option<Wallet>;
    fn get_balance(&self, address: &str, kind: BalanceKind) -> u128;
}

/// Source of derived account data for software and MPC custody.
pub trait AccountDataSource: Send + Sync {
    fn account_data(&self, wallet: &Wallet) -> Option<AccountData>;
}

#[derive(Default)]
pub struct InMemoryWalletStore {
    wallets: RwLock<Vec<Wallet>>,
    balances: RwLock<HashMap<(String, BalanceKind), u128>>,
}

impl InMemoryWalletStore {
    pub fn new(wallets: Vec<Wallet>) -> Self {
        Self {
            wallets: RwLock::new(wallets),
            balances: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_balance(&self, address: &str, kind: BalanceKind, amount: u128) {
        if let Ok(mut balances) = self.balances.write() {
            balances.insert((address.to_ascii_lowercase(), kind), amount);
        }
    }
}

impl WalletStore for InMemoryWalletStore {
    fn get_all(&self) -> Vec<Wallet> {
        self.wallets
            .read()
            .map(|wallets| wallets.clone())
            .unwrap_or_default()
    }

    fn get_by_id(&self, id: &str) -> Option<Wallet> {
        self.wallets
            .read()
            .ok()?
            .iter()
            .find(|w| w.id == id || w.address.eq_ignore_ascii_case(id))
            .cloned()
    }

    fn get_balance(&self, address: &str, kind: BalanceKind) -> u128 {
        self.balances
            .read()
            .ok()
            .and_then(|b| b.get(&(address.to_ascii_lowercase(), kind)).copied())
            .unwrap_or(0)
    }
}

/// Account data keyed by account group.
#[derive(Default)]
pub struct InMemoryAccountSource {
    accounts: RwLock<HashMap<String, AccountData>>,
}

impl InMemoryAccountSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, data: AccountData) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(data.account_id.clone(), data);
        }
    }
}

impl AccountDataSource for InMemoryAccountSource {
    fn account_data(&self, wallet: &Wallet) -> Option<AccountData> {
        self.accounts.read().ok()?.get(&wallet.account_id).cloned()
    }
}

/// On-disk wallet directory consumed by the daemon.
#[derive(Debug, Deserialize)]
pub struct WalletDirectory {
    #[serde(default)]
    pub wallets: Vec<Wallet>,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    pub account_id: String,
    pub secret_hex: String,
}

impl WalletDirectory {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read wallet directory {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("parse wallet directory YAML")
    }

    /// Split the directory into the wallet store and the account source.
    pub fn into_parts(self) -> Result<(InMemoryWalletStore, InMemoryAccountSource)> {
        let accounts = InMemoryAccountSource::new();
        for entry in &self.accounts {
            accounts.insert(AccountData::from_hex(&entry.account_id, &entry.secret_hex)?);
        }
        Ok((InMemoryWalletStore::new(self.wallets), accounts))
    }
}
