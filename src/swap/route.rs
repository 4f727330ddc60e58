// Swap route rendering
// Resolves a route given as an address list or a packed path and renders the
// visible hop sequence with a direction-aware arrow
//
// Numan Thabit 2025 Nov

use super::path::{decode_swap_path, SwapPathError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const NBSP: char = '\u{00A0}';

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Route(Vec<String>),
    Path(String),
}

impl RouteSource {
    pub fn resolve(&self) -> Result<Vec<String>, SwapPathError> {
        match self {
            RouteSource::Route(addresses) => Ok(addresses.clone()),
            RouteSource::Path(hex) => decode_swap_path(hex).map(|p| p.into_tokens()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    #[default]
    Ltr,
    Rtl,
}

impl TextDirection {
    pub fn arrow(self) -> char {
        match self {
            TextDirection::Ltr => '→',
            TextDirection::Rtl => '←',
        }
    }

    pub fn separator(self) -> String {
        [NBSP, self.arrow(), NBSP].iter().collect()
    }
}

/// Known tokens by contract address (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct TokenDirectory {
    symbols: HashMap<String, String>,
}

impl TokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: &str, symbol: impl Into<String>) {
        self.symbols.insert(address.to_ascii_lowercase(), symbol.into());
    }

    pub fn symbol(&self, address: &str) -> Option<&str> {
        self.symbols.get(&address.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Symbols of the known tokens along the route, hop order preserved.
pub fn route_symbols<'a>(addresses: &[String], tokens: &'a TokenDirectory) -> Vec<&'a str> {
    addresses.iter().filter_map(|a| tokens.symbol(a)).collect()
}

/// Visible route, e.g. `WETH → USDC`. Unknown tokens are skipped.
pub fn render_route(addresses: &[String], tokens: &TokenDirectory, direction: TextDirection) -> String {
    route_symbols(addresses, tokens).join(&direction.separator())
}
