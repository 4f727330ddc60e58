// Swap path decoding
// This file decodes a packed multi-hop route (address, then repeated
// fee-tier + address chunks) into token addresses in hop order
//
// Numan Thabit 2025 Nov

use serde::Serialize;
use thiserror::Error;

/// Hex characters in one token address (20 bytes).
pub const ADDRESS_HEX_LEN: usize = 40;
/// Hex characters in one fee tier (3 bytes).
pub const FEE_HEX_LEN: usize = 6;
/// Hex characters per hop after the first address.
pub const HOP_HEX_LEN: usize = FEE_HEX_LEN + ADDRESS_HEX_LEN;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwapPathError {
    #[error("swap path too short: {0} hex chars, need at least 40")]
    TooShort(usize),
    #[error("invalid hex in swap path at offset {0}")]
    InvalidHex(usize),
    #[error("swap path has {0} trailing hex chars")]
    TrailingBytes(usize),
}

/// Token addresses in hop order, each `0x`-prefixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapPath {
    tokens: Vec<String>,
}

impl SwapPath {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn source(&self) -> &str {
        &self.tokens[0]
    }

    pub fn destination(&self) -> &str {
        &self.tokens[self.tokens.len() - 1]
    }

    pub fn hops(&self) -> usize {
        self.tokens.len() - 1
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

fn checked_address(hex: &str, start: usize) -> Result<String, SwapPathError> {
    let chunk = &hex[start..start + ADDRESS_HEX_LEN];
    if let Some(bad) = chunk.bytes().position(|b| !b.is_ascii_hexdigit()) {
        return Err(SwapPathError::InvalidHex(start + bad));
    }
    Ok(format!("0x{chunk}"))
}

/// Returns the decoded path and the count of unconsumed trailing chars.
fn decode(encoded: &str) -> Result<(SwapPath, usize), SwapPathError> {
    let hex = encoded.strip_prefix("0x").unwrap_or(encoded);
    if let Some(bad) = hex.bytes().position(|b| !b.is_ascii()) {
        return Err(SwapPathError::InvalidHex(bad));
    }
    if hex.len() < ADDRESS_HEX_LEN {
        return Err(SwapPathError::TooShort(hex.len()));
    }

    let mut tokens = vec![checked_address(hex, 0)?];
    let mut pos = ADDRESS_HEX_LEN;
    while hex.len() - pos >= HOP_HEX_LEN {
        // fee tier is skipped unread
        tokens.push(checked_address(hex, pos + FEE_HEX_LEN)?);
        pos += HOP_HEX_LEN;
    }
    Ok((SwapPath { tokens }, hex.len() - pos))
}

/// Decode a packed swap path. A trailing partial chunk is discarded.
pub fn decode_swap_path(encoded: &str) -> Result<SwapPath, SwapPathError> {
    decode(encoded).map(|(path, _)| path)
}

/// Like [`decode_swap_path`] but rejects a trailing partial chunk.
pub fn decode_swap_path_strict(encoded: &str) -> Result<SwapPath, SwapPathError> {
    match decode(encoded)? {
        (path, 0) => Ok(path),
        (_, trailing) => Err(SwapPathError::TrailingBytes(trailing)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const B: &str = "A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const C: &str = "dac17f958d2ee523a2206206994597c13d831ec7";

    fn addr(hex: &str) -> String {
        format!("0x{hex}")
    }

    #[test]
    fn decodes_three_hop_path_in_order() {
        for (f1, f2) in [("000bb8", "0001f4"), ("002710", "000064"), ("ffffff", "000000")] {
            let encoded = format!("0x{A}{f1}{B}{f2}{C}");
            let path = decode_swap_path(&encoded).unwrap();
            assert_eq!(path.tokens(), &[addr(A), addr(B), addr(C)]);
            assert_eq!(path.source(), addr(A));
            assert_eq!(path.destination(), addr(C));
            assert_eq!(path.hops(), 2);
        }
    }

    #[test]
    fn prefix_is_optional() {
        let with = decode_swap_path(&format!("0x{A}000bb8{B}")).unwrap();
        let without = decode_swap_path(&format!("{A}000bb8{B}")).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn trailing_partial_chunk_is_discarded() {
        for extra in [0, 1, 6, 30, 45] {
            let tail: String = "0".repeat(extra);
            let encoded = format!("{A}000bb8{B}{tail}");
            let path = decode_swap_path(&encoded).unwrap();
            assert_eq!(path.tokens(), &[addr(A), addr(B)]);
        }
        let lone = decode_swap_path(&format!("0x{A}000bb8")).unwrap();
        assert_eq!(lone.tokens(), &[addr(A)]);
        assert_eq!(lone.hops(), 0);
    }

    #[test]
    fn strict_rejects_trailing_chunk() {
        assert!(decode_swap_path_strict(&format!("{A}000bb8{B}")).is_ok());
        assert_eq!(
            decode_swap_path_strict(&format!("{A}000bb8{B}0001f4")),
            Err(SwapPathError::TrailingBytes(6))
        );
    }

    #[test]
    fn malformed_inputs_fail_fast() {
        assert_eq!(decode_swap_path("0x1234"), Err(SwapPathError::TooShort(4)));
        assert_eq!(decode_swap_path(""), Err(SwapPathError::TooShort(0)));

        let bad_first = format!("zz{}", &A[2..]);
        assert_eq!(decode_swap_path(&bad_first), Err(SwapPathError::InvalidHex(0)));

        let bad_hop = format!("{A}000bb8{}g", &B[..39]);
        assert_eq!(decode_swap_path(&bad_hop), Err(SwapPathError::InvalidHex(85)));

        assert!(matches!(
            decode_swap_path(&format!("{A}é")),
            Err(SwapPathError::InvalidHex(40))
        ));
    }

    #[test]
    fn decoding_is_deterministic() {
        let encoded = format!("0x{A}000bb8{B}0001f4{C}abc");
        assert_eq!(decode_swap_path(&encoded), decode_swap_path(&encoded));
    }
}
