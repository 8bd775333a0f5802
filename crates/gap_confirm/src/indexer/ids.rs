//! Validation of 32-byte hex identifiers (attestation UIDs, tx hashes).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdError {
    #[error("invalid uid: {0}")]
    InvalidUid(String),
    #[error("invalid tx hash: {0}")]
    InvalidTxHash(String),
}

fn parse_bytes32(s: &str) -> Option<String> {
    let s = s.trim();
    let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if body.len() != 64 || hex::decode(body).is_err() {
        return None;
    }
    Some(format!("0x{}", body.to_lowercase()))
}

/// Parse an attestation UID (`0x` + 64 hex chars), normalized to lowercase.
pub fn parse_uid(s: &str) -> Result<String, IdError> {
    parse_bytes32(s).ok_or_else(|| IdError::InvalidUid(s.to_string()))
}

/// Parse a transaction hash (`0x` + 64 hex chars), normalized to lowercase.
pub fn parse_tx_hash(s: &str) -> Result<String, IdError> {
    parse_bytes32(s).ok_or_else(|| IdError::InvalidTxHash(s.to_string()))
}

/// Shorten an identifier for log lines: `0xabcd…ef01`.
pub fn short(id: &str) -> String {
    if id.len() > 12 {
        format!("{}…{}", &id[..6], &id[id.len() - 4..])
    } else {
        id.to_string()
    }
}
