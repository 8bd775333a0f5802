//! Attest capability: the wallet/SDK boundary behind a `Signer` trait.

use crate::entity::kind::Entity;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignError {
    #[error("user rejected signing")]
    Rejected,
    #[error("chain mismatch: entity expects {expected}, signer on {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("rpc: {0}")]
    Rpc(String),
}

/// Payload handed to the signer for one attestation.
#[derive(Clone, Debug, Serialize)]
pub struct AttestPayload {
    pub schema: &'static str,
    pub chain_id: u64,
    pub data: serde_json::Value,
    pub ref_uid: Option<String>,
    pub recipient: String,
    /// Present when revising an existing attestation.
    pub uid: Option<String>,
}

/// Result of a submitted attestation: tx hashes plus the attestation UID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub tx_hashes: Vec<String>,
    pub uid: String,
}

/// Wallet/SDK boundary: produces a signed, submitted attestation.
///
/// Implementations may suspend indefinitely waiting on user confirmation.
pub trait Signer: Send + Sync {
    fn address(&self) -> &str;
    fn chain_id(&self) -> u64;
    fn sign_attestation(
        &self,
        payload: &AttestPayload,
    ) -> impl Future<Output = Result<TxResult, SignError>> + Send;
}

impl Entity {
    /// Submit this entity as an attestation through `signer`.
    ///
    /// Fails with `ChainMismatch` before touching the wallet when the signer
    /// is on the wrong network; callers are expected to have switched chains
    /// already.
    pub async fn attest<S: Signer>(&self, signer: &S) -> Result<TxResult, SignError> {
        let expected = self.chain_id();
        let actual = signer.chain_id();
        if expected != actual {
            return Err(SignError::ChainMismatch { expected, actual });
        }
        let payload = AttestPayload {
            schema: self.schema_name(),
            chain_id: expected,
            data: serde_json::to_value(self).map_err(|e| SignError::Rpc(e.to_string()))?,
            ref_uid: self.ref_uid().map(str::to_string),
            recipient: self.recipient().to_string(),
            uid: self.uid().map(str::to_string),
        };
        signer.sign_attestation(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::kind::{CommunityData, Entity};

    struct StubSigner {
        chain_id: u64,
    }

    impl Signer for StubSigner {
        fn address(&self) -> &str {
            "0xsigner"
        }

        fn chain_id(&self) -> u64 {
            self.chain_id
        }

        async fn sign_attestation(&self, payload: &AttestPayload) -> Result<TxResult, SignError> {
            assert_eq!(payload.schema, "Community");
            Ok(TxResult {
                tx_hashes: vec!["0xhash".into()],
                uid: "0xuid".into(),
            })
        }
    }

    fn community(chain_id: u64) -> Entity {
        Entity::Community(CommunityData {
            chain_id,
            recipient: "0xowner".into(),
            name: "Optimism".into(),
            description: "community".into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn attest_checks_chain_before_signing() {
        let signer = StubSigner { chain_id: 1 };
        let err = community(10).attest(&signer).await.unwrap_err();
        assert!(matches!(
            err,
            SignError::ChainMismatch {
                expected: 10,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn attest_builds_payload_and_returns_tx() {
        let signer = StubSigner { chain_id: 10 };
        let tx = community(10).attest(&signer).await.unwrap();
        assert_eq!(tx.tx_hashes, vec!["0xhash".to_string()]);
        assert_eq!(tx.uid, "0xuid");
    }
}
