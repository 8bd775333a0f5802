//! SQLite journal of flow runs, keyed by content hash of the request.

use crate::entity::Entity;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// One settled flow run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// SHA-256 of the normalized request (entity + operation).
    pub key: String,
    pub entity_kind: String,
    pub entity_uid: Option<String>,
    pub tx_hash: Option<String>,
    pub chain_id: u64,
    pub operation: String,
    /// `indexed`, `exhausted`, `cancelled`, or `error`.
    pub outcome: String,
    pub attempts: u32,
    pub started_utc: i64,
    pub finished_utc: i64,
}

/// Append-only record of confirmation runs. Never on the flow's hot path for
/// correctness: writes that fail are logged and dropped by the caller.
pub struct Journal {
    conn: Mutex<Connection>,
}

impl Journal {
    /// Open or create the journal at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS flow_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                entity_uid TEXT,
                tx_hash TEXT,
                chain_id INTEGER NOT NULL,
                operation TEXT NOT NULL,
                outcome TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                started_utc INTEGER NOT NULL,
                finished_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flow_runs_started ON flow_runs(started_utc);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Content-hash key for a request: SHA-256 of its normalized JSON.
    pub fn key_for(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Key for an attestation request (entity payload + operation name).
    pub fn key_for_request(entity: &Entity, operation: &str) -> String {
        let normalized = serde_json::to_string(&serde_json::json!({
            "entity": entity,
            "operation": operation,
        }))
        .unwrap_or_default();
        Self::key_for(&normalized)
    }

    /// Append a settled run.
    pub fn record(&self, record: &FlowRecord) -> Result<(), JournalError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        conn.execute(
            "INSERT INTO flow_runs (key, entity_kind, entity_uid, tx_hash, chain_id, operation, outcome, attempts, started_utc, finished_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                record.key,
                record.entity_kind,
                record.entity_uid,
                record.tx_hash,
                record.chain_id,
                record.operation,
                record.outcome,
                record.attempts,
                record.started_utc,
                record.finished_utc,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<FlowRecord>, JournalError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT key, entity_kind, entity_uid, tx_hash, chain_id, operation, outcome, attempts, started_utc, finished_utc
             FROM flow_runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |r| {
            Ok(FlowRecord {
                key: r.get(0)?,
                entity_kind: r.get(1)?,
                entity_uid: r.get(2)?,
                tx_hash: r.get(3)?,
                chain_id: r.get(4)?,
                operation: r.get(5)?,
                outcome: r.get(6)?,
                attempts: r.get(7)?,
                started_utc: r.get(8)?,
                finished_utc: r.get(9)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CommunityData, Entity};
    use tempfile::NamedTempFile;

    fn sample(outcome: &str) -> FlowRecord {
        FlowRecord {
            key: Journal::key_for("req1"),
            entity_kind: "grant".into(),
            entity_uid: Some("0xuid".into()),
            tx_hash: Some("0xhash".into()),
            chain_id: 10,
            operation: "grant_create".into(),
            outcome: outcome.into(),
            attempts: 3,
            started_utc: 1_700_000_000,
            finished_utc: 1_700_000_005,
        }
    }

    #[test]
    fn key_deterministic() {
        assert_eq!(Journal::key_for("x"), Journal::key_for("x"));
        assert_eq!(Journal::key_for("x").len(), 64);
        assert_ne!(Journal::key_for("x"), Journal::key_for("y"));
    }

    #[test]
    fn request_key_varies_with_operation() {
        let entity = Entity::Community(CommunityData {
            chain_id: 10,
            recipient: "0xowner".into(),
            name: "c".into(),
            description: "d".into(),
            ..Default::default()
        });
        let a = Journal::key_for_request(&entity, "community_create");
        let b = Journal::key_for_request(&entity, "community_update");
        assert_ne!(a, b);
    }

    #[test]
    fn record_and_recent_roundtrip() {
        let tmp = NamedTempFile::new().unwrap();
        let journal = Journal::open(tmp.path()).unwrap();
        journal.record(&sample("indexed")).unwrap();
        journal.record(&sample("exhausted")).unwrap();
        let recent = journal.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        // Newest first.
        assert_eq!(recent[0].outcome, "exhausted");
        assert_eq!(recent[1], sample("indexed"));
    }

    #[test]
    fn recent_respects_limit() {
        let tmp = NamedTempFile::new().unwrap();
        let journal = Journal::open(tmp.path()).unwrap();
        for _ in 0..5 {
            journal.record(&sample("indexed")).unwrap();
        }
        assert_eq!(journal.recent(2).unwrap().len(), 2);
    }
}
