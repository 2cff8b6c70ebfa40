//! Publication ledger.
//!
//! Remembers what a pipeline instance has already pushed so a retried
//! publish stage skips platforms that accepted the post the first time.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A post the ledger has seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Platform the post went to.
    pub platform: String,
    /// Id returned by the platform.
    pub remote_id: String,
    /// When it was recorded (ISO 8601).
    pub recorded_at: String,
}

/// Publication keys mapped to their remote post ids.
#[derive(Debug, Default)]
pub struct PublishLedger {
    entries: DashMap<String, LedgerEntry>,
}

impl PublishLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for publishing `artifact_uri` to `platform` within `run_id`.
    #[must_use]
    pub fn key(run_id: Uuid, platform: &str, artifact_uri: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(run_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(platform.as_bytes());
        hasher.update(b"\0");
        hasher.update(artifact_uri.as_bytes());
        format!("pub:{}", hex::encode(&hasher.finalize()[..16]))
    }

    /// Remote id of an earlier publication under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<LedgerEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Records a publication.
    pub fn record(&self, key: String, platform: &str, remote_id: &str) {
        self.entries.insert(
            key,
            LedgerEntry {
                platform: platform.to_string(),
                remote_id: remote_id.to_string(),
                recorded_at: crate::utils::iso_timestamp(),
            },
        );
    }

    /// Returns the number of publications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_distinct() {
        let run = Uuid::new_v4();
        let a = PublishLedger::key(run, "instagram", "final.mp4");
        assert_eq!(a, PublishLedger::key(run, "instagram", "final.mp4"));
        assert_ne!(a, PublishLedger::key(run, "tiktok", "final.mp4"));
        assert_ne!(a, PublishLedger::key(Uuid::new_v4(), "instagram", "final.mp4"));
        assert!(a.starts_with("pub:"));
        assert_eq!(a.len(), 4 + 32);
    }

    #[test]
    fn test_record_and_get() {
        let ledger = PublishLedger::new();
        let key = PublishLedger::key(Uuid::new_v4(), "instagram", "a.png");
        assert!(ledger.get(&key).is_none());

        ledger.record(key.clone(), "instagram", "ig-1");
        assert_eq!(ledger.get(&key).map(|e| e.remote_id), Some("ig-1".to_string()));
        assert_eq!(ledger.len(), 1);
    }
}
