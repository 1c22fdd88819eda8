//! Core data models used throughout kvfetch.
//!
//! These types describe the fingerprint of a build-output tree and the
//! inputs and outcome of a single cache retrieval.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::TransportFailure;

/// SHA-256 digest of a file's byte content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// One regular file discovered under a scan root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Path relative to the scan root, `/`-separated.
    #[serde(rename = "path")]
    pub relative_path: String,
    #[serde(rename = "hash")]
    pub content_hash: ContentDigest,
    /// Advisory only; never part of a record's identity.
    #[serde(rename = "modTime")]
    pub modified_at: DateTime<Utc>,
}

/// Per-file content hashes for a directory tree, sorted by relative path.
///
/// Built fresh by every scan and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    records: Vec<FileRecord>,
}

impl Manifest {
    /// Sorts `records` by path. Paths come from distinct walk entries, so
    /// no two records share one.
    pub(crate) fn from_records(mut records: Vec<FileRecord>) -> Self {
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        debug_assert!(records
            .windows(2)
            .all(|w| w[0].relative_path != w[1].relative_path));
        Self { records }
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up a record by its relative path.
    pub fn get(&self, relative_path: &str) -> Option<&FileRecord> {
        self.records
            .binary_search_by(|r| r.relative_path.as_str().cmp(relative_path))
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.relative_path.as_str())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a FileRecord;
    type IntoIter = std::slice::Iter<'a, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Opaque bearer token attached to outbound requests.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccessCredential(String);

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("AccessCredential(<empty>)")
        } else {
            f.write_str("AccessCredential(<redacted>)")
        }
    }
}

/// Inputs for one download. Built per call and not reused.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub endpoint: String,
    pub cache_key: String,
    pub credential: AccessCredential,
    pub destination: PathBuf,
}

impl RetrievalRequest {
    pub fn new(
        endpoint: impl Into<String>,
        cache_key: impl Into<String>,
        credential: AccessCredential,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            cache_key: cache_key.into(),
            credential,
            destination: destination.into(),
        }
    }
}

/// Terminal result of one retrieval attempt.
///
/// On anything other than `Success` the destination contents are undefined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    Success { bytes_written: u64 },
    NotFound,
    TransportFailure(TransportFailure),
}

impl RetrievalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetrievalOutcome::Success { .. })
    }
}
