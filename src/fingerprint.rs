//! Directory tree fingerprinting.
//!
//! Walks a root directory and produces a [`Manifest`] of per-file content
//! hashes. The policy per entry:
//!
//! | Entry | Action |
//! |-------|--------|
//! | Directory | descend, never recorded |
//! | Symbolic link | skipped, not followed, logged at debug |
//! | Regular file | hashed; omitted (and logged) if the read fails |
//! | Non-UTF-8 name | omitted, logged at debug |
//! | Listing failure | whole scan fails with [`FingerprintError::Traversal`] |
//!
//! Enumeration is sequential. Hashing is fanned out over a bounded
//! [`rayon`] pool and the results are sorted by relative path, so the
//! manifest is identical regardless of worker scheduling.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{FingerprintError, ReadError};
use crate::hasher::{ContentHasher, Sha256Hasher};
use crate::models::{FileRecord, Manifest};

/// Default size of the hashing pool.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Construction values for a [`TreeFingerprinter`].
#[derive(Debug, Clone)]
pub struct FingerprintOptions {
    /// Maximum number of files hashed at the same time.
    pub concurrency: usize,
    /// Globs matched against the `/`-separated relative path. Matching
    /// files are left out of the manifest.
    pub exclude_globs: Vec<String>,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            exclude_globs: Vec::new(),
        }
    }
}

/// Walks a tree and hashes every regular file in it.
pub struct TreeFingerprinter<H = Sha256Hasher> {
    hasher: H,
    pool: rayon::ThreadPool,
    exclude: Option<GlobSet>,
}

impl TreeFingerprinter<Sha256Hasher> {
    pub fn new(options: &FingerprintOptions) -> Result<Self, FingerprintError> {
        Self::with_hasher(Sha256Hasher, options)
    }
}

struct Candidate {
    path: PathBuf,
    relative: String,
}

impl<H: ContentHasher> TreeFingerprinter<H> {
    pub fn with_hasher(hasher: H, options: &FingerprintOptions) -> Result<Self, FingerprintError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.concurrency.max(1))
            .thread_name(|i| format!("kvf-hash-{}", i))
            .build()?;

        let exclude = if options.exclude_globs.is_empty() {
            None
        } else {
            Some(build_globset(&options.exclude_globs)?)
        };

        Ok(Self {
            hasher,
            pool,
            exclude,
        })
    }

    /// Scans `root` and returns its manifest.
    pub fn scan(&self, root: &Path) -> Result<Manifest, FingerprintError> {
        self.scan_with_cancel(root, &CancellationToken::new())
    }

    /// Like [`scan`](Self::scan), aborting with
    /// [`FingerprintError::Cancelled`] once `cancel` fires.
    pub fn scan_with_cancel(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<Manifest, FingerprintError> {
        validate_root(root)?;

        let mut candidates = Vec::new();
        let mut symlinks_skipped = 0usize;
        let mut non_utf8 = 0usize;

        for entry in WalkDir::new(root).follow_links(false) {
            if cancel.is_cancelled() {
                return Err(FingerprintError::Cancelled);
            }

            let entry = entry.map_err(|source| FingerprintError::Traversal {
                path: source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf()),
                source,
            })?;

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if file_type.is_symlink() {
                symlinks_skipped += 1;
                debug!(
                    op = "fingerprint.symlink.skipped",
                    path = %entry.path().display(),
                    "skipping symbolic link"
                );
                continue;
            }
            if !file_type.is_file() {
                // sockets, fifos, devices
                continue;
            }

            let relative = match relative_key(root, entry.path()) {
                Some(relative) => relative,
                None => {
                    non_utf8 += 1;
                    debug!(
                        op = "fingerprint.path.non_utf8",
                        path = %entry.path().display(),
                        "omitting file whose path is not valid UTF-8"
                    );
                    continue;
                }
            };
            if let Some(exclude) = &self.exclude {
                if exclude.is_match(&relative) {
                    continue;
                }
            }

            candidates.push(Candidate {
                path: entry.into_path(),
                relative,
            });
        }

        let results: Vec<Result<FileRecord, ReadError>> = self.pool.install(|| {
            candidates
                .par_iter()
                .filter(|_| !cancel.is_cancelled())
                .map(|c| self.record_for(c))
                .collect()
        });

        if cancel.is_cancelled() {
            return Err(FingerprintError::Cancelled);
        }

        let mut records = Vec::with_capacity(results.len());
        let mut unreadable = 0usize;
        for result in results {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    unreadable += 1;
                    debug!(
                        op = "fingerprint.file.unreadable",
                        path = %e.path.display(),
                        error = %e.source,
                        "omitting file from manifest"
                    );
                }
            }
        }

        let manifest = Manifest::from_records(records);
        info!(
            op = "fingerprint.done",
            root = %root.display(),
            files = manifest.len(),
            symlinks_skipped,
            unreadable,
            non_utf8,
            "processed {} files",
            manifest.len()
        );

        Ok(manifest)
    }

    fn record_for(&self, candidate: &Candidate) -> Result<FileRecord, ReadError> {
        let metadata = std::fs::symlink_metadata(&candidate.path).map_err(|source| ReadError {
            path: candidate.path.clone(),
            source,
        })?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let content_hash = self.hasher.hash_file(&candidate.path)?;

        Ok(FileRecord {
            relative_path: candidate.relative.clone(),
            content_hash,
            modified_at: DateTime::<Utc>::from(modified),
        })
    }
}

fn validate_root(root: &Path) -> Result<(), FingerprintError> {
    let invalid = |reason: &str| FingerprintError::InvalidRoot {
        path: root.to_path_buf(),
        reason: reason.to_string(),
    };

    if root.as_os_str().is_empty() {
        return Err(invalid("root path is empty"));
    }
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(invalid("not a directory")),
        Err(e) => Err(invalid(&e.to_string())),
    }
}

/// Relative path of `path` under `root`, joined with `/` on every platform.
///
/// `None` when any component is not valid UTF-8; such names have no
/// unambiguous manifest form.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str()?);
        }
    }
    Some(parts.join("/"))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
