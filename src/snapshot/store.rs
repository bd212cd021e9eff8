//! Schema Snapshot Store
//!
//! File-based, append-only history of schemas. Every successful diff run
//! leaves one `Schema<versionId>` file behind; the one with the highest
//! version is the baseline for the next comparison. Other files in the
//! directory, including `Schema*` names without a valid version, are skipped.

use crate::error::{DriftError, DriftResult};
use crate::schema::Schema;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory below the migrations directory holding the snapshots
pub const SNAPSHOT_DIR: &str = "SchemaVersion";

/// File name prefix of every snapshot
pub const SNAPSHOT_PREFIX: &str = "Schema";

/// Envelope layout written by this version of the tool
pub const FORMAT_VERSION: u32 = 1;

const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{14}$").unwrap());

/// Fixed-width UTC timestamp identifying a snapshot and its migration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(String);

impl VersionId {
    /// Validate a `YYYYMMDDHHMMSS` identifier
    pub fn parse(value: &str) -> DriftResult<Self> {
        if !VERSION_RE.is_match(value) || Self::timestamp(value).is_none() {
            return Err(DriftError::Configuration(format!(
                "Invalid version id '{}', expected YYYYMMDDHHMMSS",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(VERSION_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id one second later
    pub fn successor(&self) -> Self {
        match Self::timestamp(&self.0) {
            Some(ts) => Self((ts + Duration::seconds(1)).format(VERSION_FORMAT).to_string()),
            None => Self(self.0.clone()),
        }
    }

    fn timestamp(value: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value, VERSION_FORMAT).ok()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk representation of a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
    pub format_version: u32,
    pub version: String,
    pub captured_at: DateTime<Utc>,
    pub checksum: String,
    pub schema: Schema,
}

impl SnapshotEnvelope {
    pub fn new(schema: Schema, version: &VersionId, captured_at: DateTime<Utc>) -> DriftResult<Self> {
        let checksum = compute_checksum(&schema)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            version: version.to_string(),
            captured_at,
            checksum,
            schema,
        })
    }
}

/// SHA-256 over the canonical JSON of a schema
pub fn compute_checksum(schema: &Schema) -> DriftResult<String> {
    let canonical = serde_json::to_vec(schema)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Store for versioned schema snapshots in one directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `<migrations_dir>/SchemaVersion`
    pub fn for_migrations_dir(migrations_dir: impl AsRef<Path>) -> Self {
        Self::new(migrations_dir.as_ref().join(SNAPSHOT_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> DriftResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| DriftError::io(&self.dir, e))
    }

    /// Snapshot files keyed by version, oldest first. Only `Schema<versionId>`
    /// names count; anything else in the directory is ignored.
    fn snapshot_files(&self) -> DriftResult<Vec<(VersionId, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| DriftError::io(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DriftError::io(&self.dir, e))?;
            let file_type = entry.file_type().map_err(|e| DriftError::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(suffix) = name.strip_prefix(SNAPSHOT_PREFIX) else {
                continue;
            };
            match VersionId::parse(suffix) {
                Ok(version) => files.push((version, entry.path())),
                Err(_) => warn!("Ignoring snapshot with unexpected name {}", entry.path().display()),
            }
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// The most recent schema, or an empty one when no snapshot exists yet
    pub fn load_latest(&self) -> DriftResult<Schema> {
        self.ensure_dir()?;

        match self.snapshot_files()?.last() {
            None => {
                info!("No schema snapshot in {}, starting from an empty schema", self.dir.display());
                Ok(Schema::new())
            }
            Some((_, path)) => {
                let schema = Self::read_snapshot(path)?;
                info!("Loaded schema snapshot {} ({} tables)", path.display(), schema.len());
                Ok(schema)
            }
        }
    }

    /// Load the snapshot stored under a specific version
    pub fn load(&self, version: &VersionId) -> DriftResult<Schema> {
        Self::read_snapshot(&self.path_for(version))
    }

    fn read_snapshot(path: &Path) -> DriftResult<Schema> {
        let content = fs::read(path).map_err(|e| DriftError::io(path, e))?;
        let envelope: SnapshotEnvelope = serde_json::from_slice(&content)
            .map_err(|e| DriftError::corrupt(path, e.to_string()))?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(DriftError::corrupt(
                path,
                format!("unsupported format version {}", envelope.format_version),
            ));
        }

        let checksum = compute_checksum(&envelope.schema)?;
        if checksum != envelope.checksum {
            return Err(DriftError::corrupt(
                path,
                format!("checksum mismatch (stored {}, computed {})", envelope.checksum, checksum),
            ));
        }

        Ok(envelope.schema)
    }

    fn path_for(&self, version: &VersionId) -> PathBuf {
        self.dir.join(format!("{}{}", SNAPSHOT_PREFIX, version))
    }

    /// Persist `schema` as `Schema<version>`, replacing an existing file atomically
    pub fn save(&self, schema: &Schema, version: &VersionId) -> DriftResult<PathBuf> {
        self.ensure_dir()?;

        let envelope = SnapshotEnvelope::new(schema.clone(), version, Utc::now())?;
        let content = serde_json::to_vec_pretty(&envelope)?;

        let path = self.path_for(version);
        let tmp = self.dir.join(format!(".{}{}.tmp", SNAPSHOT_PREFIX, version));
        fs::write(&tmp, &content).map_err(|e| DriftError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(DriftError::io(&path, e));
        }

        info!(
            "Saved schema snapshot {} for version {}: {} tables",
            path.display(),
            version,
            schema.len()
        );

        Ok(path)
    }

    /// Versions of all stored snapshots, oldest first
    pub fn list_versions(&self) -> DriftResult<Vec<VersionId>> {
        Ok(self
            .snapshot_files()?
            .into_iter()
            .map(|(version, _)| version)
            .collect())
    }

    pub fn latest_version(&self) -> DriftResult<Option<VersionId>> {
        Ok(self.list_versions()?.pop())
    }

    /// Version id for a snapshot taken at `now`, strictly after every stored one
    pub fn next_version(&self, now: DateTime<Utc>) -> DriftResult<VersionId> {
        let candidate = VersionId::from_datetime(now);
        let next = match self.latest_version()? {
            Some(latest) if candidate <= latest => latest.successor(),
            _ => candidate,
        };
        debug!("Next schema version: {}", next);
        Ok(next)
    }
}
