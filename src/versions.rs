use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::diff::{self, DiffLine};
use crate::error::AppError;
use crate::models::{ArtifactFields, CodeArtifact, CodeVersionSnapshot, FileKind};
use crate::store::ClassroomStore;

pub const DEFAULT_CHANGE_SUMMARY: &str = "Version saved automatically";

/// The two writes of a save, in the order they must be applied: first the
/// snapshot of what the artifact looked like at `snapshot_version`, then the
/// live update to `new_version`.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub artifact_id: i64,
    pub snapshot_version: i64,
    pub snapshot_fields: ArtifactFields,
    pub change_summary: Option<String>,
    pub fields: ArtifactFields,
    pub new_version: i64,
}

impl Revision {
    pub fn plan(artifact: &CodeArtifact, fields: ArtifactFields, change_summary: Option<String>) -> Self {
        let change_summary = change_summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| Some(DEFAULT_CHANGE_SUMMARY.to_string()));

        Self {
            artifact_id: artifact.id,
            snapshot_version: artifact.version_number,
            snapshot_fields: artifact.fields.clone(),
            change_summary,
            fields,
            new_version: artifact.version_number + 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionEntry {
    pub version_number: i64,
    pub fields: ArtifactFields,
    pub change_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_latest: bool,
}

impl From<CodeVersionSnapshot> for VersionEntry {
    fn from(snapshot: CodeVersionSnapshot) -> Self {
        Self {
            version_number: snapshot.version_number,
            fields: snapshot.fields,
            change_summary: snapshot.change_summary,
            created_at: snapshot.created_at,
            is_latest: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionHistory {
    pub artifact_id: i64,
    pub latest: VersionEntry,
    /// Stored snapshots, newest first.
    pub snapshots: Vec<VersionEntry>,
}

impl VersionHistory {
    fn build(artifact: CodeArtifact, snapshots: Vec<CodeVersionSnapshot>) -> Self {
        // The live row stands in for one version past the newest snapshot.
        let latest_number = snapshots
            .iter()
            .map(|s| s.version_number)
            .max()
            .map(|max| max + 1)
            .unwrap_or(artifact.version_number);

        Self {
            artifact_id: artifact.id,
            latest: VersionEntry {
                version_number: latest_number,
                fields: artifact.fields,
                change_summary: None,
                created_at: artifact.updated_at,
                is_latest: true,
            },
            snapshots: snapshots.into_iter().map(VersionEntry::from).collect(),
        }
    }

    pub fn get(&self, version_number: i64) -> Option<&VersionEntry> {
        if version_number == self.latest.version_number {
            return Some(&self.latest);
        }
        self.snapshots
            .iter()
            .find(|s| s.version_number == version_number)
    }

    /// The most recent stored snapshot, or the live version when none exist.
    pub fn previous(&self) -> &VersionEntry {
        self.snapshots.first().unwrap_or(&self.latest)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionComparison {
    pub artifact_id: i64,
    pub file: FileKind,
    pub from_version: i64,
    pub to_version: i64,
    pub lines: Vec<DiffLine>,
}

pub struct VersionLedger<'a> {
    store: &'a dyn ClassroomStore,
}

impl<'a> VersionLedger<'a> {
    pub fn new(store: &'a dyn ClassroomStore) -> Self {
        Self { store }
    }

    #[instrument(skip(self, fields))]
    pub async fn save_with_history(
        &self,
        artifact_id: i64,
        fields: ArtifactFields,
        change_summary: Option<String>,
    ) -> Result<i64, AppError> {
        let version = self
            .store
            .save_artifact_with_history(artifact_id, fields, change_summary)
            .await?;
        info!(artifact_id, version, "Saved artifact with history");
        Ok(version)
    }

    #[instrument(skip(self))]
    pub async fn history(&self, artifact_id: i64) -> Result<VersionHistory, AppError> {
        let artifact = self.store.get_artifact(artifact_id).await?;
        let snapshots = self.store.list_versions(artifact_id).await?;
        Ok(VersionHistory::build(artifact, snapshots))
    }

    /// Diffs one file between two versions. `to` defaults to the live
    /// version and `from` to the newest snapshot.
    #[instrument(skip(self))]
    pub async fn compare(
        &self,
        artifact_id: i64,
        file: FileKind,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<VersionComparison, AppError> {
        let history = self.history(artifact_id).await?;

        let from_entry = match from {
            Some(v) => history.get(v).ok_or_else(|| missing_version(artifact_id, v))?,
            None => history.previous(),
        };
        let to_entry = match to {
            Some(v) => history.get(v).ok_or_else(|| missing_version(artifact_id, v))?,
            None => &history.latest,
        };

        Ok(VersionComparison {
            artifact_id,
            file,
            from_version: from_entry.version_number,
            to_version: to_entry.version_number,
            lines: diff::diff(from_entry.fields.file(file), to_entry.fields.file(file)),
        })
    }
}

fn missing_version(artifact_id: i64, version: i64) -> AppError {
    AppError::NotFound(format!(
        "Version {} of artifact {} not found",
        version, artifact_id
    ))
}
