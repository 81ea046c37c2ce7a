//! Data-access interface shared by the check-in engine, the roster feed, the
//! version ledger and the HTTP handlers.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use crate::error::AppError;
use crate::feed::AttendanceSubscription;
use crate::models::{
    ArtifactFields, ArtifactKind, AttendanceRecord, AttendanceWithSession, ClassSession,
    CodeArtifact, CodeVersionSnapshot, NewArtifact, NewAttendance, SessionSummary,
};
use crate::roster::RosterView;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type SharedStore = Arc<dyn ClassroomStore>;

/// Result of an attendance insert. `Conflict` means the (session, email)
/// pair already has a row.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(AttendanceRecord),
    Conflict,
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub kind: Option<ArtifactKind>,
    pub week_number: Option<i64>,
    pub student_email: Option<String>,
}

impl ArtifactFilter {
    pub fn matches(&self, artifact: &CodeArtifact) -> bool {
        self.kind.is_none_or(|kind| artifact.kind == kind)
            && self
                .week_number
                .is_none_or(|week| artifact.week_number == Some(week))
            && self.student_email.as_deref().is_none_or(|email| {
                artifact
                    .student_email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
    }
}

#[rocket::async_trait]
pub trait ClassroomStore: Send + Sync {
    async fn get_active_session(&self) -> Result<Option<ClassSession>, AppError>;

    async fn find_session_by_code(&self, code: &str) -> Result<Option<ClassSession>, AppError>;

    async fn get_session(&self, id: i64) -> Result<ClassSession, AppError>;

    /// Newest first, with attendance counts.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AppError>;

    async fn count_sessions(&self) -> Result<i64, AppError>;

    /// Deactivates any active session before inserting the new active one.
    /// Fails with `AppError::Conflict` when `session_code` is taken.
    async fn create_session(
        &self,
        week_number: i64,
        title: &str,
        session_code: &str,
    ) -> Result<ClassSession, AppError>;

    async fn end_session(&self, id: i64) -> Result<(), AppError>;

    /// Removes the session and every attendance row that belongs to it.
    async fn delete_session(&self, id: i64) -> Result<(), AppError>;

    async fn find_attendance(
        &self,
        session_id: i64,
        student_email: &str,
    ) -> Result<Option<AttendanceRecord>, AppError>;

    async fn count_attendance(&self, session_id: i64) -> Result<i64, AppError>;

    async fn insert_attendance(&self, new: NewAttendance) -> Result<InsertOutcome, AppError>;

    async fn list_attendance(
        &self,
        session_id: i64,
        view: RosterView,
    ) -> Result<Vec<AttendanceRecord>, AppError>;

    /// Every record joined with its session, ordered by session then arrival.
    async fn list_all_attendance(&self) -> Result<Vec<AttendanceWithSession>, AppError>;

    /// Newest first.
    async fn attendance_for_email(
        &self,
        student_email: &str,
    ) -> Result<Vec<AttendanceWithSession>, AppError>;

    /// Instructor correction of a single record's points.
    async fn update_attendance_points(
        &self,
        record_id: i64,
        points: i64,
    ) -> Result<AttendanceRecord, AppError>;

    fn subscribe_attendance(&self, session_id: i64) -> AttendanceSubscription;

    async fn create_artifact(&self, new: NewArtifact) -> Result<CodeArtifact, AppError>;

    async fn get_artifact(&self, id: i64) -> Result<CodeArtifact, AppError>;

    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<CodeArtifact>, AppError>;

    /// Snapshots the current fields, then applies `fields` and bumps the
    /// version. Returns the new version number.
    async fn save_artifact_with_history(
        &self,
        id: i64,
        fields: ArtifactFields,
        change_summary: Option<String>,
    ) -> Result<i64, AppError>;

    /// Newest first.
    async fn list_versions(&self, artifact_id: i64) -> Result<Vec<CodeVersionSnapshot>, AppError>;
}
