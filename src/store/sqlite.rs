use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::db;
use crate::error::AppError;
use crate::feed::{AttendanceChange, AttendanceSubscription, ChangeFeed};
use crate::models::{
    ArtifactFields, AttendanceRecord, AttendanceWithSession, ClassSession, CodeArtifact,
    CodeVersionSnapshot, NewArtifact, NewAttendance, SessionSummary,
};
use crate::roster::RosterView;
use crate::store::{ArtifactFilter, ClassroomStore, InsertOutcome};
use crate::versions::Revision;

/// Production store: SQLite through sqlx, with change notifications published
/// after each committed attendance write.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    feed: ChangeFeed,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[rocket::async_trait]
impl ClassroomStore for SqliteStore {
    async fn get_active_session(&self) -> Result<Option<ClassSession>, AppError> {
        db::get_active_session(&self.pool).await
    }

    async fn find_session_by_code(&self, code: &str) -> Result<Option<ClassSession>, AppError> {
        db::find_session_by_code(&self.pool, code).await
    }

    async fn get_session(&self, id: i64) -> Result<ClassSession, AppError> {
        db::get_session(&self.pool, id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AppError> {
        db::list_sessions(&self.pool).await
    }

    async fn count_sessions(&self) -> Result<i64, AppError> {
        db::count_sessions(&self.pool).await
    }

    async fn create_session(
        &self,
        week_number: i64,
        title: &str,
        session_code: &str,
    ) -> Result<ClassSession, AppError> {
        db::create_session(&self.pool, week_number, title, session_code).await
    }

    async fn end_session(&self, id: i64) -> Result<(), AppError> {
        db::end_session(&self.pool, id).await
    }

    async fn delete_session(&self, id: i64) -> Result<(), AppError> {
        db::delete_session(&self.pool, id).await
    }

    async fn find_attendance(
        &self,
        session_id: i64,
        student_email: &str,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        db::find_attendance(&self.pool, session_id, student_email).await
    }

    async fn count_attendance(&self, session_id: i64) -> Result<i64, AppError> {
        db::count_attendance(&self.pool, session_id).await
    }

    #[instrument(skip(self, new), fields(session_id = new.session_id))]
    async fn insert_attendance(&self, new: NewAttendance) -> Result<InsertOutcome, AppError> {
        match db::insert_attendance(&self.pool, &new).await {
            Ok(record) => {
                let delivered = self.feed.publish(AttendanceChange::Inserted(record.clone()));
                info!(record_id = record.id, delivered, "Published attendance insert");
                Ok(InsertOutcome::Inserted(record))
            }
            Err(err) if err.is_unique_violation() => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err),
        }
    }

    async fn list_attendance(
        &self,
        session_id: i64,
        view: RosterView,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        db::list_attendance(&self.pool, session_id, view).await
    }

    async fn list_all_attendance(&self) -> Result<Vec<AttendanceWithSession>, AppError> {
        db::list_all_attendance(&self.pool).await
    }

    async fn attendance_for_email(
        &self,
        student_email: &str,
    ) -> Result<Vec<AttendanceWithSession>, AppError> {
        db::attendance_for_email(&self.pool, student_email).await
    }

    async fn update_attendance_points(
        &self,
        record_id: i64,
        points: i64,
    ) -> Result<AttendanceRecord, AppError> {
        let record = db::update_attendance_points(&self.pool, record_id, points).await?;
        self.feed.publish(AttendanceChange::Updated(record.clone()));
        Ok(record)
    }

    fn subscribe_attendance(&self, session_id: i64) -> AttendanceSubscription {
        self.feed.subscribe(session_id)
    }

    async fn create_artifact(&self, new: NewArtifact) -> Result<CodeArtifact, AppError> {
        db::create_artifact(&self.pool, &new).await
    }

    async fn get_artifact(&self, id: i64) -> Result<CodeArtifact, AppError> {
        db::get_artifact(&self.pool, id).await
    }

    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<CodeArtifact>, AppError> {
        let artifacts = db::list_artifacts(&self.pool).await?;
        Ok(artifacts.into_iter().filter(|a| filter.matches(a)).collect())
    }

    async fn save_artifact_with_history(
        &self,
        id: i64,
        fields: ArtifactFields,
        change_summary: Option<String>,
    ) -> Result<i64, AppError> {
        let current = db::get_artifact(&self.pool, id).await?;
        let revision = Revision::plan(&current, fields, change_summary);
        db::apply_revision(&self.pool, &revision).await
    }

    async fn list_versions(&self, artifact_id: i64) -> Result<Vec<CodeVersionSnapshot>, AppError> {
        db::list_versions(&self.pool, artifact_id).await
    }
}
