use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::debug;

use crate::error::AppError;
use crate::feed::{AttendanceChange, AttendanceSubscription, ChangeFeed};
use crate::models::{
    ArtifactFields, AttendanceRecord, AttendanceWithSession, ClassSession, CodeArtifact,
    CodeVersionSnapshot, NewArtifact, NewAttendance, SessionSummary,
};
use crate::roster::RosterView;
use crate::store::{ArtifactFilter, ClassroomStore, InsertOutcome};
use crate::versions::Revision;

#[derive(Default)]
struct State {
    sessions: Vec<ClassSession>,
    attendance: Vec<AttendanceRecord>,
    artifacts: Vec<CodeArtifact>,
    versions: Vec<CodeVersionSnapshot>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn session(&self, id: i64) -> Result<&ClassSession, AppError> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Session with id {} not found", id)))
    }

    fn artifact(&self, id: i64) -> Result<&CodeArtifact, AppError> {
        self.artifacts
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Code artifact with id {} not found", id)))
    }

    fn joined(&self, record: &AttendanceRecord) -> Option<AttendanceWithSession> {
        self.sessions
            .iter()
            .find(|s| s.id == record.session_id)
            .map(|session| AttendanceWithSession {
                record: record.clone(),
                session: session.clone(),
            })
    }
}

/// Store kept entirely in process memory. Applies the same uniqueness and
/// ordering rules as [`SqliteStore`](super::SqliteStore); used by tests.
pub struct MemoryStore {
    state: Mutex<State>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            state: Mutex::new(State::default()),
            feed,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(ChangeFeed::default())
    }
}

#[rocket::async_trait]
impl ClassroomStore for MemoryStore {
    async fn get_active_session(&self) -> Result<Option<ClassSession>, AppError> {
        let state = self.lock()?;
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.is_active)
            .max_by_key(|s| (s.started_at, s.id))
            .cloned())
    }

    async fn find_session_by_code(&self, code: &str) -> Result<Option<ClassSession>, AppError> {
        let state = self.lock()?;
        Ok(state
            .sessions
            .iter()
            .find(|s| s.session_code == code)
            .cloned())
    }

    async fn get_session(&self, id: i64) -> Result<ClassSession, AppError> {
        self.lock()?.session(id).cloned()
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AppError> {
        let state = self.lock()?;
        let mut summaries: Vec<SessionSummary> = state
            .sessions
            .iter()
            .map(|session| SessionSummary {
                session: session.clone(),
                attendance_count: state
                    .attendance
                    .iter()
                    .filter(|r| r.session_id == session.id)
                    .count() as i64,
            })
            .collect();
        summaries.sort_by(|a, b| {
            (b.session.started_at, b.session.id).cmp(&(a.session.started_at, a.session.id))
        });
        Ok(summaries)
    }

    async fn count_sessions(&self) -> Result<i64, AppError> {
        Ok(self.lock()?.sessions.len() as i64)
    }

    async fn create_session(
        &self,
        week_number: i64,
        title: &str,
        session_code: &str,
    ) -> Result<ClassSession, AppError> {
        let mut state = self.lock()?;
        if state.sessions.iter().any(|s| s.session_code == session_code) {
            return Err(AppError::Conflict(format!(
                "Session code {} is already in use",
                session_code
            )));
        }

        let now = Utc::now();
        for session in state.sessions.iter_mut().filter(|s| s.is_active) {
            session.is_active = false;
            session.ended_at = Some(now);
        }

        let session = ClassSession {
            id: state.next_id(),
            session_code: session_code.to_string(),
            week_number,
            title: title.to_string(),
            is_active: true,
            started_at: now,
            ended_at: None,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn end_session(&self, id: i64) -> Result<(), AppError> {
        let mut state = self.lock()?;
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Session with id {} not found", id)))?;
        session.is_active = false;
        session.ended_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn delete_session(&self, id: i64) -> Result<(), AppError> {
        let mut state = self.lock()?;
        state.session(id)?;
        state.sessions.retain(|s| s.id != id);
        state.attendance.retain(|r| r.session_id != id);
        Ok(())
    }

    async fn find_attendance(
        &self,
        session_id: i64,
        student_email: &str,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        let state = self.lock()?;
        Ok(state
            .attendance
            .iter()
            .find(|r| r.session_id == session_id && r.student_email == student_email)
            .cloned())
    }

    async fn count_attendance(&self, session_id: i64) -> Result<i64, AppError> {
        let state = self.lock()?;
        Ok(state
            .attendance
            .iter()
            .filter(|r| r.session_id == session_id)
            .count() as i64)
    }

    async fn insert_attendance(&self, new: NewAttendance) -> Result<InsertOutcome, AppError> {
        let record = {
            let mut state = self.lock()?;
            state.session(new.session_id)?;
            if state
                .attendance
                .iter()
                .any(|r| r.session_id == new.session_id && r.student_email == new.student_email)
            {
                return Ok(InsertOutcome::Conflict);
            }

            let record = AttendanceRecord {
                id: state.next_id(),
                session_id: new.session_id,
                student_name: new.student_name,
                student_email: new.student_email,
                student_id: new.student_id,
                checked_in_at: Utc::now(),
                points: new.points,
            };
            state.attendance.push(record.clone());
            record
        };

        let delivered = self.feed.publish(AttendanceChange::Inserted(record.clone()));
        debug!(record_id = record.id, delivered, "Published attendance insert");
        Ok(InsertOutcome::Inserted(record))
    }

    async fn list_attendance(
        &self,
        session_id: i64,
        view: RosterView,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let state = self.lock()?;
        let mut records: Vec<AttendanceRecord> = state
            .attendance
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();

        match view {
            RosterView::Panel => {
                records.sort_by(|a, b| (b.checked_in_at, b.id).cmp(&(a.checked_in_at, a.id)))
            }
            RosterView::Leaderboard => records.sort_by(|a, b| {
                b.points
                    .cmp(&a.points)
                    .then(a.checked_in_at.cmp(&b.checked_in_at))
                    .then(a.id.cmp(&b.id))
            }),
        }
        Ok(records)
    }

    async fn list_all_attendance(&self) -> Result<Vec<AttendanceWithSession>, AppError> {
        let state = self.lock()?;
        let mut rows: Vec<AttendanceWithSession> =
            state.attendance.iter().filter_map(|r| state.joined(r)).collect();
        rows.sort_by(|a, b| {
            (b.session.started_at, b.session.id)
                .cmp(&(a.session.started_at, a.session.id))
                .then((a.record.checked_in_at, a.record.id).cmp(&(b.record.checked_in_at, b.record.id)))
        });
        Ok(rows)
    }

    async fn attendance_for_email(
        &self,
        student_email: &str,
    ) -> Result<Vec<AttendanceWithSession>, AppError> {
        let state = self.lock()?;
        let mut rows: Vec<AttendanceWithSession> = state
            .attendance
            .iter()
            .filter(|r| r.student_email == student_email)
            .filter_map(|r| state.joined(r))
            .collect();
        rows.sort_by(|a, b| {
            (b.record.checked_in_at, b.record.id).cmp(&(a.record.checked_in_at, a.record.id))
        });
        Ok(rows)
    }

    async fn update_attendance_points(
        &self,
        record_id: i64,
        points: i64,
    ) -> Result<AttendanceRecord, AppError> {
        let record = {
            let mut state = self.lock()?;
            let record = state
                .attendance
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!("Attendance record with id {} not found", record_id))
                })?;
            record.points = points;
            record.clone()
        };

        self.feed.publish(AttendanceChange::Updated(record.clone()));
        Ok(record)
    }

    fn subscribe_attendance(&self, session_id: i64) -> AttendanceSubscription {
        self.feed.subscribe(session_id)
    }

    async fn create_artifact(&self, new: NewArtifact) -> Result<CodeArtifact, AppError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let artifact = CodeArtifact {
            id: state.next_id(),
            kind: new.kind,
            title: new.title,
            description: new.description,
            week_number: new.week_number,
            is_starter: new.is_starter,
            order_index: new.order_index,
            student_name: new.student_name,
            student_email: new.student_email,
            forked_from: new.forked_from,
            fields: new.fields,
            version_number: 1,
            created_at: now,
            updated_at: now,
        };
        state.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    async fn get_artifact(&self, id: i64) -> Result<CodeArtifact, AppError> {
        self.lock()?.artifact(id).cloned()
    }

    async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<CodeArtifact>, AppError> {
        let state = self.lock()?;
        let mut artifacts: Vec<CodeArtifact> = state
            .artifacts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        artifacts.sort_by_key(|a| (a.week_number.is_none(), a.week_number, a.order_index, a.id));
        Ok(artifacts)
    }

    async fn save_artifact_with_history(
        &self,
        id: i64,
        fields: ArtifactFields,
        change_summary: Option<String>,
    ) -> Result<i64, AppError> {
        let mut state = self.lock()?;
        let revision = Revision::plan(state.artifact(id)?, fields, change_summary);

        let snapshot = CodeVersionSnapshot {
            id: state.next_id(),
            artifact_id: revision.artifact_id,
            version_number: revision.snapshot_version,
            fields: revision.snapshot_fields,
            change_summary: revision.change_summary,
            created_at: Utc::now(),
        };
        state.versions.push(snapshot);

        let artifact = state
            .artifacts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Code artifact with id {} not found", id)))?;
        artifact.fields = revision.fields;
        artifact.version_number = revision.new_version;
        artifact.updated_at = Utc::now();

        Ok(revision.new_version)
    }

    async fn list_versions(&self, artifact_id: i64) -> Result<Vec<CodeVersionSnapshot>, AppError> {
        let state = self.lock()?;
        let mut versions: Vec<CodeVersionSnapshot> = state
            .versions
            .iter()
            .filter(|v| v.artifact_id == artifact_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| (b.version_number, b.id).cmp(&(a.version_number, a.id)));
        Ok(versions)
    }
}
