use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    AttendanceRecord, AttendanceWithSession, ClassSession, CodeArtifact, CodeVersionSnapshot,
    DbAttendanceRecord, DbAttendanceWithSession, DbClassSession, DbCodeArtifact,
    DbCodeVersionSnapshot, NewArtifact, NewAttendance, SessionSummary,
};
use crate::roster::RosterView;
use crate::versions::Revision;

const SESSION_COLUMNS: &str =
    "id, session_code, week_number, title, is_active, started_at, ended_at";

const ATTENDANCE_COLUMNS: &str =
    "id, session_id, student_name, student_email, student_id, checked_in_at, points";

const ARTIFACT_COLUMNS: &str = "id, kind, title, description, week_number, is_starter, \
     order_index, student_name, student_email, forked_from, markup, style, script, \
     version_number, created_at, updated_at";

const JOINED_ATTENDANCE_QUERY: &str = "SELECT a.id, a.session_id, a.student_name, \
     a.student_email, a.student_id, a.checked_in_at, a.points, s.session_code, \
     s.week_number, s.title, s.is_active, s.started_at, s.ended_at \
     FROM attendance_records a \
     JOIN class_sessions s ON s.id = a.session_id";

#[instrument]
pub async fn get_active_session(pool: &Pool<Sqlite>) -> Result<Option<ClassSession>, AppError> {
    info!("Fetching active session");
    let row = sqlx::query_as::<_, DbClassSession>(&format!(
        "SELECT {} FROM class_sessions
         WHERE is_active = TRUE
         ORDER BY started_at DESC, id DESC
         LIMIT 1",
        SESSION_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ClassSession::from))
}

#[instrument]
pub async fn find_session_by_code(
    pool: &Pool<Sqlite>,
    session_code: &str,
) -> Result<Option<ClassSession>, AppError> {
    info!("Fetching session by code");
    let row = sqlx::query_as::<_, DbClassSession>(&format!(
        "SELECT {} FROM class_sessions WHERE session_code = ?",
        SESSION_COLUMNS
    ))
    .bind(session_code)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ClassSession::from))
}

#[instrument]
pub async fn get_session(pool: &Pool<Sqlite>, id: i64) -> Result<ClassSession, AppError> {
    info!("Fetching session by ID");
    let row = sqlx::query_as::<_, DbClassSession>(&format!(
        "SELECT {} FROM class_sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(session) => Ok(ClassSession::from(session)),
        _ => Err(AppError::NotFound(format!(
            "Session with id {} not found in database",
            id
        ))),
    }
}

#[derive(sqlx::FromRow, Clone)]
struct DbSessionSummary {
    #[sqlx(flatten)]
    session: DbClassSession,
    attendance_count: Option<i64>,
}

#[instrument]
pub async fn list_sessions(pool: &Pool<Sqlite>) -> Result<Vec<SessionSummary>, AppError> {
    info!("Listing sessions");
    let rows = sqlx::query_as::<_, DbSessionSummary>(
        "SELECT s.id, s.session_code, s.week_number, s.title, s.is_active,
                s.started_at, s.ended_at, COUNT(a.id) AS attendance_count
         FROM class_sessions s
         LEFT JOIN attendance_records a ON a.session_id = s.id
         GROUP BY s.id
         ORDER BY s.started_at DESC, s.id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SessionSummary {
            session: ClassSession::from(row.session),
            attendance_count: row.attendance_count.unwrap_or_default(),
        })
        .collect())
}

#[instrument]
pub async fn count_sessions(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    info!("Counting sessions");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM class_sessions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    week_number: i64,
    title: &str,
    session_code: &str,
) -> Result<ClassSession, AppError> {
    info!("Creating session");
    let now = Utc::now().naive_utc();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE class_sessions
         SET is_active = FALSE, ended_at = ?
         WHERE is_active = TRUE",
    )
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let res = sqlx::query(
        "INSERT INTO class_sessions (session_code, week_number, title, is_active, started_at)
         VALUES (?, ?, ?, TRUE, ?)",
    )
    .bind(session_code)
    .bind(week_number)
    .bind(title)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(AppError::from)
    .map_err(|err| {
        if err.is_unique_violation() {
            AppError::Conflict(format!("Session code {} is already in use", session_code))
        } else {
            err
        }
    })?;

    tx.commit().await?;

    get_session(pool, res.last_insert_rowid()).await
}

#[instrument]
pub async fn end_session(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Ending session");
    let now = Utc::now().naive_utc();
    let res = sqlx::query(
        "UPDATE class_sessions
         SET is_active = FALSE, ended_at = COALESCE(ended_at, ?)
         WHERE id = ?",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Session with id {} not found", id)));
    }
    Ok(())
}

#[instrument]
pub async fn delete_session(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting session and its attendance");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM attendance_records WHERE session_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let res = sqlx::query("DELETE FROM class_sessions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::NotFound(format!("Session with id {} not found", id)));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument]
pub async fn find_attendance(
    pool: &Pool<Sqlite>,
    session_id: i64,
    student_email: &str,
) -> Result<Option<AttendanceRecord>, AppError> {
    info!("Looking up attendance for student");
    let row = sqlx::query_as::<_, DbAttendanceRecord>(&format!(
        "SELECT {} FROM attendance_records
         WHERE session_id = ? AND student_email = ?",
        ATTENDANCE_COLUMNS
    ))
    .bind(session_id)
    .bind(student_email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(AttendanceRecord::from))
}

#[instrument]
pub async fn get_attendance(pool: &Pool<Sqlite>, id: i64) -> Result<AttendanceRecord, AppError> {
    let row = sqlx::query_as::<_, DbAttendanceRecord>(&format!(
        "SELECT {} FROM attendance_records WHERE id = ?",
        ATTENDANCE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(AttendanceRecord::from).ok_or_else(|| {
        AppError::NotFound(format!("Attendance record with id {} not found", id))
    })
}

#[instrument]
pub async fn count_attendance(pool: &Pool<Sqlite>, session_id: i64) -> Result<i64, AppError> {
    info!("Counting attendance for session");
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance_records WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Unique-index violations come back as `AppError::Database`; callers check
/// `is_unique_violation`.
#[instrument(skip(new), fields(session_id = new.session_id))]
pub async fn insert_attendance(
    pool: &Pool<Sqlite>,
    new: &NewAttendance,
) -> Result<AttendanceRecord, AppError> {
    info!("Inserting attendance record");
    let now = Utc::now().naive_utc();
    let res = sqlx::query(
        "INSERT INTO attendance_records
         (session_id, student_name, student_email, student_id, checked_in_at, points)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(new.session_id)
    .bind(&new.student_name)
    .bind(&new.student_email)
    .bind(&new.student_id)
    .bind(now)
    .bind(new.points)
    .execute(pool)
    .await?;

    get_attendance(pool, res.last_insert_rowid()).await
}

#[instrument]
pub async fn list_attendance(
    pool: &Pool<Sqlite>,
    session_id: i64,
    view: RosterView,
) -> Result<Vec<AttendanceRecord>, AppError> {
    info!("Listing attendance for session");
    let order_by = match view {
        RosterView::Panel => "checked_in_at DESC, id DESC",
        RosterView::Leaderboard => "points DESC, checked_in_at ASC, id ASC",
    };
    let rows = sqlx::query_as::<_, DbAttendanceRecord>(&format!(
        "SELECT {} FROM attendance_records WHERE session_id = ? ORDER BY {}",
        ATTENDANCE_COLUMNS, order_by
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AttendanceRecord::from).collect())
}

#[instrument]
pub async fn list_all_attendance(
    pool: &Pool<Sqlite>,
) -> Result<Vec<AttendanceWithSession>, AppError> {
    info!("Listing attendance across all sessions");
    let rows = sqlx::query_as::<_, DbAttendanceWithSession>(&format!(
        "{} ORDER BY s.started_at DESC, s.id DESC, a.checked_in_at ASC, a.id ASC",
        JOINED_ATTENDANCE_QUERY
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AttendanceWithSession::from).collect())
}

#[instrument]
pub async fn attendance_for_email(
    pool: &Pool<Sqlite>,
    student_email: &str,
) -> Result<Vec<AttendanceWithSession>, AppError> {
    info!("Listing attendance for student email");
    let rows = sqlx::query_as::<_, DbAttendanceWithSession>(&format!(
        "{} WHERE a.student_email = ? ORDER BY a.checked_in_at DESC, a.id DESC",
        JOINED_ATTENDANCE_QUERY
    ))
    .bind(student_email)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AttendanceWithSession::from).collect())
}

#[instrument]
pub async fn update_attendance_points(
    pool: &Pool<Sqlite>,
    record_id: i64,
    points: i64,
) -> Result<AttendanceRecord, AppError> {
    info!("Correcting attendance points");
    let res = sqlx::query("UPDATE attendance_records SET points = ? WHERE id = ?")
        .bind(points)
        .bind(record_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Attendance record with id {} not found",
            record_id
        )));
    }

    get_attendance(pool, record_id).await
}

#[instrument(skip(new), fields(kind = %new.kind))]
pub async fn create_artifact(
    pool: &Pool<Sqlite>,
    new: &NewArtifact,
) -> Result<CodeArtifact, AppError> {
    info!("Creating code artifact");
    let now = Utc::now().naive_utc();
    let res = sqlx::query(
        "INSERT INTO code_artifacts
         (kind, title, description, week_number, is_starter, order_index, student_name,
          student_email, forked_from, markup, style, script, version_number, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(new.kind.as_str())
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.week_number)
    .bind(new.is_starter)
    .bind(new.order_index)
    .bind(&new.student_name)
    .bind(&new.student_email)
    .bind(new.forked_from)
    .bind(&new.fields.markup)
    .bind(&new.fields.style)
    .bind(&new.fields.script)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_artifact(pool, res.last_insert_rowid()).await
}

#[instrument]
pub async fn get_artifact(pool: &Pool<Sqlite>, id: i64) -> Result<CodeArtifact, AppError> {
    info!("Fetching code artifact");
    let row = sqlx::query_as::<_, DbCodeArtifact>(&format!(
        "SELECT {} FROM code_artifacts WHERE id = ?",
        ARTIFACT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(artifact) => Ok(CodeArtifact::from(artifact)),
        _ => Err(AppError::NotFound(format!(
            "Code artifact with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn list_artifacts(pool: &Pool<Sqlite>) -> Result<Vec<CodeArtifact>, AppError> {
    info!("Listing code artifacts");
    let rows = sqlx::query_as::<_, DbCodeArtifact>(&format!(
        "SELECT {} FROM code_artifacts
         ORDER BY week_number IS NULL, week_number, order_index, id",
        ARTIFACT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CodeArtifact::from).collect())
}

/// Writes the snapshot and then the live update inside one transaction.
#[instrument(skip(revision), fields(artifact_id = revision.artifact_id))]
pub async fn apply_revision(pool: &Pool<Sqlite>, revision: &Revision) -> Result<i64, AppError> {
    info!("Saving artifact revision");
    let now = Utc::now().naive_utc();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO code_versions
         (artifact_id, version_number, markup, style, script, change_summary, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(revision.artifact_id)
    .bind(revision.snapshot_version)
    .bind(&revision.snapshot_fields.markup)
    .bind(&revision.snapshot_fields.style)
    .bind(&revision.snapshot_fields.script)
    .bind(&revision.change_summary)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let res = sqlx::query(
        "UPDATE code_artifacts
         SET markup = ?, style = ?, script = ?, version_number = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&revision.fields.markup)
    .bind(&revision.fields.style)
    .bind(&revision.fields.script)
    .bind(revision.new_version)
    .bind(now)
    .bind(revision.artifact_id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::NotFound(format!(
            "Code artifact with id {} not found",
            revision.artifact_id
        )));
    }

    tx.commit().await?;
    Ok(revision.new_version)
}

#[instrument]
pub async fn list_versions(
    pool: &Pool<Sqlite>,
    artifact_id: i64,
) -> Result<Vec<CodeVersionSnapshot>, AppError> {
    info!("Listing artifact versions");
    let rows = sqlx::query_as::<_, DbCodeVersionSnapshot>(
        "SELECT id, artifact_id, version_number, markup, style, script, change_summary, created_at
         FROM code_versions
         WHERE artifact_id = ?
         ORDER BY version_number DESC, id DESC",
    )
    .bind(artifact_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CodeVersionSnapshot::from).collect())
}
