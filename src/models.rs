use std::fmt;

use anyhow::Error;
use chrono::{DateTime, NaiveDateTime, Utc};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};

pub fn to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassSession {
    pub id: i64,
    pub session_code: String,
    pub week_number: i64,
    pub title: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbClassSession {
    pub id: Option<i64>,
    pub session_code: Option<String>,
    pub week_number: Option<i64>,
    pub title: Option<String>,
    pub is_active: Option<bool>,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
}

impl From<DbClassSession> for ClassSession {
    fn from(db: DbClassSession) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            session_code: db.session_code.unwrap_or_default(),
            week_number: db.week_number.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            is_active: db.is_active.unwrap_or_default(),
            started_at: db.started_at.map(to_utc).unwrap_or_else(Utc::now),
            ended_at: db.ended_at.map(to_utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: ClassSession,
    pub attendance_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: i64,
    pub session_id: i64,
    pub student_name: String,
    pub student_email: String,
    pub student_id: Option<String>,
    pub checked_in_at: DateTime<Utc>,
    pub points: i64,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAttendanceRecord {
    pub id: Option<i64>,
    pub session_id: Option<i64>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub student_id: Option<String>,
    pub checked_in_at: Option<NaiveDateTime>,
    pub points: Option<i64>,
}

impl From<DbAttendanceRecord> for AttendanceRecord {
    fn from(db: DbAttendanceRecord) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            session_id: db.session_id.unwrap_or_default(),
            student_name: db.student_name.unwrap_or_default(),
            student_email: db.student_email.unwrap_or_default(),
            student_id: db.student_id,
            checked_in_at: db.checked_in_at.map(to_utc).unwrap_or_else(Utc::now),
            points: db.points.unwrap_or_default(),
        }
    }
}

/// Fields handed to the store once the check-in has been validated and scored.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub session_id: i64,
    pub student_name: String,
    pub student_email: String,
    pub student_id: Option<String>,
    pub points: i64,
}

/// One attendance row joined with the session it belongs to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttendanceWithSession {
    pub record: AttendanceRecord,
    pub session: ClassSession,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAttendanceWithSession {
    pub id: Option<i64>,
    pub session_id: Option<i64>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub student_id: Option<String>,
    pub checked_in_at: Option<NaiveDateTime>,
    pub points: Option<i64>,
    pub session_code: Option<String>,
    pub week_number: Option<i64>,
    pub title: Option<String>,
    pub is_active: Option<bool>,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
}

impl From<DbAttendanceWithSession> for AttendanceWithSession {
    fn from(db: DbAttendanceWithSession) -> Self {
        let session = DbClassSession {
            id: db.session_id,
            session_code: db.session_code,
            week_number: db.week_number,
            title: db.title,
            is_active: db.is_active,
            started_at: db.started_at,
            ended_at: db.ended_at,
        };
        let record = DbAttendanceRecord {
            id: db.id,
            session_id: db.session_id,
            student_name: db.student_name,
            student_email: db.student_email,
            student_id: db.student_id,
            checked_in_at: db.checked_in_at,
            points: db.points,
        };

        Self {
            record: AttendanceRecord::from(record),
            session: ClassSession::from(session),
        }
    }
}

/// A student's attendance across every session, newest first.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StudentAttendance {
    pub student_email: String,
    pub student_name: Option<String>,
    pub records: Vec<AttendanceWithSession>,
    pub sessions_attended: i64,
    pub total_sessions: i64,
    pub total_points: i64,
    pub attendance_percentage: i64,
}

impl StudentAttendance {
    pub fn new(student_email: &str, records: Vec<AttendanceWithSession>, total_sessions: i64) -> Self {
        let sessions_attended = records.len() as i64;
        let total_points = records.iter().map(|r| r.record.points).sum();
        let attendance_percentage = if total_sessions > 0 {
            ((sessions_attended as f64 / total_sessions as f64) * 100.0).round() as i64
        } else {
            0
        };

        Self {
            student_email: student_email.to_string(),
            student_name: records.first().map(|r| r.record.student_name.clone()),
            records,
            sessions_attended,
            total_sessions,
            total_points,
            attendance_percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    #[field(value = "example")]
    Example,
    #[field(value = "student_save")]
    StudentSave,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &str {
        match self {
            ArtifactKind::Example => "example",
            ArtifactKind::StudentSave => "student_save",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "example" => Ok(ArtifactKind::Example),
            "student_save" => Ok(ArtifactKind::StudentSave),
            _ => Err(Error::msg(format!("Unknown artifact kind: {}", s))),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The three editable files of a playground project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[field(value = "markup")]
    #[field(value = "html")]
    Markup,
    #[field(value = "style")]
    #[field(value = "css")]
    Style,
    #[field(value = "script")]
    #[field(value = "js")]
    Script,
}

impl FileKind {
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Markup => "HTML",
            FileKind::Style => "CSS",
            FileKind::Script => "JavaScript",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ArtifactFields {
    #[serde(default)]
    pub markup: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub script: String,
}

impl ArtifactFields {
    pub fn new(markup: &str, style: &str, script: &str) -> Self {
        Self {
            markup: markup.to_string(),
            style: style.to_string(),
            script: script.to_string(),
        }
    }

    pub fn file(&self, file: FileKind) -> &str {
        match file {
            FileKind::Markup => &self.markup,
            FileKind::Style => &self.style,
            FileKind::Script => &self.script,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CodeArtifact {
    pub id: i64,
    pub kind: ArtifactKind,
    pub title: String,
    pub description: String,
    pub week_number: Option<i64>,
    pub is_starter: bool,
    pub order_index: i64,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub forked_from: Option<i64>,
    pub fields: ArtifactFields,
    pub version_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbCodeArtifact {
    pub id: Option<i64>,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub week_number: Option<i64>,
    pub is_starter: Option<bool>,
    pub order_index: Option<i64>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub forked_from: Option<i64>,
    pub markup: Option<String>,
    pub style: Option<String>,
    pub script: Option<String>,
    pub version_number: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbCodeArtifact> for CodeArtifact {
    fn from(db: DbCodeArtifact) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            kind: db
                .kind
                .as_deref()
                .and_then(|k| ArtifactKind::from_str(k).ok())
                .unwrap_or(ArtifactKind::Example),
            title: db.title.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            week_number: db.week_number,
            is_starter: db.is_starter.unwrap_or_default(),
            order_index: db.order_index.unwrap_or_default(),
            student_name: db.student_name,
            student_email: db.student_email,
            forked_from: db.forked_from,
            fields: ArtifactFields {
                markup: db.markup.unwrap_or_default(),
                style: db.style.unwrap_or_default(),
                script: db.script.unwrap_or_default(),
            },
            version_number: db.version_number.unwrap_or(1),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
            updated_at: db.updated_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewArtifact {
    pub kind: ArtifactKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub week_number: Option<i64>,
    #[serde(default)]
    pub is_starter: bool,
    #[serde(default)]
    pub order_index: i64,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub forked_from: Option<i64>,
    #[serde(default)]
    pub fields: ArtifactFields,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CodeVersionSnapshot {
    pub id: i64,
    pub artifact_id: i64,
    pub version_number: i64,
    pub fields: ArtifactFields,
    pub change_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbCodeVersionSnapshot {
    pub id: Option<i64>,
    pub artifact_id: Option<i64>,
    pub version_number: Option<i64>,
    pub markup: Option<String>,
    pub style: Option<String>,
    pub script: Option<String>,
    pub change_summary: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbCodeVersionSnapshot> for CodeVersionSnapshot {
    fn from(db: DbCodeVersionSnapshot) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            artifact_id: db.artifact_id.unwrap_or_default(),
            version_number: db.version_number.unwrap_or_default(),
            fields: ArtifactFields {
                markup: db.markup.unwrap_or_default(),
                style: db.style.unwrap_or_default(),
                script: db.script.unwrap_or_default(),
            },
            change_summary: db.change_summary,
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}
