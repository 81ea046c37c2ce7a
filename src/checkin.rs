//! Student check-in: resolve the session, validate the form, award points by
//! arrival order and persist exactly one attendance record.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::CheckInError;
use crate::models::{AttendanceRecord, ClassSession, NewAttendance};
use crate::session_code;
use crate::store::{ClassroomStore, InsertOutcome};

/// Points decay by `step` per earlier arrival, never below `floor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsPolicy {
    pub max_points: i64,
    pub step: i64,
    pub floor: i64,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self {
            max_points: 100,
            step: 10,
            floor: 10,
        }
    }
}

impl PointsPolicy {
    /// Points for the student arriving after `existing` others.
    pub fn points_for(&self, existing: i64) -> i64 {
        self.max_points
            .saturating_sub(existing.saturating_mul(self.step))
            .max(self.floor)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckInRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Enter a valid email address")
    )]
    pub email: String,
    #[serde(default)]
    pub student_id: Option<String>,
}

impl CheckInRequest {
    pub fn new(name: &str, email: &str, student_id: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            student_id: student_id.map(str::to_string),
        }
    }

    /// Trims every field, lower-cases the email and drops a blank student id.
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            student_id: self
                .student_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    fn validate_input(&self) -> Result<(), CheckInError> {
        self.validate().map_err(|errors| {
            let reason = errors
                .field_errors()
                .into_iter()
                .flat_map(|(_, errs)| errs.iter())
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .next()
                .unwrap_or_else(|| "Invalid check-in details".to_string());
            CheckInError::InvalidInput(reason)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckInReceipt {
    pub record: AttendanceRecord,
    pub points: i64,
    pub week_number: i64,
    pub title: String,
}

/// Resolves a code to the session students may check into. Unknown,
/// malformed and inactive codes are all `InvalidSession`.
#[instrument(skip(store))]
pub async fn resolve_session(
    store: &dyn ClassroomStore,
    code: &str,
) -> Result<ClassSession, CheckInError> {
    let code = session_code::normalize(code);
    if !session_code::is_well_formed(&code) {
        return Err(CheckInError::InvalidSession);
    }

    match store.find_session_by_code(&code).await? {
        Some(session) if session.is_active => Ok(session),
        _ => Err(CheckInError::InvalidSession),
    }
}

#[instrument(skip(store, request), fields(code = %code))]
pub async fn check_in(
    store: &dyn ClassroomStore,
    policy: &PointsPolicy,
    code: &str,
    request: &CheckInRequest,
) -> Result<CheckInReceipt, CheckInError> {
    let session = resolve_session(store, code).await?;

    let request = request.normalized();
    request.validate_input()?;

    if store
        .find_attendance(session.id, &request.email)
        .await?
        .is_some()
    {
        return Err(CheckInError::AlreadyCheckedIn);
    }

    let existing = store.count_attendance(session.id).await?;
    let points = policy.points_for(existing);

    let new = NewAttendance {
        session_id: session.id,
        student_name: request.name,
        student_email: request.email,
        student_id: request.student_id,
        points,
    };

    match store.insert_attendance(new).await? {
        InsertOutcome::Inserted(record) => {
            info!(record_id = record.id, points, "Student checked in");
            Ok(CheckInReceipt {
                points: record.points,
                record,
                week_number: session.week_number,
                title: session.title,
            })
        }
        InsertOutcome::Conflict => Err(CheckInError::AlreadyCheckedIn),
    }
}
