//! Student-facing check-in link, mounted under the configured sign-in path.

use rocket::http::Status;
use rocket::{Request, State};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

use crate::checkin::{self, CheckInReceipt, CheckInRequest};
use crate::config::ClassroomConfig;
use crate::error::{AppError, CheckInError};
use crate::models::AttendanceRecord;
use crate::store::SharedStore;

#[derive(Serialize, Deserialize, Debug)]
pub struct CheckInPage {
    pub session_code: String,
    pub week_number: i64,
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CheckInResponse {
    pub status: String,
    pub message: String,
    pub points: Option<i64>,
    pub record: Option<AttendanceRecord>,
    pub week_number: Option<i64>,
    pub title: Option<String>,
}

impl CheckInResponse {
    fn checked_in(receipt: CheckInReceipt) -> Self {
        Self {
            status: "checked_in".to_string(),
            message: format!(
                "You're checked in for Week {}: {}. You earned {} points.",
                receipt.week_number, receipt.title, receipt.points
            ),
            points: Some(receipt.points),
            week_number: Some(receipt.week_number),
            title: Some(receipt.title),
            record: Some(receipt.record),
        }
    }

    fn failed(err: &CheckInError) -> Self {
        let message = match err {
            CheckInError::InvalidSession => {
                "This check-in link is invalid or the session has ended.".to_string()
            }
            CheckInError::InvalidInput(reason) => reason.clone(),
            CheckInError::AlreadyCheckedIn => {
                "You have already checked in for this session.".to_string()
            }
            CheckInError::PersistenceFailure(_) => {
                "Check-in failed. Please try again.".to_string()
            }
        };
        Self {
            status: err.code().to_string(),
            message,
            points: None,
            record: None,
            week_number: None,
            title: None,
        }
    }
}

/// What the student sees before submitting: the session being checked into.
#[get("/<code>")]
pub async fn check_in_page(
    code: &str,
    store: &State<SharedStore>,
) -> Result<Json<CheckInPage>, Custom<Json<CheckInResponse>>> {
    match checkin::resolve_session(store.inner().as_ref(), code).await {
        Ok(session) => Ok(Json(CheckInPage {
            session_code: session.session_code,
            week_number: session.week_number,
            title: session.title,
        })),
        Err(err) => {
            err.log_and_record("Check-in page");
            Err(Custom(err.status_code(), Json(CheckInResponse::failed(&err))))
        }
    }
}

#[post("/<code>", data = "<request>")]
pub async fn submit_check_in(
    code: &str,
    request: Json<CheckInRequest>,
    store: &State<SharedStore>,
    config: &State<ClassroomConfig>,
) -> Custom<Json<CheckInResponse>> {
    let policy = config.points_policy();
    match checkin::check_in(store.inner().as_ref(), &policy, code, &request).await {
        Ok(receipt) => Custom(Status::Created, Json(CheckInResponse::checked_in(receipt))),
        Err(err) => {
            err.log_and_record("Check-in");
            Custom(err.status_code(), Json(CheckInResponse::failed(&err)))
        }
    }
}

/// Failures before the handler runs (unreadable body, unknown path) still
/// answer in the check-in response shape.
#[catch(default)]
pub fn check_in_catcher(status: Status, _req: &Request) -> Custom<Json<CheckInResponse>> {
    let err = match status.code {
        404 => CheckInError::InvalidSession,
        400 | 422 => CheckInError::InvalidInput("Check-in details could not be read".to_string()),
        _ => CheckInError::PersistenceFailure(AppError::Internal(format!(
            "Check-in request failed with {}",
            status
        ))),
    };
    err.log_and_record("Check-in catcher");
    Custom(status, Json(CheckInResponse::failed(&err)))
}
