//! Instructor-side session lifecycle.

use qrcode::QrCode;
use qrcode::render::svg;
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::models::{ClassSession, SessionSummary, StudentAttendance};
use crate::session_code;
use crate::store::ClassroomStore;

const MAX_CODE_ATTEMPTS: usize = 5;

/// Opens a new active session under a fresh code, ending whichever session
/// was active before.
#[instrument(skip(store))]
pub async fn start_session(
    store: &dyn ClassroomStore,
    week_number: i64,
    title: &str,
) -> Result<ClassSession, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Session title is required".to_string()));
    }
    if week_number < 1 {
        return Err(AppError::Validation("Week number must be at least 1".to_string()));
    }

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = session_code::generate(session_code::DEFAULT_LENGTH);
        match store.create_session(week_number, title, &code).await {
            Ok(session) => {
                info!(session_id = session.id, code = %session.session_code, "Session started");
                return Ok(session);
            }
            Err(AppError::Conflict(_)) => {
                warn!(attempt, "Session code collision, regenerating");
            }
            Err(err) => return Err(err),
        }
    }

    Err(AppError::Internal(format!(
        "Could not allocate a unique session code after {} attempts",
        MAX_CODE_ATTEMPTS
    )))
}

pub async fn active_session(store: &dyn ClassroomStore) -> Result<Option<ClassSession>, AppError> {
    store.get_active_session().await
}

#[instrument(skip(store))]
pub async fn end_session(store: &dyn ClassroomStore, id: i64) -> Result<ClassSession, AppError> {
    store.end_session(id).await?;
    info!("Session ended");
    store.get_session(id).await
}

#[instrument(skip(store))]
pub async fn delete_session(store: &dyn ClassroomStore, id: i64) -> Result<(), AppError> {
    store.delete_session(id).await?;
    info!("Session deleted");
    Ok(())
}

pub async fn list_sessions(store: &dyn ClassroomStore) -> Result<Vec<SessionSummary>, AppError> {
    store.list_sessions().await
}

/// Shareable check-in link for a session code.
pub fn check_in_url(base_url: &str, sign_in_path: &str, code: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        sign_in_path.trim_matches('/'),
        code
    )
}

/// SVG QR code of a check-in link, as shown on the classroom screen.
pub fn check_in_qr_svg(url: &str) -> Result<String, AppError> {
    let code = QrCode::new(url.as_bytes())
        .map_err(|e| AppError::Internal(format!("Failed to encode QR code: {}", e)))?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}

/// Everything a student sees when they look up their own attendance.
#[instrument(skip(store))]
pub async fn student_attendance(
    store: &dyn ClassroomStore,
    email: &str,
) -> Result<StudentAttendance, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }

    let records = store.attendance_for_email(&email).await?;
    let total_sessions = store.count_sessions().await?;
    Ok(StudentAttendance::new(&email, records, total_sessions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_in_url_joins_cleanly() {
        assert_eq!(
            check_in_url("http://localhost:8000/", "/signin/", "AB12CD34"),
            "http://localhost:8000/signin/AB12CD34"
        );
        assert_eq!(
            check_in_url("https://x.edu", "checkin", "ZZ99ZZ99"),
            "https://x.edu/checkin/ZZ99ZZ99"
        );
    }

    #[test]
    fn test_qr_code_follows_link() {
        let url = check_in_url("http://localhost:8000", "signin", "AB12CD34");
        let svg = check_in_qr_svg(&url).unwrap();
        assert!(svg.contains("<svg"));

        let expected = QrCode::new(url.as_bytes())
            .unwrap()
            .render::<svg::Color>()
            .min_dimensions(256, 256)
            .quiet_zone(true)
            .build();
        assert_eq!(svg, expected);

        let other = check_in_qr_svg(&check_in_url("http://localhost:8000", "signin", "ZZ99ZZ99"))
            .unwrap();
        assert_ne!(svg, other);
    }
}
