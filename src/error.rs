use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use thiserror::Error;
use tracing::{Span, error, info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        let error_kind = match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
                "database_error"
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
                "not_found_error"
            }
            AppError::Validation(msg) => {
                warn!(message = %msg, context = %ctx, "Validation error");
                "validation_error"
            }
            AppError::Conflict(msg) => {
                warn!(message = %msg, context = %ctx, "Conflict error");
                "conflict_error"
            }
            AppError::ExternalService(msg) => {
                error!(message = %msg, context = %ctx, "External service error");
                "external_service_error"
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
                "internal_error"
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(error_kind));
            current_span.record("error.message", tracing::field::display(&message));

            match self {
                AppError::Database(_) | AppError::Internal(_) | AppError::ExternalService(_) => {
                    current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
                }
                _ => {}
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => Status::InternalServerError,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Validation(_) => Status::BadRequest,
            AppError::Conflict(_) => Status::Conflict,
            AppError::ExternalService(_) => Status::ServiceUnavailable,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    /// True when the database rejected a write because of a UNIQUE index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            AppError::Conflict(_) => true,
            _ => false,
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

/// Outcomes of a student check-in that are not a fresh attendance record.
#[derive(Error, Debug)]
pub enum CheckInError {
    #[error("Invalid or expired session code")]
    InvalidSession,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Already checked in for this session")]
    AlreadyCheckedIn,

    #[error("Failed to check in. Please try again.")]
    PersistenceFailure(#[source] AppError),
}

impl CheckInError {
    pub fn status_code(&self) -> Status {
        match self {
            CheckInError::InvalidSession => Status::NotFound,
            CheckInError::InvalidInput(_) => Status::UnprocessableEntity,
            CheckInError::AlreadyCheckedIn => Status::Ok,
            CheckInError::PersistenceFailure(_) => Status::ServiceUnavailable,
        }
    }

    /// Machine-readable tag sent back to the check-in form.
    pub fn code(&self) -> &'static str {
        match self {
            CheckInError::InvalidSession => "invalid_session",
            CheckInError::InvalidInput(_) => "invalid_input",
            CheckInError::AlreadyCheckedIn => "already_checked_in",
            CheckInError::PersistenceFailure(_) => "persistence_failure",
        }
    }

    pub fn log_and_record(&self, ctx: &str) {
        match self {
            CheckInError::InvalidSession => {
                warn!(context = %ctx, "Check-in against unknown or inactive session")
            }
            CheckInError::InvalidInput(msg) => {
                warn!(message = %msg, context = %ctx, "Check-in rejected")
            }
            CheckInError::AlreadyCheckedIn => {
                info!(context = %ctx, "Student already checked in")
            }
            CheckInError::PersistenceFailure(err) => err.log_and_record(ctx),
        }
    }
}

impl From<AppError> for CheckInError {
    fn from(err: AppError) -> Self {
        CheckInError::PersistenceFailure(err)
    }
}
