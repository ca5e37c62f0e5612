use thiserror::Error;

use shared_database::DatabaseError;
use shared_models::AppError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Store unavailable: {0}")]
    TransientIo(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// The store answered but refused or garbled the exchange.
    #[error("Store rejected the request: {0}")]
    StoreRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Booking conflict: {0}")]
    Conflict(String),

    #[error("A save is already in flight for {0}")]
    SaveInProgress(String),
}

impl ScheduleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ScheduleError::Validation(msg.into())
    }

    /// Safe to repeat the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::TransientIo(_))
    }

    /// Text shown to the person editing their schedule.
    pub fn user_message(&self) -> String {
        match self {
            ScheduleError::Validation(msg) => msg.clone(),
            ScheduleError::ConstraintViolation(_) => {
                "Two availability intervals collide for this day. Adjust or remove the overlapping interval and save again.".to_string()
            }
            ScheduleError::TransientIo(_) => {
                "Could not reach the schedule service. Your changes are kept; try again.".to_string()
            }
            ScheduleError::Unauthorized(_) => {
                "Your session is not allowed to change this schedule. Sign in again.".to_string()
            }
            ScheduleError::StoreRejected(_) => {
                "The schedule service refused the request. Retrying it unchanged will not help.".to_string()
            }
            ScheduleError::NotFound(what) => format!("{} no longer exists", what),
            ScheduleError::Conflict(msg) => msg.clone(),
            ScheduleError::SaveInProgress(what) => format!("{} is still being saved", what),
        }
    }
}

impl From<DatabaseError> for ScheduleError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConstraintViolation { code, message } => {
                ScheduleError::ConstraintViolation(format!("{} ({})", message, code))
            }
            DatabaseError::Auth(msg) => ScheduleError::Unauthorized(msg),
            other if other.is_transient() => ScheduleError::TransientIo(other.to_string()),
            other => ScheduleError::StoreRejected(other.to_string()),
        }
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        let message = err.user_message();
        match err {
            ScheduleError::Validation(_) => AppError::ValidationError(message),
            ScheduleError::ConstraintViolation(_)
            | ScheduleError::Conflict(_)
            | ScheduleError::SaveInProgress(_) => AppError::Conflict(message),
            ScheduleError::NotFound(_) => AppError::NotFound(message),
            ScheduleError::TransientIo(_) => AppError::ExternalService(message),
            ScheduleError::Unauthorized(_) => AppError::Auth(message),
            ScheduleError::StoreRejected(_) => AppError::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn database_constraint_stays_distinct_from_io() {
        let err: ScheduleError = DatabaseError::ConstraintViolation {
            code: "23505".to_string(),
            message: "duplicate key".to_string(),
        }
        .into();
        assert_matches!(err, ScheduleError::ConstraintViolation(_));
        assert!(!err.is_retryable());

        let err: ScheduleError = DatabaseError::Api { status: 503, message: "down".to_string() }.into();
        assert_matches!(err, ScheduleError::TransientIo(_));
        assert!(err.is_retryable());
    }

    #[test]
    fn rejected_requests_are_not_reported_as_outages() {
        let err: ScheduleError = DatabaseError::Auth("JWT expired".to_string()).into();
        assert_matches!(err, ScheduleError::Unauthorized(_));
        assert!(!err.is_retryable());
        assert_matches!(AppError::from(err), AppError::Auth(_));

        let err: ScheduleError = DatabaseError::Api { status: 400, message: "bad filter".to_string() }.into();
        assert_matches!(err, ScheduleError::StoreRejected(_));
        assert!(!err.is_retryable());
        assert!(!err.user_message().contains("try again"));

        let err: ScheduleError = DatabaseError::InvalidHeader("bad token".to_string()).into();
        assert_matches!(err, ScheduleError::StoreRejected(_));
    }

    #[test]
    fn constraint_violation_gets_actionable_http_message() {
        let app: AppError = ScheduleError::ConstraintViolation("dup".to_string()).into();
        assert_matches!(app, AppError::Conflict(ref msg) if msg.contains("overlapping interval"));
    }
}
