use thiserror::Error;

/// PostgreSQL SQLSTATE codes PostgREST forwards for constraint failures.
pub const UNIQUE_VIOLATION: &str = "23505";
pub const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Constraint violation ({code}): {message}")]
    ConstraintViolation { code: String, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),
}

impl DatabaseError {
    /// Classify a non-success PostgREST response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        if status == 409 || code == UNIQUE_VIOLATION || code == EXCLUSION_VIOLATION {
            return DatabaseError::ConstraintViolation { code, message };
        }

        match status {
            401 | 403 => DatabaseError::Auth(message),
            _ => DatabaseError::Api { status, message },
        }
    }

    /// Failures where repeating the same request unchanged may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Transport(_) => true,
            DatabaseError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DatabaseError::ConstraintViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn unique_violation_code_is_constraint_even_without_409() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        let err = DatabaseError::from_response(400, body);
        assert_matches!(err, DatabaseError::ConstraintViolation { ref code, .. } if code == "23505");
    }

    #[test]
    fn conflict_status_is_constraint() {
        let err = DatabaseError::from_response(409, "conflict");
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn other_statuses_keep_their_meaning() {
        assert_matches!(DatabaseError::from_response(401, "{}"), DatabaseError::Auth(_));
        assert_matches!(
            DatabaseError::from_response(503, "unavailable"),
            DatabaseError::Api { status: 503, .. }
        );
    }

    #[test]
    fn missing_table_is_an_api_error_not_an_absent_row() {
        let body = r#"{"code":"42P01","message":"relation \"public.date_exceptions\" does not exist"}"#;
        let err = DatabaseError::from_response(404, body);
        assert_matches!(err, DatabaseError::Api { status: 404, .. });
        assert!(!err.is_transient());
    }

    #[test]
    fn only_outages_are_transient() {
        assert!(DatabaseError::from_response(503, "down").is_transient());
        assert!(DatabaseError::from_response(429, "slow down").is_transient());
        assert!(!DatabaseError::from_response(401, "jwt expired").is_transient());
        assert!(!DatabaseError::from_response(400, "bad filter").is_transient());
        assert!(!DatabaseError::InvalidHeader("bad token".to_string()).is_transient());
    }
}
