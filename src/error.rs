//! Error model for the portal core and its HTTP mapping.
//! Identity and profile failures are typed enums returned as values from the
//! session store; `AppError` is the flattened code/message form used by the
//! HTTP surface.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Failures reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("identity provider unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("too many attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("email address has not been verified")]
    Unverified,
    #[error("an account already exists for {0}")]
    EmailTaken(String),
    #[error("invalid sign-up: {0}")]
    InvalidSignUp(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::NetworkUnreachable(_) => "network_unreachable",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::Unverified => "unverified",
            AuthError::EmailTaken(_) => "email_taken",
            AuthError::InvalidSignUp(_) => "invalid_sign_up",
        }
    }
}

/// Failures reported by the profile store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("profile {0} not found")]
    NotFound(String),
    #[error("write conflict on profile {0}")]
    WriteConflict(String),
    #[error("profile store unreachable: {0}")]
    Network(String),
    #[error("invalid profile update: {0}")]
    InvalidPatch(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "profile_not_found",
            StoreError::WriteConflict(_) => "write_conflict",
            StoreError::Network(_) => "store_unreachable",
            StoreError::InvalidPatch(_) => "invalid_patch",
        }
    }
}

/// Everything a session store action can hand back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no authenticated identity")]
    NotAuthenticated,
    #[error("demo profiles cannot be persisted")]
    DemoMode,
    #[error("superseded by a later session change")]
    Superseded,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Auth(e) => e.code(),
            SessionError::Store(e) => e.code(),
            SessionError::NotAuthenticated => "not_authenticated",
            SessionError::DemoMode => "demo_mode",
            SessionError::Superseded => "superseded",
        }
    }
}

/// Rejections from the prescription book.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrescriptionError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("provider information not available")]
    NoProvider,
    #[error("only providers can write prescriptions")]
    NotProvider,
    #[error("unknown patient {0}")]
    UnknownPatient(String),
    #[error("end date {end} is before start date {start}")]
    EndsBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("prescription {0} not found")]
    NotFound(String),
    #[error("prescription {0} belongs to another provider")]
    NotAuthor(String),
}

impl PrescriptionError {
    pub fn code(&self) -> &'static str {
        match self {
            PrescriptionError::MissingFields(_) => "missing_fields",
            PrescriptionError::NoProvider => "no_provider",
            PrescriptionError::NotProvider => "not_provider",
            PrescriptionError::UnknownPatient(_) => "unknown_patient",
            PrescriptionError::EndsBeforeStart { .. } => "ends_before_start",
            PrescriptionError::NotFound(_) => "prescription_not_found",
            PrescriptionError::NotAuthor(_) => "not_author",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    RateLimited { code: String, message: String },
    Unavailable { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::RateLimited { code, .. }
            | AppError::Unavailable { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::RateLimited { message, .. }
            | AppError::Unavailable { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::RateLimited { .. } => 429,
            AppError::Unavailable { .. } => 503,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let code = err.code().to_string();
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials | AuthError::Unverified => AppError::Auth { code, message },
            AuthError::NetworkUnreachable(_) => AppError::Unavailable { code, message },
            AuthError::RateLimited { .. } => AppError::RateLimited { code, message },
            AuthError::EmailTaken(_) => AppError::Conflict { code, message },
            AuthError::InvalidSignUp(_) => AppError::UserInput { code, message },
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let code = err.code().to_string();
        let message = err.to_string();
        match err {
            StoreError::NotFound(_) => AppError::NotFound { code, message },
            StoreError::WriteConflict(_) => AppError::Conflict { code, message },
            StoreError::Network(_) => AppError::Unavailable { code, message },
            StoreError::InvalidPatch(_) => AppError::UserInput { code, message },
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Auth(e) => e.into(),
            SessionError::Store(e) => e.into(),
            SessionError::NotAuthenticated => AppError::auth("not_authenticated", "sign in required"),
            SessionError::DemoMode => AppError::forbidden("demo_mode", "demo profiles are read-only"),
            SessionError::Superseded => AppError::conflict("superseded", "superseded by a later session change"),
        }
    }
}

impl From<PrescriptionError> for AppError {
    fn from(err: PrescriptionError) -> Self {
        let code = err.code().to_string();
        let message = err.to_string();
        match err {
            PrescriptionError::MissingFields(_) | PrescriptionError::EndsBeforeStart { .. } => AppError::user(code, message),
            PrescriptionError::NoProvider => AppError::auth(code, message),
            PrescriptionError::NotProvider | PrescriptionError::NotAuthor(_) => AppError::forbidden(code, message),
            PrescriptionError::UnknownPatient(_) | PrescriptionError::NotFound(_) => AppError::not_found(code, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "blocked").http_status(), 403);
    }

    #[test]
    fn auth_errors_keep_their_codes() {
        let e: AppError = AuthError::InvalidCredentials.into();
        assert_eq!(e.code_str(), "invalid_credentials");
        assert_eq!(e.http_status(), 401);

        let e: AppError = AuthError::RateLimited { retry_after_secs: 30 }.into();
        assert_eq!(e.http_status(), 429);
        assert!(e.message().contains("30s"));

        let e: AppError = SessionError::from(AuthError::NetworkUnreachable("down".into())).into();
        assert_eq!(e.code_str(), "network_unreachable");
        assert_eq!(e.http_status(), 503);
    }

    #[test]
    fn session_errors_map_to_statuses() {
        let e: AppError = SessionError::DemoMode.into();
        assert_eq!(e.http_status(), 403);
        let e: AppError = SessionError::Store(StoreError::NotFound("p9".into())).into();
        assert_eq!(e.http_status(), 404);
        assert_eq!(e.code_str(), "profile_not_found");
        assert_eq!(SessionError::Superseded.code(), "superseded");
    }

    #[test]
    fn prescription_errors_map_to_statuses() {
        let e: AppError = PrescriptionError::MissingFields(vec!["medication", "dosage"]).into();
        assert_eq!(e.http_status(), 400);
        assert_eq!(e.code_str(), "missing_fields");
        assert!(e.message().contains("medication, dosage"));
        let e: AppError = PrescriptionError::NotAuthor("rx1".into()).into();
        assert_eq!(e.http_status(), 403);
        let e: AppError = PrescriptionError::UnknownPatient("p9".into()).into();
        assert_eq!(e.http_status(), 404);
    }
}
