use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Errors raised by the impersonation core.
///
/// The first group of variants is the caller-visible failure taxonomy of an
/// impersonation episode. Every guard violation aborts the transition before
/// anything is written, except [`ImpersonationError::TamperedSession`], which
/// is only returned after the stored record has been erased.
#[derive(Debug, thiserror::Error)]
pub enum ImpersonationError {
    #[error("Impersonation is not enabled.")]
    NotEnabled,

    #[error(
        "You are already impersonating a user. Please stop the current impersonation before starting a new one."
    )]
    AlreadyImpersonating,

    #[error("You are not impersonating any user.")]
    NotImpersonating,

    #[error("You do not have permission to impersonate users.")]
    CannotImpersonate,

    #[error("This user cannot be impersonated.")]
    CannotBeImpersonated,

    #[error("The impersonation session has expired.")]
    Expired,

    #[error(
        "Impersonation session data has been tampered with. For security reasons, the session has been cleared."
    )]
    TamperedSession,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A session store, auth gateway or directory call failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    error_id: String,
}

impl ImpersonationError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for the integrity failure that erased the impersonation record.
    pub fn is_tampered(&self) -> bool {
        matches!(self, Self::TamperedSession)
    }

    /// True for every failure of the impersonation state machine itself.
    ///
    /// A tampered session is one of these; collaborator, configuration and
    /// request-gate failures are not.
    pub fn is_impersonation_failure(&self) -> bool {
        matches!(
            self,
            Self::NotEnabled
                | Self::AlreadyImpersonating
                | Self::NotImpersonating
                | Self::CannotImpersonate
                | Self::CannotBeImpersonated
                | Self::Expired
                | Self::TamperedSession
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotEnabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::AlreadyImpersonating => StatusCode::CONFLICT,
            Self::NotImpersonating => StatusCode::BAD_REQUEST,
            Self::CannotImpersonate | Self::CannotBeImpersonated | Self::Forbidden(_) => {
                StatusCode::FORBIDDEN
            }
            Self::Expired | Self::TamperedSession => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Configuration(_) | Self::Collaborator(_) | Self::Internal(_) | Self::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message that is safe to return to a client.
    ///
    /// Server-side failures are reduced to a generic message; the full error
    /// is only written to the log.
    fn safe_message(&self) -> String {
        match self {
            Self::Configuration(_) | Self::Collaborator(_) | Self::Internal(_) | Self::Anyhow(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ImpersonationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Impersonation request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Impersonation request rejected"
            );
        }

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for the impersonation core.
pub type Result<T> = std::result::Result<T, ImpersonationError>;

impl From<serde_json::Error> for ImpersonationError {
    fn from(err: serde_json::Error) -> Self {
        ImpersonationError::Internal(format!("JSON serialization error: {}", err))
    }
}
