use service_core::error::AppError;
use thiserror::Error;

/// Failure taxonomy for the bridge core. Auth failures are terminal for the
/// request; only `RateLimited` is advertised as retryable.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid client credentials")]
    InvalidClient,

    #[error("Unsupported response_type. Only 'code' is supported.")]
    UnsupportedResponseType,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid, expired, or already used grant")]
    InvalidGrant,

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Session belongs to a different user")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Could not extract a valid Notion page ID from the provided input")]
    UnresolvableIdentifier,

    #[error("Write access is not permitted on this page")]
    WriteNotPermitted,

    #[error("Page is not approved, nor a descendant of an approved page")]
    NotApproved,

    #[error("Notion API error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::DatabaseError(e) => ServiceError::Database(e),
            other => ServiceError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidClient => {
                AppError::AuthError(anyhow::anyhow!("Invalid client credentials"))
            }
            ServiceError::UnsupportedResponseType => {
                AppError::BadRequest(anyhow::anyhow!("Unsupported response_type"))
            }
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::InvalidGrant => {
                AppError::BadRequest(anyhow::anyhow!("Invalid, expired, or already used grant"))
            }
            ServiceError::Unauthorized => {
                AppError::Unauthorized(anyhow::anyhow!("Missing or invalid bearer token"))
            }
            ServiceError::Forbidden => {
                AppError::Forbidden(anyhow::anyhow!("Session belongs to a different user"))
            }
            ServiceError::BadRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::RateLimited { retry_after_secs } => AppError::TooManyRequests(
                "Too many requests. Please try again in a moment.".to_string(),
                Some(retry_after_secs),
            ),
            ServiceError::UnresolvableIdentifier => {
                AppError::BadRequest(anyhow::anyhow!("Unresolvable Notion identifier"))
            }
            ServiceError::WriteNotPermitted => {
                AppError::Forbidden(anyhow::anyhow!("Write access is not permitted"))
            }
            ServiceError::NotApproved => {
                AppError::Forbidden(anyhow::anyhow!("Page is not approved"))
            }
            ServiceError::Upstream(msg) => AppError::BadGateway(msg),
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
