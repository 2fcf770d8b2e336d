use axum::http::StatusCode;
use thiserror::Error;

use crate::{
    error::{ErrorMessage, HttpError},
    models::affiliatemodel::AffiliateStatus,
};

/// Who already holds an email address.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailHolder {
    Affiliate { full_name: String, status: AffiliateStatus },
    Downline { full_name: String },
}

impl EmailHolder {
    pub fn kind(&self) -> &'static str {
        match self {
            EmailHolder::Affiliate { .. } => "affiliate_exists",
            EmailHolder::Downline { .. } => "downline_exists",
        }
    }
}

impl std::fmt::Display for EmailHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailHolder::Affiliate { full_name, status } => {
                write!(f, "affiliate: {} (Status: {})", full_name, status)
            }
            EmailHolder::Downline { full_name } => write!(f, "downline: {}", full_name),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Affiliate {0} not found")]
    AffiliateNotFound(i32),

    #[error("Affiliate with code {0} not found")]
    AffiliateCodeNotFound(String),

    #[error("Downline {0} not found")]
    DownlineNotFound(i32),

    #[error("Email already exists as {0}")]
    EmailTaken(EmailHolder),

    #[error("MT5 rebate account {0} is already registered")]
    Mt5AccountTaken(String),

    #[error("Invalid Sub1 affiliate code or affiliate not approved: {0}")]
    InvalidReferrer(String),

    #[error("Affiliate {affiliate_id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        affiliate_id: i32,
        from: AffiliateStatus,
        to: AffiliateStatus,
    },

    #[error("Invalid verification token")]
    InvalidVerificationToken,

    #[error("Verification token expired")]
    VerificationTokenExpired,

    #[error("Referral tree integrity violated: {0}")]
    Integrity(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        let unique_violation = error
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);

        if unique_violation {
            ServiceError::Conflict(error.to_string())
        } else {
            ServiceError::Database(error)
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::AffiliateNotFound(_)
            | ServiceError::AffiliateCodeNotFound(_)
            | ServiceError::DownlineNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::EmailTaken(_)
            | ServiceError::Mt5AccountTaken(_)
            | ServiceError::Conflict(_) => StatusCode::CONFLICT,

            ServiceError::InvalidReferrer(_)
            | ServiceError::InvalidStatusTransition { .. }
            | ServiceError::InvalidVerificationToken
            | ServiceError::VerificationTokenExpired
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::Integrity(_) | ServiceError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Database(e) => {
                tracing::error!("Database error: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
            ServiceError::Integrity(ref reason) => {
                tracing::error!("Referral tree integrity error: {}", reason);
                HttpError::server_error(ErrorMessage::TreeNeedsCleanup.to_string())
            }
            ServiceError::EmailTaken(ref holder) => {
                HttpError::unique_constraint_violation(error.to_string()).with_kind(holder.kind())
            }
            ServiceError::AffiliateNotFound(_)
            | ServiceError::AffiliateCodeNotFound(_)
            | ServiceError::DownlineNotFound(_) => HttpError::not_found(error.to_string()),
            ServiceError::InvalidReferrer(_) => {
                HttpError::bad_request(ErrorMessage::InvalidReferrer.to_string())
            }
            _ => HttpError::new(error.to_string(), error.status_code()),
        }
    }
}
