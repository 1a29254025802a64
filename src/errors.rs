use axum::http::StatusCode;
use sea_orm::TransactionError;
use serde::{Deserialize, Serialize};

/// Why a voucher code was rejected. Carried inside `ClaimError::InvalidVoucher`
/// so the boundary can log the precise reason while returning a single stable
/// error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidVoucherReason {
    BadFormat,
    Unknown,
    Inactive,
    NotYetValid,
    Expired,
    UsageLimitReached,
    NotAllowed,
    AlreadyClaimed,
}

impl std::fmt::Display for InvalidVoucherReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::BadFormat => "Voucher code format is invalid",
            Self::Unknown => "Voucher code does not exist",
            Self::Inactive => "Voucher code is not active",
            Self::NotYetValid => "Voucher code is not valid yet",
            Self::Expired => "Voucher code has expired",
            Self::UsageLimitReached => "Voucher code usage limit reached",
            Self::NotAllowed => "Voucher code is not available for this user",
            Self::AlreadyClaimed => "Voucher code was already claimed by this user",
        };
        write!(f, "{}", msg)
    }
}

/// The closed error sum of the claim pipeline. Only the HTTP boundary maps
/// these onto status codes and wire codes.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("voucher claim limit reached")]
    LimitExceeded,

    #[error("rate limit exceeded")]
    RateLimited {
        limit: u32,
        remaining: u32,
        reset_ms: i64,
        retry_after_secs: u64,
    },

    #[error("{0}")]
    InvalidVoucher(InvalidVoucherReason),

    #[error("user not found")]
    UserNotFound,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ClaimError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::InvalidVoucher(_) => "INVALID_VOUCHER",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::Validation(_) => "INVALID_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::LimitExceeded => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidVoucher(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to clients. Internal errors stay opaque unless the
    /// caller opts into surfacing them (development environments).
    pub fn client_message(&self, expose_internal: bool) -> String {
        match self {
            Self::Internal(err) if expose_internal => err.to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<sea_orm::DbErr> for ClaimError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<redis::RedisError> for ClaimError {
    fn from(err: redis::RedisError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<TransactionError<ClaimError>> for ClaimError {
    fn from(err: TransactionError<ClaimError>) -> Self {
        match err {
            TransactionError::Connection(db) => db.into(),
            TransactionError::Transaction(claim) => claim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(ClaimError::LimitExceeded.code(), "LIMIT_EXCEEDED");
        assert_eq!(
            ClaimError::InvalidVoucher(InvalidVoucherReason::Expired).code(),
            "INVALID_VOUCHER"
        );
        let rate = ClaimError::RateLimited {
            limit: 10,
            remaining: 0,
            reset_ms: 0,
            retry_after_secs: 30,
        };
        assert_eq!(rate.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(rate.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ClaimError::LimitExceeded.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ClaimError::InvalidVoucher(InvalidVoucherReason::AlreadyClaimed).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ClaimError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_message_is_opaque_in_production() {
        let err = ClaimError::Internal(anyhow::anyhow!("connection refused"));
        assert_eq!(err.client_message(false), "Internal server error");
        assert_eq!(err.client_message(true), "connection refused");
    }
}
