use loco_rs::prelude::*;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::_entities::{prelude::*, voucher_claims};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of a queued claim job. The job id is the request id, which is what
/// makes retried submissions collapse onto one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimJob {
    pub request_id: String,
    pub user_id: Uuid,
    pub code: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

/// Outcome of a claim as cached under the request id and returned to clients.
/// Carries the owning user so result lookups can be scoped to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
    pub status: ClaimStatus,
    pub request_id: String,
    pub user_id: Uuid,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vouchers_remaining: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<Uuid>,
}

impl ClaimResult {
    pub fn pending(request_id: &str, user_id: Uuid) -> Self {
        Self {
            status: ClaimStatus::Pending,
            request_id: request_id.to_string(),
            user_id,
            message: "Claim accepted and queued for processing".to_string(),
            vouchers_remaining: None,
            claim_id: None,
        }
    }
}

/// Claim history for a user, newest first.
pub async fn history_for_user(
    db: &DatabaseConnection,
    user_id: Uuid,
) -> Result<Vec<voucher_claims::Model>> {
    let claims = VoucherClaims::find()
        .filter(voucher_claims::Column::UserId.eq(user_id))
        .order_by_desc(voucher_claims::Column::ClaimedAt)
        .all(db)
        .await?;
    Ok(claims)
}

/// True when the user already holds a successful claim for this code.
/// Runs inside the claim transaction against locked parent rows.
pub async fn has_success<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    code: &str,
) -> std::result::Result<bool, DbErr> {
    let existing = VoucherClaims::find()
        .filter(voucher_claims::Column::UserId.eq(user_id))
        .filter(voucher_claims::Column::VoucherCode.eq(code))
        .filter(voucher_claims::Column::Status.eq(ClaimStatus::Success.as_str()))
        .one(conn)
        .await?;
    Ok(existing.is_some())
}

/// Lock a claim row for the refund transaction.
pub async fn find_for_update<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> std::result::Result<Option<voucher_claims::Model>, DbErr> {
    VoucherClaims::find_by_id(id).lock_exclusive().one(conn).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_result_wire_shape() {
        let owner = Uuid::new_v4();
        let result = ClaimResult {
            status: ClaimStatus::Success,
            request_id: "r1".to_string(),
            user_id: owner,
            message: "Voucher claimed successfully".to_string(),
            vouchers_remaining: Some(9),
            claim_id: Some(Uuid::new_v4()),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["requestId"], "r1");
        assert_eq!(value["userId"], owner.to_string());
        assert_eq!(value["vouchersRemaining"], 9);
    }

    #[test]
    fn test_pending_result_omits_remaining() {
        let value = serde_json::to_value(ClaimResult::pending("r2", Uuid::new_v4())).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value.get("vouchersRemaining").is_none());
        assert!(value.get("claimId").is_none());
    }

    #[test]
    fn test_result_round_trips_through_cache_encoding() {
        let owner = Uuid::new_v4();
        let result = ClaimResult::pending("r3", owner);
        let raw = serde_json::to_string(&result).unwrap();
        let back: ClaimResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.status, ClaimStatus::Pending);
        assert_eq!(back.request_id, "r3");
        assert_eq!(back.user_id, owner);
    }
}
