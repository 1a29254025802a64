use sea_orm::*;
use uuid::Uuid;

use crate::errors::ClaimError;
use crate::models::_entities::{prelude::*, users, voucher_claims, voucher_codes};
use crate::models::voucher_claim::ClaimStatus;
use crate::models::{audit_log, user, voucher_claim};
use crate::services::store::StoreGateway;
use crate::services::Services;

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub claim_id: Uuid,
    pub reason: String,
    pub admin_id: Option<Uuid>,
}

pub struct RefundService;

impl RefundService {
    /// Reverses a successful claim. The claim row is locked first, then the
    /// owning user and the code in the system-wide user -> voucher_code
    /// order, so refunds never deadlock against in-flight claims.
    pub async fn refund(
        store: &StoreGateway,
        services: &Services,
        req: RefundRequest,
    ) -> Result<(), ClaimError> {
        let txn_req = req.clone();
        let owner = store
            .transact(move |txn| {
                Box::pin(async move {
                    let now = chrono::Utc::now().naive_utc();

                    let claim = voucher_claim::find_for_update(txn, txn_req.claim_id)
                        .await?
                        .ok_or_else(|| ClaimError::Validation("Claim not found".to_string()))?;
                    if claim.status == ClaimStatus::Refunded.as_str() {
                        return Err(ClaimError::Validation(
                            "Claim has already been refunded".to_string(),
                        ));
                    }
                    if claim.status != ClaimStatus::Success.as_str() {
                        return Err(ClaimError::Validation(
                            "Only successful claims can be refunded".to_string(),
                        ));
                    }

                    let owner_id = claim.user_id;
                    let claim_id = claim.id;
                    let code_id = claim.voucher_code_id;

                    let locked_user = user::find_for_update(txn, owner_id)
                        .await?
                        .ok_or(ClaimError::UserNotFound)?;
                    let new_claimed = (locked_user.voucher_claimed - 1).max(0);
                    let mut user_update: users::ActiveModel = locked_user.into();
                    user_update.voucher_claimed = Set(new_claimed);
                    user_update.updated_at = Set(now);
                    user_update.update(txn).await?;

                    if let Some(code_id) = code_id {
                        let locked_code = VoucherCodes::find_by_id(code_id)
                            .lock_exclusive()
                            .one(txn)
                            .await?;
                        if let Some(locked_code) = locked_code {
                            let new_usage = (locked_code.usage_count - 1).max(0);
                            let mut code_update: voucher_codes::ActiveModel = locked_code.into();
                            code_update.usage_count = Set(new_usage);
                            code_update.is_used = Set(false);
                            code_update.updated_at = Set(now);
                            code_update.update(txn).await?;
                        }
                    }

                    let mut claim_update: voucher_claims::ActiveModel = claim.into();
                    claim_update.status = Set(ClaimStatus::Refunded.as_str().to_string());
                    claim_update.refunded_at = Set(Some(now));
                    claim_update.refunded_by = Set(txn_req.admin_id);
                    claim_update.refund_reason = Set(Some(txn_req.reason.clone()));
                    claim_update.update(txn).await?;

                    let metadata = serde_json::json!({
                        "reason": txn_req.reason,
                        "admin_id": txn_req.admin_id,
                    });
                    audit_log::record(
                        txn,
                        audit_log::actions::REFUND,
                        Some(owner_id),
                        Some(claim_id),
                        Some(metadata),
                        None,
                        None,
                    )
                    .await?;

                    Ok(owner_id)
                })
            })
            .await?;

        if let Err(err) = services.cache.invalidate_user(owner).await {
            tracing::warn!(user_id = %owner, error = %err, "cache invalidation failed after refund");
        }

        metrics::counter!("voucher_refunds_total").increment(1);
        tracing::info!(claim_id = %req.claim_id, user_id = %owner, "voucher claim refunded");
        Ok(())
    }
}
