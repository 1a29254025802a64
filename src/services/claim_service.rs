use std::time::Instant;

use loco_rs::app::AppContext;
use sea_orm::*;
use uuid::Uuid;

use crate::errors::{ClaimError, InvalidVoucherReason};
use crate::models::_entities::{users, voucher_claims, voucher_codes};
use crate::models::voucher_claim::{ClaimJob, ClaimResult, ClaimStatus};
use crate::models::{audit_log, user, voucher_claim, voucher_code};
use crate::services::circuit_breaker::BreakerError;
use crate::services::rate_limiter::RateDecision;
use crate::services::store::StoreGateway;
use crate::services::Services;

/// One claim attempt as it arrives at the coordinator.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub user_id: Uuid,
    pub code: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
    pub request_id: String,
}

impl ClaimRequest {
    fn into_job(self) -> ClaimJob {
        ClaimJob {
            request_id: self.request_id,
            user_id: self.user_id,
            code: self.code,
            ip: self.ip,
            user_agent: self.user_agent,
            device_id: self.device_id,
        }
    }
}

/// Coordinator outcome plus the rate-limit state the boundary echoes back in
/// headers. Replays served from the idempotency store carry no rate state.
#[derive(Debug)]
pub struct ClaimOutcome {
    pub result: ClaimResult,
    pub rate: Option<RateDecision>,
}

struct TxnSuccess {
    claim_id: Uuid,
    new_claimed: i32,
    voucher_limit: i32,
}

pub struct ClaimService;

impl ClaimService {
    /// The synchronous front path: idempotency -> rate limits -> validation ->
    /// fast path or enqueue.
    pub async fn claim(
        ctx: &AppContext,
        services: &Services,
        req: ClaimRequest,
    ) -> Result<ClaimOutcome, ClaimError> {
        let store = StoreGateway::new(ctx.db.clone());
        let settings = &services.settings;

        // A retried request id short-circuits to the recorded outcome.
        if let Some(cached) = services
            .cache
            .get_result::<ClaimResult>(&req.request_id)
            .await?
        {
            tracing::info!(request_id = %req.request_id, "claim served from idempotency store");
            return Ok(ClaimOutcome {
                result: cached,
                rate: None,
            });
        }

        let rate = services
            .limiter
            .user_window(req.user_id, settings.user_rate_max, settings.user_rate_window_secs)
            .await?;
        if !rate.allowed {
            return Err(rate.deny_error());
        }

        let ip_rate = services
            .limiter
            .ip_window(&req.ip, settings.ip_rate_max, settings.ip_rate_window_secs)
            .await?;
        if !ip_rate.allowed {
            return Err(ip_rate.deny_error());
        }

        // Soft pre-check against the cached counter. Not authoritative; the
        // transaction repeats it on the locked row.
        let cached_count = match services.cache.get_count(req.user_id).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(user_id = %req.user_id, error = %err, "voucher counter cache unreadable");
                None
            }
        };

        let caller = Self::load_user(&store, services, req.user_id).await?;
        if !caller.active {
            return Err(ClaimError::UserNotFound);
        }
        if let Some(count) = cached_count {
            if count >= caller.limit {
                Self::record_limit_violation(&store, &req).await;
                return Err(ClaimError::LimitExceeded);
            }
        }

        voucher_code::validate_format(&req.code).map_err(ClaimError::InvalidVoucher)?;

        let code = voucher_code::find_by_code(store.connection(), &req.code)
            .await?
            .ok_or(ClaimError::InvalidVoucher(InvalidVoucherReason::Unknown))?;
        let now = chrono::Utc::now().naive_utc();
        voucher_code::eligibility(&code, req.user_id, now).map_err(ClaimError::InvalidVoucher)?;

        let request_id = req.request_id.clone();
        let job = req.into_job();

        if caller.premium {
            // Premium traffic takes the transaction synchronously, behind the
            // breaker so a struggling store sheds load fast. Domain outcomes
            // never trip it.
            let result = services
                .breaker
                .call_classified(
                    || Self::run_authoritative(&store, services, &job),
                    |err: &ClaimError| err.is_internal(),
                )
                .await
                .map_err(|err| match err {
                    BreakerError::Inner(inner) => inner,
                    BreakerError::Open => {
                        ClaimError::Internal(anyhow::anyhow!("claim path unavailable: circuit open"))
                    }
                    BreakerError::Timeout => {
                        ClaimError::Internal(anyhow::anyhow!("claim transaction timed out"))
                    }
                })?;
            Ok(ClaimOutcome {
                result,
                rate: Some(rate),
            })
        } else {
            services.queue.enqueue(ctx, &job).await?;
            Ok(ClaimOutcome {
                result: ClaimResult::pending(&request_id, job.user_id),
                rate: Some(rate),
            })
        }
    }

    /// Cache-or-store user load.
    pub async fn load_user(
        store: &StoreGateway,
        services: &Services,
        user_id: Uuid,
    ) -> Result<user::User, ClaimError> {
        match services.cache.get_user(user_id).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "user cache unreadable");
            }
        }
        let model = users::Entity::find_by_id(user_id)
            .one(store.connection())
            .await?
            .ok_or(ClaimError::UserNotFound)?;
        let loaded = user::User::from(model);
        if let Err(err) = services.cache.put_user(&loaded).await {
            tracing::warn!(%user_id, error = %err, "user cache write failed");
        }
        Ok(loaded)
    }

    /// The authoritative claim: runs the transaction, then settles cache and
    /// idempotency state from the committed values. Shared by the premium
    /// fast path and the queue worker.
    pub async fn run_authoritative(
        store: &StoreGateway,
        services: &Services,
        job: &ClaimJob,
    ) -> Result<ClaimResult, ClaimError> {
        let started = Instant::now();
        match Self::claim_transaction(store, job).await {
            Ok(success) => {
                if let Err(err) = services.cache.invalidate_user(job.user_id).await {
                    tracing::warn!(user_id = %job.user_id, error = %err, "cache invalidation failed after commit");
                }
                if let Err(err) = services
                    .cache
                    .put_count(job.user_id, success.new_claimed)
                    .await
                {
                    tracing::warn!(user_id = %job.user_id, error = %err, "counter cache write failed after commit");
                }

                let result = ClaimResult {
                    status: ClaimStatus::Success,
                    request_id: job.request_id.clone(),
                    user_id: job.user_id,
                    message: "Voucher claimed successfully".to_string(),
                    vouchers_remaining: Some((success.voucher_limit - success.new_claimed).max(0)),
                    claim_id: Some(success.claim_id),
                };
                if let Err(err) = services.cache.put_result(&job.request_id, &result).await {
                    tracing::warn!(request_id = %job.request_id, error = %err, "result cache write failed after commit");
                }

                metrics::counter!("voucher_claims_success_total").increment(1);
                metrics::histogram!("voucher_claim_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    claim_id = %success.claim_id,
                    user_id = %job.user_id,
                    code = %job.code,
                    "voucher claim committed"
                );
                Ok(result)
            }
            Err(ClaimError::LimitExceeded) => {
                Self::record_limit_violation_for_job(store, job).await;
                Err(ClaimError::LimitExceeded)
            }
            Err(other) => Err(other),
        }
    }

    /// Transaction body per the locked two-entity protocol. Lock order is
    /// user -> voucher_code everywhere, including refunds.
    async fn claim_transaction(
        store: &StoreGateway,
        job: &ClaimJob,
    ) -> Result<TxnSuccess, ClaimError> {
        let job = job.clone();
        store
            .transact(move |txn| {
                Box::pin(async move {
                    let now = chrono::Utc::now().naive_utc();

                    let locked_user = user::find_active_for_update(txn, job.user_id)
                        .await?
                        .ok_or(ClaimError::UserNotFound)?;
                    if locked_user.voucher_claimed >= locked_user.voucher_limit {
                        return Err(ClaimError::LimitExceeded);
                    }

                    let locked_code = voucher_code::find_by_code_for_update(txn, &job.code)
                        .await?
                        .ok_or(ClaimError::InvalidVoucher(InvalidVoucherReason::Unknown))?;
                    voucher_code::eligibility(&locked_code, job.user_id, now)
                        .map_err(ClaimError::InvalidVoucher)?;

                    if voucher_claim::has_success(txn, job.user_id, &job.code).await? {
                        return Err(ClaimError::InvalidVoucher(InvalidVoucherReason::AlreadyClaimed));
                    }

                    let new_claimed = locked_user.voucher_claimed + 1;
                    let voucher_limit = locked_user.voucher_limit;
                    let code_id = locked_code.id;
                    let usage_limit = locked_code.usage_limit;
                    let new_usage = locked_code.usage_count + 1;
                    let single_use = usage_limit == 1;

                    let mut user_update: users::ActiveModel = locked_user.into();
                    user_update.voucher_claimed = Set(new_claimed);
                    user_update.updated_at = Set(now);
                    user_update.update(txn).await?;

                    let mut code_update: voucher_codes::ActiveModel = locked_code.into();
                    code_update.usage_count = Set(new_usage);
                    code_update.is_used = Set(new_usage >= usage_limit);
                    if single_use {
                        code_update.used_by = Set(Some(job.user_id));
                        code_update.used_at = Set(Some(now));
                    }
                    code_update.updated_at = Set(now);
                    code_update.update(txn).await?;

                    let claim = voucher_claims::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        user_id: Set(job.user_id),
                        voucher_code: Set(job.code.clone()),
                        voucher_code_id: Set(Some(code_id)),
                        status: Set(ClaimStatus::Success.as_str().to_string()),
                        ip_address: Set(Some(job.ip.clone())),
                        user_agent: Set(job.user_agent.clone()),
                        device_id: Set(job.device_id.clone()),
                        request_id: Set(job.request_id.clone()),
                        claimed_at: Set(now),
                        refunded_at: Set(None),
                        refunded_by: Set(None),
                        refund_reason: Set(None),
                    };
                    let inserted = claim.insert(txn).await?;

                    Ok(TxnSuccess {
                        claim_id: inserted.id,
                        new_claimed,
                        voucher_limit,
                    })
                })
            })
            .await
    }

    async fn record_limit_violation(store: &StoreGateway, req: &ClaimRequest) {
        Self::audit_limit_reached(
            store,
            req.user_id,
            &req.code,
            &req.request_id,
            Some(req.ip.as_str()),
            req.user_agent.as_deref(),
        )
        .await;
    }

    async fn record_limit_violation_for_job(store: &StoreGateway, job: &ClaimJob) {
        Self::audit_limit_reached(
            store,
            job.user_id,
            &job.code,
            &job.request_id,
            Some(job.ip.as_str()),
            job.user_agent.as_deref(),
        )
        .await;
    }

    /// The rejecting transaction rolled back, so the audit entry is written
    /// on its own connection afterwards.
    async fn audit_limit_reached(
        store: &StoreGateway,
        user_id: Uuid,
        code: &str,
        request_id: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) {
        metrics::counter!("voucher_claim_limit_violations_total").increment(1);
        let metadata = serde_json::json!({
            "voucher_code": code,
            "request_id": request_id,
        });
        if let Err(err) = audit_log::record(
            store.connection(),
            audit_log::actions::LIMIT_REACHED,
            Some(user_id),
            None,
            Some(metadata),
            ip,
            user_agent,
        )
        .await
        {
            tracing::error!(%user_id, error = %err, "failed to write limit-reached audit entry");
        }
    }
}
