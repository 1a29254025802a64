use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use loco_rs::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::environment_is_development;
use crate::errors::ClaimError;
use crate::middleware::auth;
use crate::models::_entities::{blacklisted_tokens, prelude::*, user_sessions};
use crate::models::voucher_claim::{self, ClaimResult, ClaimStatus};
use crate::services::claim_service::{ClaimRequest, ClaimService};
use crate::services::rate_limiter::RateDecision;
use crate::services::refund_service::{RefundRequest, RefundService};
use crate::services::store::StoreGateway;
use crate::services::Services;

pub fn routes() -> Routes {
    Routes::new()
        .prefix("vouchers")
        .add("/claim", post(claim))
        .add("/claim/:request_id", get(claim_status))
        .add("/history", get(history))
        .add("/refund", post(refund))
        .add("/logout", post(logout))
        .add("/user/summary", get(user_summary))
        .add("/queue/metrics", get(queue_metrics))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimParams {
    pub voucher_code: String,
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundParams {
    pub claim_id: Uuid,
    pub reason: String,
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn error_response(err: &ClaimError, expose_internal: bool) -> Response {
    if err.is_internal() {
        tracing::error!(error = ?err, "claim pipeline failure");
    }
    let mut response = json_response(
        err.status(),
        json!({
            "success": false,
            "code": err.code(),
            "message": err.client_message(expose_internal),
        }),
    );
    if let ClaimError::RateLimited {
        limit,
        remaining,
        reset_ms,
        retry_after_secs,
    } = err
    {
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Limit", HeaderValue::from(*limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(*remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(*reset_ms));
        headers.insert("Retry-After", HeaderValue::from(*retry_after_secs));
    }
    response
}

fn apply_rate_headers(response: &mut Response, rate: &RateDecision) {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(rate.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(rate.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(rate.reset_ms));
}

/// Same body for "absent" and "not yours": a foreign request id must not be
/// distinguishable from an unknown one.
fn claim_not_found() -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        json!({
            "success": false,
            "code": "NOT_FOUND",
            "message": "No claim recorded for this request id",
        }),
    )
}

/// Client-supplied idempotency key, or a fresh one when absent.
fn request_id_from_headers(headers: &HeaderMap) -> std::result::Result<String, ClaimError> {
    match headers.get("idempotency-key").and_then(|v| v.to_str().ok()) {
        Some(raw) if raw.len() > 255 => Err(ClaimError::Validation(
            "Idempotency key must not exceed 255 characters".to_string(),
        )),
        Some(raw) if !raw.trim().is_empty() => Ok(raw.trim().to_string()),
        _ => Ok(Uuid::new_v4().to_string()),
    }
}

async fn shared_services(ctx: &AppContext) -> std::result::Result<&'static Services, Response> {
    Services::shared()
        .await
        .map_err(|err| error_response(&err, environment_is_development(ctx)))
}

/// Claim a voucher code. Premium users get the synchronous result; everyone
/// else is queued and polls the status endpoint.
async fn claim(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(params): Json<ClaimParams>,
) -> Result<Response> {
    let auth_user = auth::require_user(&ctx.db, &headers).await?;
    let expose_internal = environment_is_development(&ctx);
    let services = match shared_services(&ctx).await {
        Ok(services) => services,
        Err(response) => return Ok(response),
    };

    let request_id = match request_id_from_headers(&headers) {
        Ok(request_id) => request_id,
        Err(err) => return Ok(error_response(&err, expose_internal)),
    };
    let ip = auth::client_ip(&headers);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    tracing::info!(
        method = "POST",
        path = "/vouchers/claim",
        ip = %ip,
        user_id = %auth_user.id,
        request_id = %request_id,
        "claim request"
    );

    let request = ClaimRequest {
        user_id: auth_user.id,
        code: params.voucher_code.trim().to_string(),
        ip,
        user_agent,
        device_id: params.device_id,
        request_id,
    };

    match ClaimService::claim(&ctx, services, request).await {
        Ok(outcome) => {
            let status = match outcome.result.status {
                ClaimStatus::Pending => StatusCode::ACCEPTED,
                _ => StatusCode::OK,
            };
            let mut body = json!({
                "success": true,
                "message": outcome.result.message,
                "status": outcome.result.status,
                "requestId": outcome.result.request_id,
            });
            if let Some(remaining) = outcome.result.vouchers_remaining {
                body["vouchersRemaining"] = json!(remaining);
            }
            let mut response = json_response(status, body);
            if let Some(rate) = outcome.rate {
                apply_rate_headers(&mut response, &rate);
            }
            Ok(response)
        }
        Err(err) => Ok(error_response(&err, expose_internal)),
    }
}

/// Poll the outcome of a claim by its request id. Results are scoped to the
/// caller: another user's request id reads as not found.
async fn claim_status(
    State(ctx): State<AppContext>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let auth_user = auth::require_user(&ctx.db, &headers).await?;
    let expose_internal = environment_is_development(&ctx);
    let services = match shared_services(&ctx).await {
        Ok(services) => services,
        Err(response) => return Ok(response),
    };

    match services.cache.get_result::<ClaimResult>(&request_id).await {
        Ok(Some(result)) if result.user_id == auth_user.id => {
            return Ok(json_response(
                StatusCode::OK,
                json!({
                    "requestId": request_id,
                    "status": result.status,
                    "result": result,
                }),
            ));
        }
        Ok(Some(_)) => return Ok(claim_not_found()),
        Ok(None) => {}
        Err(err) => return Ok(error_response(&err, expose_internal)),
    }

    match services.queue.get(&request_id).await {
        Ok(Some(job)) if job.owned_by(auth_user.id) => Ok(json_response(
            StatusCode::OK,
            json!({
                "requestId": request_id,
                "status": job.state,
                "attempts": job.attempts,
                "result": job.result,
                "failReason": job.fail_reason,
            }),
        )),
        Ok(Some(_)) | Ok(None) => Ok(claim_not_found()),
        Err(err) => Ok(error_response(&err, expose_internal)),
    }
}

/// Claim history for the caller, newest first.
async fn history(State(ctx): State<AppContext>, headers: HeaderMap) -> Result<Response> {
    let auth_user = auth::require_user(&ctx.db, &headers).await?;
    let claims = voucher_claim::history_for_user(&ctx.db, auth_user.id).await?;
    let data: Vec<serde_json::Value> = claims
        .into_iter()
        .map(|claim| {
            json!({
                "id": claim.id,
                "voucherCode": claim.voucher_code,
                "status": claim.status,
                "requestId": claim.request_id,
                "claimedAt": claim.claimed_at,
                "refundedAt": claim.refunded_at,
            })
        })
        .collect();
    Ok(json_response(StatusCode::OK, json!({ "data": data })))
}

/// Admin-only reversal of a successful claim.
async fn refund(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(params): Json<RefundParams>,
) -> Result<Response> {
    let auth_user = auth::require_user(&ctx.db, &headers).await?;
    if !auth_user.is_admin() {
        return Ok(json_response(
            StatusCode::FORBIDDEN,
            json!({
                "success": false,
                "code": "FORBIDDEN",
                "message": "Admin role required",
            }),
        ));
    }
    let expose_internal = environment_is_development(&ctx);
    let services = match shared_services(&ctx).await {
        Ok(services) => services,
        Err(response) => return Ok(response),
    };
    let store = StoreGateway::new(ctx.db.clone());

    let request = RefundRequest {
        claim_id: params.claim_id,
        reason: params.reason,
        admin_id: Some(auth_user.id),
    };
    match RefundService::refund(&store, services, request).await {
        Ok(()) => Ok(json_response(
            StatusCode::OK,
            json!({ "success": true, "message": "Claim refunded" }),
        )),
        Err(err) => Ok(error_response(&err, expose_internal)),
    }
}

/// Revoke the presented token and drop its session.
async fn logout(State(ctx): State<AppContext>, headers: HeaderMap) -> Result<Response> {
    let auth_user = auth::require_user(&ctx.db, &headers).await?;

    let expires_at = chrono::DateTime::from_timestamp(auth_user.expires_at as i64, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| chrono::Utc::now().naive_utc());
    let entry = blacklisted_tokens::ActiveModel {
        id: Set(Uuid::new_v4()),
        token_id: Set(auth_user.jti.clone()),
        user_id: Set(Some(auth_user.id)),
        expires_at: Set(expires_at),
        blacklisted_at: Set(chrono::Utc::now().naive_utc()),
    };
    let inserted = BlacklistedTokens::insert(entry)
        .on_conflict(
            OnConflict::column(blacklisted_tokens::Column::TokenId)
                .do_nothing()
                .to_owned(),
        )
        .exec(&ctx.db)
        .await;
    match inserted {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(err) => return Err(err.into()),
    }

    UserSessions::delete_many()
        .filter(user_sessions::Column::TokenId.eq(auth_user.jti.clone()))
        .exec(&ctx.db)
        .await?;

    tracing::info!(user_id = %auth_user.id, "session terminated");
    Ok(json_response(
        StatusCode::OK,
        json!({ "success": true, "message": "Logged out" }),
    ))
}

/// Claim allowance snapshot for the caller.
async fn user_summary(State(ctx): State<AppContext>, headers: HeaderMap) -> Result<Response> {
    let auth_user = auth::require_user(&ctx.db, &headers).await?;
    let expose_internal = environment_is_development(&ctx);
    let services = match shared_services(&ctx).await {
        Ok(services) => services,
        Err(response) => return Ok(response),
    };
    let store = StoreGateway::new(ctx.db.clone());

    match ClaimService::load_user(&store, services, auth_user.id).await {
        Ok(user) => Ok(json_response(
            StatusCode::OK,
            json!({
                "id": user.id,
                "email": user.email,
                "claimed": user.claimed,
                "limit": user.limit,
                "remaining": user.remaining(),
                "premium": user.premium,
                "active": user.active,
            }),
        )),
        Err(err) => Ok(error_response(&err, expose_internal)),
    }
}

/// Operational snapshot: queue depth, cache counters, breaker state, claim
/// totals. Unauthenticated; consumed by dashboards.
async fn queue_metrics(State(ctx): State<AppContext>) -> Result<Response> {
    let expose_internal = environment_is_development(&ctx);
    let services = match shared_services(&ctx).await {
        Ok(services) => services,
        Err(response) => return Ok(response),
    };
    let store = StoreGateway::new(ctx.db.clone());

    let counts = match services.queue.counts().await {
        Ok(counts) => counts,
        Err(err) => return Ok(error_response(&err, expose_internal)),
    };
    let (hits, misses) = services.cache.counters();
    let breaker = services.breaker.state().await;

    let rows = store
        .query(
            "SELECT status, COUNT(*) AS total FROM voucher_claims GROUP BY status",
            vec![],
        )
        .await?;
    let mut claims_by_status = serde_json::Map::new();
    for row in rows {
        let status: String = row.try_get("", "status")?;
        let total: i64 = row.try_get("", "total")?;
        claims_by_status.insert(status, json!(total));
    }

    Ok(json_response(
        StatusCode::OK,
        json!({
            "queue": counts,
            "cache": { "hits": hits, "misses": misses },
            "circuitBreaker": breaker.as_str(),
            "store": { "healthy": store.health().await },
            "claims": claims_by_status,
        }),
    ))
}
