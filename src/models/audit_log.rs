use sea_orm::*;
use uuid::Uuid;

use crate::models::_entities::voucher_audit_log;

/// Actions written by the services. Successful claim inserts are shadowed by
/// the store trigger instead.
pub mod actions {
    pub const LIMIT_REACHED: &str = "LIMIT_REACHED";
    pub const REFUND: &str = "REFUND";
}

/// Append an audit entry. The log is write-only for the core.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    action: &str,
    user_id: Option<Uuid>,
    claim_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<(), DbErr> {
    let entry = voucher_audit_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        claim_id: Set(claim_id),
        action: Set(action.to_string()),
        metadata: Set(metadata),
        ip_address: Set(ip_address.map(str::to_string)),
        user_agent: Set(user_agent.map(str::to_string)),
        created_at: Set(chrono::Utc::now().naive_utc()),
    };
    entry.insert(conn).await?;
    Ok(())
}
