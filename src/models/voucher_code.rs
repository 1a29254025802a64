use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::*;
use uuid::Uuid;

use crate::errors::InvalidVoucherReason;
use crate::models::_entities::{prelude::*, voucher_codes};

static CODE_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9-]+$").unwrap());

const CODE_MIN_LEN: usize = 6;
const CODE_MAX_LEN: usize = 50;

/// Syntactic check only; does not touch the store.
pub fn validate_format(code: &str) -> Result<(), InvalidVoucherReason> {
    if code.len() < CODE_MIN_LEN || code.len() > CODE_MAX_LEN || !CODE_FORMAT.is_match(code) {
        return Err(InvalidVoucherReason::BadFormat);
    }
    Ok(())
}

/// Eligibility of a code for a user at a point in time. The claim transaction
/// re-runs this on the locked row; callers outside the transaction use it as
/// a fast rejection only.
pub fn eligibility(
    code: &voucher_codes::Model,
    user_id: Uuid,
    now: NaiveDateTime,
) -> Result<(), InvalidVoucherReason> {
    if !code.is_active {
        return Err(InvalidVoucherReason::Inactive);
    }
    if code.usage_count >= code.usage_limit {
        return Err(InvalidVoucherReason::UsageLimitReached);
    }
    if let Some(valid_from) = code.valid_from {
        if valid_from > now {
            return Err(InvalidVoucherReason::NotYetValid);
        }
    }
    if let Some(expires_at) = code.expires_at {
        if now >= expires_at {
            return Err(InvalidVoucherReason::Expired);
        }
    }
    if !allowed_users_contains(code, user_id) {
        return Err(InvalidVoucherReason::NotAllowed);
    }
    Ok(())
}

/// Empty or absent allowed_users means the code is open to everyone.
fn allowed_users_contains(code: &voucher_codes::Model, user_id: Uuid) -> bool {
    match code.allowed_users.as_ref().and_then(|v| v.as_array()) {
        None => true,
        Some(list) if list.is_empty() => true,
        Some(list) => {
            let needle = user_id.to_string();
            list.iter().any(|v| v.as_str() == Some(needle.as_str()))
        }
    }
}

pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<voucher_codes::Model>, DbErr> {
    VoucherCodes::find()
        .filter(voucher_codes::Column::Code.eq(code))
        .one(conn)
        .await
}

/// Lock the code row for the duration of the surrounding transaction. Always
/// taken after the user lock.
pub async fn find_by_code_for_update<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<voucher_codes::Model>, DbErr> {
    VoucherCodes::find()
        .filter(voucher_codes::Column::Code.eq(code))
        .lock_exclusive()
        .one(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn code_model() -> voucher_codes::Model {
        let now = chrono::Utc::now().naive_utc();
        voucher_codes::Model {
            id: Uuid::new_v4(),
            code: "SUMMER2024".to_string(),
            description: None,
            discount_type: "percentage".to_string(),
            discount_value: Decimal::new(10, 0),
            is_active: true,
            usage_limit: 1000,
            usage_count: 0,
            is_used: false,
            used_by: None,
            used_at: None,
            valid_from: None,
            expires_at: None,
            allowed_users: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_format_accepts_valid_codes() {
        assert!(validate_format("SUMMER2024").is_ok());
        assert!(validate_format("FLASH-20").is_ok());
        assert!(validate_format("ABC-123-XYZ").is_ok());
    }

    #[test]
    fn test_format_rejects_bad_codes() {
        assert_eq!(validate_format("abc123"), Err(InvalidVoucherReason::BadFormat));
        assert_eq!(validate_format("SHORT"), Err(InvalidVoucherReason::BadFormat));
        assert_eq!(validate_format("WITH SPACE"), Err(InvalidVoucherReason::BadFormat));
        assert_eq!(
            validate_format(&"X".repeat(51)),
            Err(InvalidVoucherReason::BadFormat)
        );
        assert_eq!(validate_format("CODE_1"), Err(InvalidVoucherReason::BadFormat));
    }

    #[test]
    fn test_eligibility_happy_path() {
        let now = chrono::Utc::now().naive_utc();
        assert!(eligibility(&code_model(), Uuid::new_v4(), now).is_ok());
    }

    #[test]
    fn test_eligibility_inactive() {
        let now = chrono::Utc::now().naive_utc();
        let mut code = code_model();
        code.is_active = false;
        assert_eq!(
            eligibility(&code, Uuid::new_v4(), now),
            Err(InvalidVoucherReason::Inactive)
        );
    }

    #[test]
    fn test_eligibility_exhausted() {
        let now = chrono::Utc::now().naive_utc();
        let mut code = code_model();
        code.usage_count = code.usage_limit;
        assert_eq!(
            eligibility(&code, Uuid::new_v4(), now),
            Err(InvalidVoucherReason::UsageLimitReached)
        );
    }

    #[test]
    fn test_eligibility_time_window() {
        let now = chrono::Utc::now().naive_utc();
        let mut code = code_model();
        code.valid_from = Some(now + chrono::Duration::hours(1));
        assert_eq!(
            eligibility(&code, Uuid::new_v4(), now),
            Err(InvalidVoucherReason::NotYetValid)
        );

        let mut code = code_model();
        code.expires_at = Some(now - chrono::Duration::hours(1));
        assert_eq!(
            eligibility(&code, Uuid::new_v4(), now),
            Err(InvalidVoucherReason::Expired)
        );

        // expiry is exclusive: t < expires_at admits
        let mut code = code_model();
        code.expires_at = Some(now + chrono::Duration::seconds(1));
        assert!(eligibility(&code, Uuid::new_v4(), now).is_ok());
    }

    #[test]
    fn test_eligibility_restricted_codes() {
        let now = chrono::Utc::now().naive_utc();
        let allowed = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut code = code_model();
        code.allowed_users = Some(serde_json::json!([allowed.to_string()]));
        assert!(eligibility(&code, allowed, now).is_ok());
        assert_eq!(
            eligibility(&code, other, now),
            Err(InvalidVoucherReason::NotAllowed)
        );

        // empty restriction set means open to everyone
        let mut code = code_model();
        code.allowed_users = Some(serde_json::json!([]));
        assert!(eligibility(&code, other, now).is_ok());
    }
}
