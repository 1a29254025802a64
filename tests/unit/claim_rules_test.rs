use rust_decimal::Decimal;
use uuid::Uuid;
use voucher_claim_backend::errors::{ClaimError, InvalidVoucherReason};
use voucher_claim_backend::models::_entities::voucher_codes;
use voucher_claim_backend::models::voucher_claim::{ClaimResult, ClaimStatus};
use voucher_claim_backend::models::voucher_code;

fn open_code(code: &str, usage_limit: i32) -> voucher_codes::Model {
    let now = chrono::Utc::now().naive_utc();
    voucher_codes::Model {
        id: Uuid::new_v4(),
        code: code.to_string(),
        description: None,
        discount_type: "percentage".to_string(),
        discount_value: Decimal::new(10, 0),
        is_active: true,
        usage_limit,
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
fn test_code_format_boundaries() {
    // lengths 6..=50 inclusive
    assert!(voucher_code::validate_format("ABCDEF").is_ok());
    assert!(voucher_code::validate_format(&"A".repeat(50)).is_ok());
    assert!(voucher_code::validate_format("ABCDE").is_err());
    assert!(voucher_code::validate_format(&"A".repeat(51)).is_err());
}

#[test]
fn test_code_format_charset() {
    assert!(voucher_code::validate_format("SUMMER-2024").is_ok());
    assert!(voucher_code::validate_format("summer2024").is_err());
    assert!(voucher_code::validate_format("SUMMER 2024").is_err());
    assert!(voucher_code::validate_format("SUMMER_2024").is_err());
    assert!(voucher_code::validate_format("ÉTÉ-2024").is_err());
}

#[test]
fn test_exhausted_code_reports_usage_limit() {
    let mut code = open_code("DRAINED-CODE", 10);
    code.usage_count = 10;
    let now = chrono::Utc::now().naive_utc();
    assert_eq!(
        voucher_code::eligibility(&code, Uuid::new_v4(), now),
        Err(InvalidVoucherReason::UsageLimitReached)
    );
}

#[test]
fn test_expiry_boundary_is_exclusive() {
    let now = chrono::Utc::now().naive_utc();
    let mut code = open_code("SUMMER2024", 100);

    // t == expires_at is already expired (t < expires_at required)
    code.expires_at = Some(now);
    assert_eq!(
        voucher_code::eligibility(&code, Uuid::new_v4(), now),
        Err(InvalidVoucherReason::Expired)
    );

    // valid_from == t admits (valid_from <= t)
    let mut code = open_code("SUMMER2024", 100);
    code.valid_from = Some(now);
    assert!(voucher_code::eligibility(&code, Uuid::new_v4(), now).is_ok());
}

#[test]
fn test_restriction_set_checks_membership() {
    let now = chrono::Utc::now().naive_utc();
    let vip = Uuid::new_v4();
    let mut code = open_code("VIP-ONLY-CODE", 10);
    code.allowed_users = Some(serde_json::json!([vip.to_string(), Uuid::new_v4().to_string()]));

    assert!(voucher_code::eligibility(&code, vip, now).is_ok());
    assert_eq!(
        voucher_code::eligibility(&code, Uuid::new_v4(), now),
        Err(InvalidVoucherReason::NotAllowed)
    );
}

#[test]
fn test_restriction_applies_even_when_otherwise_valid() {
    // an otherwise-eligible code still rejects a user outside allowed_users
    let now = chrono::Utc::now().naive_utc();
    let mut code = open_code("VIP-ONLY-CODE", 10);
    code.expires_at = Some(now + chrono::Duration::days(30));
    code.allowed_users = Some(serde_json::json!([Uuid::new_v4().to_string()]));
    assert_eq!(
        voucher_code::eligibility(&code, Uuid::new_v4(), now),
        Err(InvalidVoucherReason::NotAllowed)
    );
}

#[test]
fn test_invalid_voucher_maps_to_single_wire_code() {
    for reason in [
        InvalidVoucherReason::BadFormat,
        InvalidVoucherReason::Unknown,
        InvalidVoucherReason::Inactive,
        InvalidVoucherReason::Expired,
        InvalidVoucherReason::UsageLimitReached,
        InvalidVoucherReason::NotAllowed,
        InvalidVoucherReason::AlreadyClaimed,
    ] {
        let err = ClaimError::InvalidVoucher(reason);
        assert_eq!(err.code(), "INVALID_VOUCHER");
        assert_eq!(err.status().as_u16(), 400);
    }
}

#[test]
fn test_claim_result_camel_case_wire_format() {
    let owner = Uuid::new_v4();
    let result = ClaimResult {
        status: ClaimStatus::Success,
        request_id: "req-123".to_string(),
        user_id: owner,
        message: "Voucher claimed successfully".to_string(),
        vouchers_remaining: Some(4),
        claim_id: Some(Uuid::new_v4()),
    };
    let raw = serde_json::to_string(&result).unwrap();
    assert!(raw.contains("\"requestId\""));
    assert!(raw.contains("\"vouchersRemaining\""));
    assert!(!raw.contains("request_id"));

    // cached entries read back identically, which is what makes retries
    // observe the same outcome, and they carry the owner for scoped lookups
    let replay: ClaimResult = serde_json::from_str(&raw).unwrap();
    assert_eq!(replay.status, ClaimStatus::Success);
    assert_eq!(replay.vouchers_remaining, Some(4));
    assert_eq!(replay.user_id, owner);
}
