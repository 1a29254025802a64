use axum::http::HeaderMap;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;
use voucher_claim_backend::middleware::auth::{
    self, client_ip, validate_jwt_token, Claims,
};

use crate::helpers;

fn unix_now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

#[test]
fn test_generated_token_validates() {
    let user = helpers::test_user(0, 10, false);
    let token = helpers::generate_test_jwt(&user);

    let claims = validate_jwt_token(&token, "test-secret-key").unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.role, "user");
    assert!(claims.exp > claims.iat);
}

#[test]
fn test_expired_token_rejected() {
    // well past the default validation leeway
    let now = unix_now();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        exp: now - 600,
        iat: now - 4200,
        jti: Uuid::new_v4().to_string(),
        role: "user".to_string(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret("test-secret-key".as_ref()),
    )
    .unwrap();

    assert!(validate_jwt_token(&token, "test-secret-key").is_err());
}

#[test]
fn test_tampered_token_rejected() {
    let user = helpers::test_user(0, 10, false);
    let token = helpers::generate_test_jwt(&user);
    let mut tampered = token.clone();
    tampered.push('x');
    assert!(validate_jwt_token(&tampered, "test-secret-key").is_err());
}

#[test]
fn test_client_identity_extraction_order() {
    // first x-forwarded-for entry wins
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        "203.0.113.7, 70.41.3.18, 150.172.238.178".parse().unwrap(),
    );
    headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());
    assert_eq!(client_ip(&headers), "203.0.113.7");

    // x-real-ip is the fallback
    let mut headers = HeaderMap::new();
    headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());
    assert_eq!(client_ip(&headers), "198.51.100.1");

    // empty forwarded header falls through
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "".parse().unwrap());
    headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());
    assert_eq!(client_ip(&headers), "198.51.100.1");
}

#[test]
fn test_bearer_scheme_required() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Token abc".parse().unwrap());
    assert!(auth::extract_token_from_headers(&headers).is_none());

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer abc".parse().unwrap());
    assert_eq!(auth::extract_token_from_headers(&headers).as_deref(), Some("abc"));
}
