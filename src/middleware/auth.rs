use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use loco_rs::prelude::*;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::config::AuthSettings;
use crate::models::_entities::{blacklisted_tokens, prelude::*};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Subject (user ID)
    pub exp: usize,   // Expiration time
    pub iat: usize,   // Issued at
    pub jti: String,  // JWT ID for token revocation
    pub role: String, // User role for authorization
}

/// The authenticated caller as handlers see it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
    pub jti: String,
    pub expires_at: usize,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

fn unix_now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

/// Extract Bearer token from Authorization header
pub fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get(header::AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;

    if auth_str.starts_with("Bearer ") {
        Some(auth_str[7..].to_string())
    } else {
        None
    }
}

/// Validate JWT token and extract claims
pub fn validate_jwt_token(token: &str, secret: &str) -> Result<Claims> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| Error::Unauthorized(format!("JWT validation failed: {}", e)))?;

    Ok(token_data.claims)
}

/// Generate JWT token for an authenticated user
pub fn generate_jwt_token(user_id: &str, role: &str, config: &AuthSettings) -> Result<String> {
    let current_time = unix_now();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: current_time + config.token_expiration_secs as usize,
        iat: current_time,
        jti: Uuid::new_v4().to_string(),
        role: role.to_string(),
    };

    let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_ref());
    let header = Header::default();

    encode(&header, &claims, &encoding_key)
        .map_err(|e| Error::string(&format!("JWT generation failed: {}", e)))
}

/// Authenticate the request: bearer token, expiry, and the revocation list.
pub async fn require_user(db: &DatabaseConnection, headers: &HeaderMap) -> Result<AuthUser> {
    let settings = AuthSettings::from_env();

    let token = extract_token_from_headers(headers)
        .ok_or_else(|| Error::Unauthorized("Missing or invalid authorization header".to_string()))?;

    let claims = validate_jwt_token(&token, &settings.jwt_secret)?;

    if claims.exp < unix_now() {
        return Err(Error::Unauthorized("Token expired".to_string()));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| Error::Unauthorized("Invalid token subject".to_string()))?;

    let revoked = BlacklistedTokens::find()
        .filter(blacklisted_tokens::Column::TokenId.eq(claims.jti.clone()))
        .one(db)
        .await?;
    if revoked.is_some() {
        return Err(Error::Unauthorized("Token has been revoked".to_string()));
    }

    Ok(AuthUser {
        id: user_id,
        role: claims.role,
        jti: claims.jti,
        expires_at: claims.exp,
    })
}

/// Client identity: first `x-forwarded-for` entry, else `x-real-ip`, else the
/// socket peer (not exposed by the router, so "unknown" stands in).
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "test-secret".to_string(),
            token_expiration_secs: 3600,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let settings = test_settings();
        let user_id = Uuid::new_v4().to_string();
        let token = generate_jwt_token(&user_id, "user", &settings).unwrap();

        let claims = validate_jwt_token(&token, &settings.jwt_secret).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, "user");
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let settings = test_settings();
        let token = generate_jwt_token("user-1", "user", &settings).unwrap();
        assert!(validate_jwt_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_token_from_headers(&headers).as_deref(), Some("abc123"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert!(extract_token_from_headers(&headers).is_none());

        assert!(extract_token_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.9");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(client_ip(&headers), "198.51.100.2");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
