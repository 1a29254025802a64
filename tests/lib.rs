pub mod unit;

// Test utilities and helpers
pub mod helpers {
    use voucher_claim_backend::config::AuthSettings;
    use voucher_claim_backend::middleware::auth;
    use voucher_claim_backend::models::user::User;

    pub fn test_auth_settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "test-secret-key".to_string(),
            token_expiration_secs: 3600,
        }
    }

    pub fn generate_test_jwt(user: &User) -> String {
        auth::generate_jwt_token(&user.id.to_string(), &user.role, &test_auth_settings())
            .expect("token generation")
    }

    pub fn test_user(claimed: i32, limit: i32, premium: bool) -> User {
        User {
            id: uuid::Uuid::new_v4(),
            email: "user@example.com".to_string(),
            name: None,
            role: "user".to_string(),
            claimed,
            limit,
            premium,
            active: true,
        }
    }
}
