pub mod auth;

pub use auth::{client_ip, generate_jwt_token, require_user, validate_jwt_token, AuthUser, Claims};
