pub mod auth_test;
pub mod breaker_test;
pub mod claim_rules_test;
