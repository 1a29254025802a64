use loco_rs::app::AppContext;
use loco_rs::environment::Environment;

pub mod app;
pub mod config;
pub mod controllers;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod seeders;
pub mod services;
pub mod workers;

/// Internal error details are only surfaced to clients in development.
pub fn environment_is_development(ctx: &AppContext) -> bool {
    matches!(ctx.environment, Environment::Development)
}
