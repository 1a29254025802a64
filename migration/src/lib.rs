pub use sea_orm_migration::prelude::*;

mod m20240601_000001_create_users;
mod m20240601_000002_create_voucher_codes;
mod m20240601_000003_create_voucher_claims;
mod m20240601_000004_create_audit_log;
mod m20240601_000005_create_sessions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_users::Migration),
            Box::new(m20240601_000002_create_voucher_codes::Migration),
            Box::new(m20240601_000003_create_voucher_claims::Migration),
            Box::new(m20240601_000004_create_audit_log::Migration),
            Box::new(m20240601_000005_create_sessions::Migration),
        ]
    }
}
