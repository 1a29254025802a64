use bcrypt::{hash, DEFAULT_COST};
use loco_rs::prelude::*;
use rust_decimal::Decimal;
use sea_orm::*;
use uuid::Uuid;

use crate::models::_entities::{prelude::*, users, voucher_codes};

pub struct DatabaseSeeder;

impl DatabaseSeeder {
    /// Seed the database with initial development data
    pub async fn seed_development(db: &DatabaseConnection) -> Result<()> {
        tracing::info!("Starting development database seeding...");

        let admin = Self::create_admin_user(db).await?;
        tracing::info!("Created admin user: {}", admin.email);

        let users = Self::create_test_users(db).await?;
        tracing::info!("Created {} test users", users.len());

        let codes = Self::create_voucher_codes(db, &users).await?;
        tracing::info!("Created {} voucher codes", codes);

        tracing::info!("Development database seeding completed successfully");
        Ok(())
    }

    pub async fn is_seeded(db: &DatabaseConnection) -> Result<bool> {
        let count = Users::find().count(db).await?;
        Ok(count > 0)
    }

    /// Clear all data for testing
    pub async fn clear_all(db: &DatabaseConnection) -> Result<()> {
        use crate::models::_entities::{
            blacklisted_tokens, user_sessions, voucher_audit_log, voucher_claims,
        };

        voucher_audit_log::Entity::delete_many().exec(db).await?;
        voucher_claims::Entity::delete_many().exec(db).await?;
        user_sessions::Entity::delete_many().exec(db).await?;
        blacklisted_tokens::Entity::delete_many().exec(db).await?;
        voucher_codes::Entity::delete_many().exec(db).await?;
        users::Entity::delete_many().exec(db).await?;
        Ok(())
    }

    async fn create_admin_user(db: &DatabaseConnection) -> Result<users::Model> {
        let password_hash = hash("admin123", DEFAULT_COST)
            .map_err(|e| Error::string(&format!("Failed to hash password: {}", e)))?;

        let admin = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set("admin@voucher.dev".to_string()),
            password: Set(password_hash),
            name: Set(Some("Admin".to_string())),
            role: Set("admin".to_string()),
            voucher_claimed: Set(0),
            voucher_limit: Set(100),
            is_premium: Set(true),
            is_active: Set(true),
            created_at: Set(chrono::Utc::now().naive_utc()),
            updated_at: Set(chrono::Utc::now().naive_utc()),
        };

        Ok(admin.insert(db).await?)
    }

    async fn create_test_users(db: &DatabaseConnection) -> Result<Vec<users::Model>> {
        let password_hash = hash("password123", DEFAULT_COST)
            .map_err(|e| Error::string(&format!("Failed to hash password: {}", e)))?;

        // (email, name, premium, limit)
        let test_users_data = vec![
            ("alice@example.com", "Alice Johnson", true, 10),
            ("bob@example.com", "Bob Smith", false, 10),
            ("charlie@example.com", "Charlie Brown", false, 5),
            ("diana@example.com", "Diana Wilson", true, 20),
        ];

        let mut created_users = Vec::new();

        for (email, name, premium, limit) in test_users_data {
            let user = users::ActiveModel {
                id: Set(Uuid::new_v4()),
                email: Set(email.to_string()),
                password: Set(password_hash.clone()),
                name: Set(Some(name.to_string())),
                role: Set("user".to_string()),
                voucher_claimed: Set(0),
                voucher_limit: Set(limit),
                is_premium: Set(premium),
                is_active: Set(true),
                created_at: Set(chrono::Utc::now().naive_utc()),
                updated_at: Set(chrono::Utc::now().naive_utc()),
            };

            created_users.push(user.insert(db).await?);
        }

        Ok(created_users)
    }

    /// A spread of codes covering the interesting claim paths: open, single
    /// use, restricted, expired, exhausted.
    async fn create_voucher_codes(db: &DatabaseConnection, users: &[users::Model]) -> Result<usize> {
        let now = chrono::Utc::now().naive_utc();
        let restricted_to: Vec<String> = users
            .iter()
            .take(2)
            .map(|u| u.id.to_string())
            .collect();

        let codes = vec![
            voucher_codes::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set("SUMMER2024".to_string()),
                description: Set(Some("Open seasonal promotion".to_string())),
                discount_type: Set("percentage".to_string()),
                discount_value: Set(Decimal::new(15, 0)),
                is_active: Set(true),
                usage_limit: Set(1000),
                usage_count: Set(0),
                is_used: Set(false),
                used_by: Set(None),
                used_at: Set(None),
                valid_from: Set(None),
                expires_at: Set(Some(now + chrono::Duration::days(90))),
                allowed_users: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            },
            voucher_codes::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set("FLASH20".to_string()),
                description: Set(Some("Single-use flash discount".to_string())),
                discount_type: Set("percentage".to_string()),
                discount_value: Set(Decimal::new(20, 0)),
                is_active: Set(true),
                usage_limit: Set(1),
                usage_count: Set(0),
                is_used: Set(false),
                used_by: Set(None),
                used_at: Set(None),
                valid_from: Set(None),
                expires_at: Set(None),
                allowed_users: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            },
            voucher_codes::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set("VIP-ONLY".to_string()),
                description: Set(Some("Restricted to selected users".to_string())),
                discount_type: Set("fixed".to_string()),
                discount_value: Set(Decimal::new(500, 2)),
                is_active: Set(true),
                usage_limit: Set(50),
                usage_count: Set(0),
                is_used: Set(false),
                used_by: Set(None),
                used_at: Set(None),
                valid_from: Set(None),
                expires_at: Set(None),
                allowed_users: Set(Some(serde_json::json!(restricted_to))),
                created_at: Set(now),
                updated_at: Set(now),
            },
            voucher_codes::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set("EXPIRED2023".to_string()),
                description: Set(Some("Past promotion kept for history".to_string())),
                discount_type: Set("percentage".to_string()),
                discount_value: Set(Decimal::new(10, 0)),
                is_active: Set(true),
                usage_limit: Set(100),
                usage_count: Set(0),
                is_used: Set(false),
                used_by: Set(None),
                used_at: Set(None),
                valid_from: Set(Some(now - chrono::Duration::days(400))),
                expires_at: Set(Some(now - chrono::Duration::days(30))),
                allowed_users: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            },
            voucher_codes::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set("DRAINED".to_string()),
                description: Set(Some("Fully consumed code".to_string())),
                discount_type: Set("percentage".to_string()),
                discount_value: Set(Decimal::new(5, 0)),
                is_active: Set(true),
                usage_limit: Set(10),
                usage_count: Set(10),
                is_used: Set(true),
                used_by: Set(None),
                used_at: Set(None),
                valid_from: Set(None),
                expires_at: Set(None),
                allowed_users: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            },
        ];

        let total = codes.len();
        for code in codes {
            code.insert(db).await?;
        }

        Ok(total)
    }
}
