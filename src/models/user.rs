use loco_rs::prelude::*;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::_entities::{prelude::*, users};

/// Read-side view of a user as the claim pipeline sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub claimed: i32,
    pub limit: i32,
    pub premium: bool,
    pub active: bool,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            role: model.role,
            claimed: model.voucher_claimed,
            limit: model.voucher_limit,
            premium: model.is_premium,
            active: model.is_active,
        }
    }
}

impl User {
    pub fn remaining(&self) -> i32 {
        (self.limit - self.claimed).max(0)
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Find user by ID
    pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<User>> {
        let user = Users::find_by_id(id).one(db).await?;
        Ok(user.map(User::from))
    }

    /// Find user by email
    pub async fn find_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<User>> {
        let user = Users::find()
            .filter(users::Column::Email.eq(email))
            .one(db)
            .await?;
        Ok(user.map(User::from))
    }
}

/// Lock the user row for the duration of the surrounding transaction.
/// Inactive users are treated as absent.
pub async fn find_active_for_update<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> std::result::Result<Option<users::Model>, DbErr> {
    Users::find_by_id(id)
        .filter(users::Column::IsActive.eq(true))
        .lock_exclusive()
        .one(conn)
        .await
}

/// Lock the user row regardless of active flag (refund path).
pub async fn find_for_update<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> std::result::Result<Option<users::Model>, DbErr> {
    Users::find_by_id(id).lock_exclusive().one(conn).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(claimed: i32, limit: i32) -> users::Model {
        users::Model {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            password: "hash".to_string(),
            name: Some("Alice".to_string()),
            role: "user".to_string(),
            voucher_claimed: claimed,
            voucher_limit: limit,
            is_premium: false,
            is_active: true,
            created_at: chrono::Utc::now().naive_utc(),
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let user = User::from(model(10, 10));
        assert_eq!(user.remaining(), 0);
        let user = User::from(model(3, 10));
        assert_eq!(user.remaining(), 7);
    }

    #[test]
    fn test_admin_role() {
        let mut m = model(0, 10);
        m.role = "admin".to_string();
        assert!(User::from(m).is_admin());
        assert!(!User::from(model(0, 10)).is_admin());
    }
}
