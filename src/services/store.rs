use std::future::Future;
use std::pin::Pin;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, QueryResult,
    Statement, TransactionTrait, Value,
};

use crate::errors::ClaimError;

/// Pooled access to the transactional store. Pool sizing and statement
/// timeouts come from the framework database configuration; this gateway owns
/// the two operations the pipeline needs plus a health probe.
pub struct StoreGateway {
    db: DatabaseConnection,
}

impl StoreGateway {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Raw parameterised query for the few reads that do not fit the entity
    /// layer (aggregations, maintenance reads).
    pub async fn query(&self, sql: &str, values: Vec<Value>) -> Result<Vec<QueryResult>, DbErr> {
        self.db
            .query_all(Statement::from_sql_and_values(DbBackend::Postgres, sql, values))
            .await
    }

    /// Runs `body` inside a transaction: commit on normal return, rollback on
    /// any error. Connection-level failures surface as `Internal`.
    pub async fn transact<F, T>(&self, body: F) -> Result<T, ClaimError>
    where
        F: for<'c> FnOnce(
                &'c DatabaseTransaction,
            ) -> Pin<Box<dyn Future<Output = Result<T, ClaimError>> + Send + 'c>>
            + Send,
        T: Send,
    {
        self.db
            .transaction(body)
            .await
            .map_err(ClaimError::from)
    }

    /// Trivial round-trip; never raises.
    pub async fn health(&self) -> bool {
        self.db.ping().await.is_ok()
    }
}
