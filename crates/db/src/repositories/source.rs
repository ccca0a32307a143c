//! Source transaction registry.
//!
//! Every non-manual journal entry points at a record in one of the source
//! tables. The journal checks the record exists before posting it.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, PaginatorTrait};

use tally_core::ledger::SourceType;

use crate::entities::{payments, purchases, sales, transfers};

/// Looks up source records by type and id.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// True when the record exists. Manual sources always exist.
    async fn exists(&self, source_type: SourceType, source_id: i64) -> Result<bool, DbErr>;
}

/// Registry backed by the source tables.
#[derive(Debug, Clone)]
pub struct PgSourceRegistry {
    db: DatabaseConnection,
}

impl PgSourceRegistry {
    /// Creates a registry over `db`.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SourceRegistry for PgSourceRegistry {
    async fn exists(&self, source_type: SourceType, source_id: i64) -> Result<bool, DbErr> {
        let count = match source_type {
            SourceType::Sale => sales::Entity::find_by_id(source_id).count(&self.db).await?,
            SourceType::Purchase => purchases::Entity::find_by_id(source_id).count(&self.db).await?,
            SourceType::Payment => payments::Entity::find_by_id(source_id).count(&self.db).await?,
            SourceType::Transfer => transfers::Entity::find_by_id(source_id).count(&self.db).await?,
            SourceType::Manual => return Ok(true),
        };
        Ok(count > 0)
    }
}
