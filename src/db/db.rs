// db/db.rs
use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};

use super::{Commit, ReferralStore};

#[derive(Debug, Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }

    /// Applies the schema in `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Pool size and idle connections, logged at startup.
    pub fn pool_status(&self) -> (u32, usize) {
        (self.pool.size(), self.pool.num_idle())
    }
}

/// A PostgreSQL transaction. Every directory call made through it runs on
/// the same connection and becomes visible only on `commit`.
pub struct PgUnitOfWork {
    pub(crate) tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUnitOfWork")
            .field("tx", &"Transaction<Postgres>")
            .finish()
    }
}

#[async_trait]
impl ReferralStore for DBClient {
    type Tx = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(PgUnitOfWork { tx })
    }
}

#[async_trait]
impl Commit for PgUnitOfWork {
    async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
