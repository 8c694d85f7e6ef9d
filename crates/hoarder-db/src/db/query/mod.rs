//! Postgres implementations of the store traits.

use crate::db::connection::DbPool;

pub mod lkdr;
pub mod mirror;
pub mod tinkoff;

/// Store backed by a connection pool of one database family.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
