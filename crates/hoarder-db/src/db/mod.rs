//! Postgres plumbing: pools, migrations, schema and the store implementations.

use std::future::Future;
use std::pin::Pin;

use crate::error::DbResult;

pub mod connection;
pub mod enums;
pub mod migrations;
pub mod query;
pub mod schema;
pub mod transaction;

/// Source of pooled connections for [`query::PgStore`].
pub trait DbProvider: Send + Sync {
    fn get_connection<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = DbResult<connection::DbConnection<'a>>> + Send + 'a>>;
}
