//! Transaction helper for multi-table writes.
//!
//! ```rust,ignore
//! use diesel_async::scoped_futures::ScopedFutureExt;
//!
//! with_transaction(&mut conn, |conn| async move {
//!     upsert_accounts(conn, &batch).await?;
//!     mark_missing_deleted(conn, phone, &ids).await?;
//!     Ok(())
//! }.scope_boxed()).await?;
//! ```

use diesel_async::scoped_futures::ScopedBoxFuture;
use diesel_async::{AsyncConnection, AsyncPgConnection};

use crate::db::connection::DbConnection;
use crate::error::{DbError, DbResult};

/// ## Summary
/// Runs `callback` inside a database transaction and returns its result.
///
/// ## Errors
/// Returns any error produced by the closure, or errors raised while starting or committing
/// the transaction. The transaction is rolled back on error.
pub async fn with_transaction<'a, T, F>(conn: &mut DbConnection<'_>, callback: F) -> DbResult<T>
where
    F: for<'r> FnOnce(&'r mut AsyncPgConnection) -> ScopedBoxFuture<'a, 'r, DbResult<T>>
        + Send
        + 'a,
    T: Send + 'a,
{
    let conn: &mut AsyncPgConnection = conn;
    conn.transaction::<_, DbError, _>(callback).await
}
