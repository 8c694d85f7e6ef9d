//! Fiscal receipts queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{exists, max, not};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;

use super::PgStore;
use crate::db::DbProvider;
use crate::db::schema::lkdr::{brands, fiscal_data, fiscal_data_items, receipts, tokens, users};
use crate::db::transaction::with_transaction;
use crate::error::DbResult;
use crate::model::lkdr::{Brand, Receipt, Tokens, User};
use crate::store::{FiscalDataRecord, FiscalStore};

#[async_trait]
impl FiscalStore for PgStore {
    async fn upsert_user(&self, phone: &str) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::insert_into(users::table)
            .values(User {
                phone: phone.to_owned(),
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_tokens(&self, phone: &str) -> DbResult<Option<Tokens>> {
        let mut conn = self.pool.get_connection().await?;
        let row = tokens::table
            .find(phone)
            .select(Tokens::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    #[tracing::instrument(skip(self, row))]
    async fn store_tokens(&self, phone: &str, row: Option<Tokens>) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        match row {
            Some(row) => {
                diesel::insert_into(tokens::table)
                    .values(&row)
                    .on_conflict(tokens::phone)
                    .do_update()
                    .set(&row)
                    .execute(&mut conn)
                    .await?;
            }
            None => {
                diesel::delete(tokens::table.find(phone))
                    .execute(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn latest_receive_date(&self, phone: &str) -> DbResult<Option<DateTime<Utc>>> {
        let mut conn = self.pool.get_connection().await?;
        let latest = receipts::table
            .filter(receipts::user_phone.eq(phone))
            .select(max(receipts::receive_date))
            .first::<Option<DateTime<Utc>>>(&mut conn)
            .await?;
        Ok(latest)
    }

    #[tracing::instrument(skip(self, brand_rows, receipt_rows), fields(receipts = receipt_rows.len()))]
    async fn upsert_receipts(&self, brand_rows: &[Brand], receipt_rows: &[Receipt]) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                for brand in brand_rows {
                    diesel::insert_into(brands::table)
                        .values(brand)
                        .on_conflict(brands::id)
                        .do_update()
                        .set(brand)
                        .execute(conn)
                        .await?;
                }
                for receipt in receipt_rows {
                    diesel::insert_into(receipts::table)
                        .values(receipt)
                        .on_conflict(receipts::key)
                        .do_update()
                        .set(receipt)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn receipts_without_fiscal_data(
        &self,
        phone: &str,
        offset: i64,
        limit: i64,
    ) -> DbResult<Vec<String>> {
        let mut conn = self.pool.get_connection().await?;
        let keys = receipts::table
            .filter(receipts::user_phone.eq(phone))
            .filter(not(exists(
                fiscal_data::table.filter(fiscal_data::receipt_key.eq(receipts::key)),
            )))
            .order((receipts::receive_date.asc(), receipts::key.asc()))
            .offset(offset)
            .limit(limit)
            .select(receipts::key)
            .load::<String>(&mut conn)
            .await?;
        Ok(keys)
    }

    #[tracing::instrument(skip(self, record), fields(key = %record.fiscal_data.receipt_key))]
    async fn save_fiscal_data(&self, record: &FiscalDataRecord) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                let data = &record.fiscal_data;
                diesel::insert_into(fiscal_data::table)
                    .values(data)
                    .on_conflict(fiscal_data::receipt_key)
                    .do_update()
                    .set(data)
                    .execute(conn)
                    .await?;
                diesel::delete(
                    fiscal_data_items::table
                        .filter(fiscal_data_items::receipt_key.eq(&data.receipt_key)),
                )
                .execute(conn)
                .await?;
                if !record.items.is_empty() {
                    diesel::insert_into(fiscal_data_items::table)
                        .values(&record.items)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }
}
