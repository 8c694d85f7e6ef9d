//! Bank data queries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::PgStore;
use crate::db::DbProvider;
use crate::db::enums::STATUS_OK;
use crate::db::schema::tinkoff::{
    account_requisites, accounts, brands, cards, categories, client_offer_accounts,
    client_offer_essence_mcc_codes, client_offer_essences, client_offers, currencies,
    invest_accounts, invest_child_operations, invest_operation_types, invest_operations,
    invest_trades, operation_additional_info, operation_locations, operation_loyalty_bonuses,
    operation_loyalty_payments, operation_payment_fields, operation_payments, operations,
    receipt_items, receipts, sessions, spending_categories, statements, subgroups, users,
};
use crate::db::transaction::with_transaction;
use crate::error::DbResult;
use crate::model::tinkoff::account::{AccountRequisites, Statement};
use crate::model::tinkoff::invest::{InvestAccount, InvestOperationType};
use crate::model::tinkoff::reference::NewCurrency;
use crate::model::tinkoff::user::{Session, User};
use crate::store::{
    AccountsBatch, BankStore, ClientOffersBatch, InvestOperationRecord, OperationRecord,
    OperationReferences, OperationsBatch, ReceiptRecord,
};

async fn upsert_currencies(
    conn: &mut AsyncPgConnection,
    currencies_: &[NewCurrency],
) -> DbResult<()> {
    for currency in currencies_ {
        diesel::insert_into(currencies::table)
            .values(currency)
            .on_conflict(currencies::code)
            .do_update()
            .set(currency)
            .execute(conn)
            .await?;
    }
    Ok(())
}

async fn upsert_references(
    conn: &mut AsyncPgConnection,
    references: &OperationReferences,
) -> DbResult<()> {
    upsert_currencies(conn, &references.currencies).await?;

    for brand in &references.brands {
        diesel::insert_into(brands::table)
            .values(brand)
            .on_conflict(brands::id)
            .do_update()
            .set(brand)
            .execute(conn)
            .await?;
    }
    for category in &references.spending_categories {
        diesel::insert_into(spending_categories::table)
            .values(category)
            .on_conflict(spending_categories::id)
            .do_update()
            .set(category)
            .execute(conn)
            .await?;
    }
    for category in &references.categories {
        diesel::insert_into(categories::table)
            .values(category)
            .on_conflict(categories::id)
            .do_update()
            .set(category)
            .execute(conn)
            .await?;
    }
    for subgroup in &references.subgroups {
        diesel::insert_into(subgroups::table)
            .values(subgroup)
            .on_conflict(subgroups::id)
            .do_update()
            .set(subgroup)
            .execute(conn)
            .await?;
    }
    Ok(())
}

async fn upsert_operation(conn: &mut AsyncPgConnection, record: &OperationRecord) -> DbResult<()> {
    let operation = &record.operation;
    diesel::insert_into(operations::table)
        .values(operation)
        .on_conflict(operations::id)
        .do_update()
        .set(operation)
        .execute(conn)
        .await?;

    let id = operation.id.as_str();
    diesel::delete(operation_payments::table.filter(operation_payments::operation_id.eq(id)))
        .execute(conn)
        .await?;
    diesel::delete(operation_locations::table.filter(operation_locations::operation_id.eq(id)))
        .execute(conn)
        .await?;
    diesel::delete(
        operation_additional_info::table.filter(operation_additional_info::operation_id.eq(id)),
    )
    .execute(conn)
    .await?;
    diesel::delete(
        operation_loyalty_bonuses::table.filter(operation_loyalty_bonuses::operation_id.eq(id)),
    )
    .execute(conn)
    .await?;
    diesel::delete(
        operation_loyalty_payments::table.filter(operation_loyalty_payments::operation_id.eq(id)),
    )
    .execute(conn)
    .await?;

    if let Some(payment) = &record.payment {
        diesel::insert_into(operation_payments::table)
            .values(payment)
            .execute(conn)
            .await?;
        if !record.payment_fields.is_empty() {
            diesel::insert_into(operation_payment_fields::table)
                .values(&record.payment_fields)
                .execute(conn)
                .await?;
        }
    }
    if !record.locations.is_empty() {
        diesel::insert_into(operation_locations::table)
            .values(&record.locations)
            .execute(conn)
            .await?;
    }
    if !record.additional_info.is_empty() {
        diesel::insert_into(operation_additional_info::table)
            .values(&record.additional_info)
            .execute(conn)
            .await?;
    }
    if !record.loyalty_bonuses.is_empty() {
        diesel::insert_into(operation_loyalty_bonuses::table)
            .values(&record.loyalty_bonuses)
            .execute(conn)
            .await?;
    }
    if !record.loyalty_payments.is_empty() {
        diesel::insert_into(operation_loyalty_payments::table)
            .values(&record.loyalty_payments)
            .execute(conn)
            .await?;
    }
    Ok(())
}

async fn upsert_invest_operation(
    conn: &mut AsyncPgConnection,
    record: &InvestOperationRecord,
) -> DbResult<()> {
    let operation = &record.operation;
    diesel::insert_into(invest_operations::table)
        .values(operation)
        .on_conflict(invest_operations::id)
        .do_update()
        .set(operation)
        .execute(conn)
        .await?;

    let id = operation.id.as_str();
    diesel::delete(invest_trades::table.filter(invest_trades::operation_id.eq(id)))
        .execute(conn)
        .await?;
    diesel::delete(
        invest_child_operations::table.filter(invest_child_operations::operation_id.eq(id)),
    )
    .execute(conn)
    .await?;

    if !record.trades.is_empty() {
        diesel::insert_into(invest_trades::table)
            .values(&record.trades)
            .execute(conn)
            .await?;
    }
    if !record.children.is_empty() {
        diesel::insert_into(invest_child_operations::table)
            .values(&record.children)
            .execute(conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl BankStore for PgStore {
    #[tracing::instrument(skip(self, user), fields(phone = %user.phone))]
    async fn upsert_user(&self, user: &User) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::insert_into(users::table)
            .values(user)
            .on_conflict(users::phone)
            .do_update()
            .set(user)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_session(&self, phone: &str) -> DbResult<Option<Session>> {
        let mut conn = self.pool.get_connection().await?;
        let session = sessions::table
            .find(phone)
            .select(Session::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(session)
    }

    #[tracing::instrument(skip(self, session))]
    async fn store_session(&self, phone: &str, session: Option<Session>) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        match session {
            Some(session) => {
                diesel::insert_into(sessions::table)
                    .values(&session)
                    .on_conflict(sessions::phone)
                    .do_update()
                    .set(&session)
                    .execute(&mut conn)
                    .await?;
            }
            None => {
                diesel::delete(sessions::table.find(phone))
                    .execute(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, batch), fields(accounts = batch.accounts.len()))]
    async fn sync_accounts(&self, phone: &str, batch: &AccountsBatch) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                upsert_currencies(conn, &batch.currencies).await?;

                for account in &batch.accounts {
                    diesel::insert_into(accounts::table)
                        .values(account)
                        .on_conflict(accounts::id)
                        .do_update()
                        .set(account)
                        .execute(conn)
                        .await?;
                }

                let ids: Vec<&str> = batch.accounts.iter().map(|a| a.id.as_str()).collect();
                let deleted = diesel::update(
                    accounts::table
                        .filter(accounts::user_phone.eq(phone))
                        .filter(accounts::id.ne_all(ids)),
                )
                .set(accounts::deleted.eq(true))
                .execute(conn)
                .await?;
                if deleted > 0 {
                    tracing::info!(count = deleted, "Accounts marked deleted");
                }

                for card in &batch.cards {
                    diesel::insert_into(cards::table)
                        .values(card)
                        .on_conflict(cards::id)
                        .do_update()
                        .set(card)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn upsert_requisites(&self, requisites: &AccountRequisites) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::insert_into(account_requisites::table)
            .values(requisites)
            .on_conflict(account_requisites::account_id)
            .do_update()
            .set(requisites)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn upsert_statements(&self, rows: &[Statement]) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                for statement in rows {
                    diesel::insert_into(statements::table)
                        .values(statement)
                        .on_conflict(statements::id)
                        .do_update()
                        .set(statement)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn latest_operation_time(&self, account_id: &str) -> DbResult<Option<DateTime<Utc>>> {
        let mut conn = self.pool.get_connection().await?;
        let latest = operations::table
            .filter(operations::account_id.eq(account_id))
            .filter(operations::status.eq(STATUS_OK))
            .select(max(operations::operation_time))
            .first::<Option<DateTime<Utc>>>(&mut conn)
            .await?;
        Ok(latest)
    }

    #[tracing::instrument(skip(self, batch), fields(operations = batch.operations.len()))]
    async fn replace_operations(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
        batch: &OperationsBatch,
    ) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                let removed = diesel::delete(
                    operations::table
                        .filter(operations::account_id.eq(account_id))
                        .filter(operations::status.eq(STATUS_OK))
                        .filter(operations::debiting_time.is_null())
                        .filter(operations::operation_time.ge(since)),
                )
                .execute(conn)
                .await?;
                tracing::debug!(removed, "Pending operations removed");

                upsert_references(conn, &batch.references).await?;
                for record in &batch.operations {
                    upsert_operation(conn, record).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn pending_receipts(
        &self,
        phone: &str,
        offset: i64,
        limit: i64,
    ) -> DbResult<Vec<String>> {
        let mut conn = self.pool.get_connection().await?;
        let ids = operations::table
            .left_join(receipts::table)
            .filter(operations::user_phone.eq(phone))
            .filter(operations::debiting_time.is_not_null())
            .filter(operations::has_shopping_receipt.eq(true))
            .filter(receipts::operation_id.nullable().is_null())
            .order((operations::debiting_time.asc(), operations::id.asc()))
            .offset(offset)
            .limit(limit)
            .select(operations::id)
            .load::<String>(&mut conn)
            .await?;
        Ok(ids)
    }

    #[tracing::instrument(skip(self, record), fields(operation_id = %record.receipt.operation_id))]
    async fn save_receipt(&self, record: &ReceiptRecord) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                let receipt = &record.receipt;
                diesel::insert_into(receipts::table)
                    .values(receipt)
                    .on_conflict(receipts::operation_id)
                    .do_update()
                    .set(receipt)
                    .execute(conn)
                    .await?;
                diesel::delete(
                    receipt_items::table
                        .filter(receipt_items::operation_id.eq(&receipt.operation_id)),
                )
                .execute(conn)
                .await?;
                if !record.items.is_empty() {
                    diesel::insert_into(receipt_items::table)
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

    async fn clear_shopping_receipt(&self, operation_id: &str) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(operations::table.find(operation_id))
            .set(operations::has_shopping_receipt.eq(false))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, rows), fields(accounts = rows.len()))]
    async fn sync_invest_accounts(&self, phone: &str, rows: &[InvestAccount]) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                for account in rows {
                    diesel::insert_into(invest_accounts::table)
                        .values(account)
                        .on_conflict(invest_accounts::id)
                        .do_update()
                        .set(account)
                        .execute(conn)
                        .await?;
                }
                let ids: Vec<&str> = rows.iter().map(|a| a.id.as_str()).collect();
                diesel::update(
                    invest_accounts::table
                        .filter(invest_accounts::user_phone.eq(phone))
                        .filter(invest_accounts::id.ne_all(ids)),
                )
                .set(invest_accounts::deleted.eq(true))
                .execute(conn)
                .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn invest_operations_start_cursor(
        &self,
        invest_account_id: &str,
        overlap: Duration,
    ) -> DbResult<Option<String>> {
        let mut conn = self.pool.get_connection().await?;
        let latest = invest_operations::table
            .filter(invest_operations::invest_account_id.eq(invest_account_id))
            .select(max(invest_operations::date))
            .first::<Option<DateTime<Utc>>>(&mut conn)
            .await?;

        let Some(threshold) = latest.and_then(|latest| {
            TimeDelta::from_std(overlap)
                .ok()
                .and_then(|overlap| latest.checked_sub_signed(overlap))
        }) else {
            return Ok(None);
        };

        let cursor = invest_operations::table
            .filter(invest_operations::invest_account_id.eq(invest_account_id))
            .filter(invest_operations::date.lt(threshold))
            .order(invest_operations::date.desc())
            .select(invest_operations::cursor)
            .first::<String>(&mut conn)
            .await
            .optional()?;
        Ok(cursor)
    }

    #[tracing::instrument(skip(self, records), fields(operations = records.len()))]
    async fn upsert_invest_operations(&self, records: &[InvestOperationRecord]) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                for record in records {
                    upsert_invest_operation(conn, record).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn sync_invest_operation_types(
        &self,
        phone: &str,
        types: &[InvestOperationType],
    ) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                for row in types {
                    diesel::insert_into(invest_operation_types::table)
                        .values(row)
                        .on_conflict((
                            invest_operation_types::user_phone,
                            invest_operation_types::operation_type,
                        ))
                        .do_update()
                        .set(row)
                        .execute(conn)
                        .await?;
                }
                let kept: Vec<&str> = types.iter().map(|t| t.operation_type.as_str()).collect();
                diesel::update(
                    invest_operation_types::table
                        .filter(invest_operation_types::user_phone.eq(phone))
                        .filter(invest_operation_types::operation_type.ne_all(kept)),
                )
                .set(invest_operation_types::deleted.eq(true))
                .execute(conn)
                .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    #[tracing::instrument(skip(self, batch), fields(offers = batch.offers.len()))]
    async fn replace_client_offers(&self, batch: &ClientOffersBatch) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, |conn| {
            async move {
                for offer in &batch.offers {
                    diesel::insert_into(client_offers::table)
                        .values(offer)
                        .on_conflict(client_offers::id)
                        .do_update()
                        .set(offer)
                        .execute(conn)
                        .await?;
                    diesel::delete(
                        client_offer_essences::table
                            .filter(client_offer_essences::offer_id.eq(&offer.id)),
                    )
                    .execute(conn)
                    .await?;
                    diesel::delete(
                        client_offer_accounts::table
                            .filter(client_offer_accounts::offer_id.eq(&offer.id)),
                    )
                    .execute(conn)
                    .await?;
                }
                for essence in &batch.essences {
                    diesel::insert_into(client_offer_essences::table)
                        .values(essence)
                        .on_conflict(client_offer_essences::id)
                        .do_update()
                        .set(essence)
                        .execute(conn)
                        .await?;
                }
                if !batch.mcc_codes.is_empty() {
                    diesel::insert_into(client_offer_essence_mcc_codes::table)
                        .values(&batch.mcc_codes)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }
                if !batch.accounts.is_empty() {
                    diesel::insert_into(client_offer_accounts::table)
                        .values(&batch.accounts)
                        .on_conflict_do_nothing()
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
