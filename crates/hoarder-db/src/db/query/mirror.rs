//! Firefly link queries.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::RunQueryDsl;

use super::PgStore;
use crate::db::DbProvider;
use crate::db::schema::tinkoff::{accounts, currencies, operations, spending_categories};
use crate::error::DbResult;
use crate::model::mirror::{CandidateRow, TransferCandidate};
use crate::model::tinkoff::account::Account;
use crate::model::tinkoff::reference::{Currency, SpendingCategory};
use crate::store::MirrorStore;

/// Pairs outgoing transfers with the incoming operation on the receiving account.
///
/// Operations are numbered by time and numeric id; a pair is either adjacent in that order or
/// shares the timestamp, and moves the same absolute amount in either the operation or the
/// account currency. Unpaired operations come back one-sided.
const TRANSFER_CANDIDATES: &str = r#"
with o as (
    select op.*,
           row_number() over (
               order by op.operation_time,
                        case when op.id ~ '^[0-9]+$' then op.id::numeric end,
                        op.id
           ) as num
    from operations op
    where op.status = 'OK'
      and op.debiting_time is not null
      and op.user_phone = $1
),
lo as (select * from o where o.operation_type = 'Debit'),
ro as (select * from o where o.operation_type = 'Credit')
select lo.id                  as l_id,
       lo.firefly_id          as l_firefly_id,
       lo.description         as l_description,
       lo.operation_time      as l_operation_time,
       abs(lo.value)          as l_value,
       lc.name                as l_currency,
       lc.firefly_id          as l_currency_firefly_id,
       abs(lo.account_value)  as l_account_value,
       la.id                  as la_id,
       la.name                as la_name,
       la.firefly_id          as la_firefly_id,
       lac.name               as la_currency,
       lac.firefly_id         as la_currency_firefly_id,
       ro.id                  as r_id,
       ro.firefly_id          as r_firefly_id,
       ro.description         as r_description,
       ro.operation_time      as r_operation_time,
       abs(ro.value)          as r_value,
       rc.name                as r_currency,
       rc.firefly_id          as r_currency_firefly_id,
       abs(ro.account_value)  as r_account_value,
       ra.id                  as ra_id,
       ra.name                as ra_name,
       ra.firefly_id          as ra_firefly_id,
       rac.name               as ra_currency,
       rac.firefly_id         as ra_currency_firefly_id
from lo
full outer join ro
    on ro.sender_agreement = lo.account_id
   and (lo.num + 1 = ro.num or lo.operation_time = ro.operation_time)
   and (abs(lo.value) = abs(ro.account_value) or abs(lo.account_value) = abs(ro.value))
   and lo."group" = 'TRANSFER'
   and ro."group" = 'INCOME'
left join accounts la on la.id = lo.account_id
left join currencies lc on lc.code = lo.currency_code
left join currencies lac on lac.code = la.currency_code
left join accounts ra on ra.id = ro.account_id
left join currencies rc on rc.code = ro.currency_code
left join currencies rac on rac.code = ra.currency_code
where (la.firefly_id is not null or ra.firefly_id is not null)
  and ((lo.id is not null and la.firefly_id is not null and lo.firefly_id is null)
    or (ro.id is not null and ra.firefly_id is not null and ro.firefly_id is null))
order by coalesce(lo.num, ro.num)
"#;

#[async_trait]
impl MirrorStore for PgStore {
    async fn unmirrored_categories(&self) -> DbResult<Vec<SpendingCategory>> {
        let mut conn = self.pool.get_connection().await?;
        let rows = spending_categories::table
            .filter(spending_categories::firefly_id.is_null())
            .order(spending_categories::id.asc())
            .select(SpendingCategory::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn set_category_firefly_id(&self, id: &str, firefly_id: &str) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(spending_categories::table.find(id))
            .set(spending_categories::firefly_id.eq(firefly_id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn unmirrored_currencies(&self) -> DbResult<Vec<Currency>> {
        let mut conn = self.pool.get_connection().await?;
        let rows = currencies::table
            .filter(currencies::firefly_id.is_null())
            .order(currencies::code.asc())
            .select(Currency::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn currencies(&self) -> DbResult<Vec<Currency>> {
        let mut conn = self.pool.get_connection().await?;
        let rows = currencies::table
            .order(currencies::code.asc())
            .select(Currency::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn set_currency_firefly_id(&self, code: i32, firefly_id: &str) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(currencies::table.find(code))
            .set(currencies::firefly_id.eq(firefly_id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn accounts(&self, phone: &str) -> DbResult<Vec<Account>> {
        let mut conn = self.pool.get_connection().await?;
        let rows = accounts::table
            .filter(accounts::user_phone.eq(phone))
            .order(accounts::id.asc())
            .select(Account::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn set_account_firefly_id(&self, id: &str, firefly_id: &str) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(accounts::table.find(id))
            .set(accounts::firefly_id.eq(firefly_id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn transfer_candidates(&self, phone: &str) -> DbResult<Vec<TransferCandidate>> {
        let mut conn = self.pool.get_connection().await?;
        let rows = diesel::sql_query(TRANSFER_CANDIDATES)
            .bind::<Text, _>(phone)
            .load::<CandidateRow>(&mut conn)
            .await?;
        tracing::debug!(count = rows.len(), "Transfer candidates loaded");
        Ok(rows.into_iter().map(TransferCandidate::from).collect())
    }

    async fn set_operation_firefly_id(
        &self,
        operation_ids: &[String],
        firefly_id: Option<String>,
    ) -> DbResult<()> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(operations::table.filter(operations::id.eq_any(operation_ids)))
            .set(operations::firefly_id.eq(firefly_id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
