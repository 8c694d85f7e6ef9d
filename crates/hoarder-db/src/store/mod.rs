//! Typed upsert stores used by loaders and the mirror pass.
//!
//! Every method that writes more than one table runs in a single local transaction. The
//! Postgres implementation lives in [`crate::db::query`]; tests use an in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbResult;
use crate::model::lkdr;
use crate::model::mirror::TransferCandidate;
use crate::model::tinkoff::account::{Account, AccountRequisites, Card, NewAccount, Statement};
use crate::model::tinkoff::invest::{
    InvestAccount, InvestChildOperation, InvestOperation, InvestOperationType, InvestTrade,
};
use crate::model::tinkoff::offer::{
    ClientOffer, ClientOfferAccount, ClientOfferEssence, ClientOfferEssenceMccCode,
};
use crate::model::tinkoff::operation::{
    NewOperation, OperationAdditionalInfo, OperationLocation, OperationLoyaltyBonus,
    OperationLoyaltyPayment, OperationPayment, OperationPaymentField,
};
use crate::model::tinkoff::receipt::{Receipt, ReceiptItem};
use crate::model::tinkoff::reference::{
    Brand, Category, Currency, NewCurrency, NewSpendingCategory, SpendingCategory, Subgroup,
};
use crate::model::tinkoff::user::{Session, User};

/// Accounts of one user as returned by the bank, with their currencies and cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountsBatch {
    pub currencies: Vec<NewCurrency>,
    pub accounts: Vec<NewAccount>,
    pub cards: Vec<Card>,
}

/// Reference rows an operation points at; upserted before the operations themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationReferences {
    pub currencies: Vec<NewCurrency>,
    pub brands: Vec<Brand>,
    pub spending_categories: Vec<NewSpendingCategory>,
    pub categories: Vec<Category>,
    pub subgroups: Vec<Subgroup>,
}

/// One operation with everything it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub operation: NewOperation,
    pub payment: Option<OperationPayment>,
    pub payment_fields: Vec<OperationPaymentField>,
    pub locations: Vec<OperationLocation>,
    pub additional_info: Vec<OperationAdditionalInfo>,
    pub loyalty_bonuses: Vec<OperationLoyaltyBonus>,
    pub loyalty_payments: Vec<OperationLoyaltyPayment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationsBatch {
    pub references: OperationReferences,
    pub operations: Vec<OperationRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptRecord {
    pub receipt: Receipt,
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvestOperationRecord {
    pub operation: InvestOperation,
    pub trades: Vec<InvestTrade>,
    pub children: Vec<InvestChildOperation>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOffersBatch {
    pub offers: Vec<ClientOffer>,
    pub essences: Vec<ClientOfferEssence>,
    pub mcc_codes: Vec<ClientOfferEssenceMccCode>,
    pub accounts: Vec<ClientOfferAccount>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FiscalDataRecord {
    pub fiscal_data: lkdr::FiscalData,
    pub items: Vec<lkdr::FiscalDataItem>,
}

/// Bank data written by the Tinkoff loaders.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait BankStore: Send + Sync {
    async fn upsert_user(&self, user: &User) -> DbResult<()>;

    async fn load_session(&self, phone: &str) -> DbResult<Option<Session>>;

    /// Stores the session of `phone`; `None` deletes it.
    async fn store_session(&self, phone: &str, session: Option<Session>) -> DbResult<()>;

    /// Upserts the retrieved accounts and marks the user's other accounts deleted.
    async fn sync_accounts(&self, phone: &str, batch: &AccountsBatch) -> DbResult<()>;

    async fn upsert_requisites(&self, requisites: &AccountRequisites) -> DbResult<()>;

    async fn upsert_statements(&self, statements: &[Statement]) -> DbResult<()>;

    /// Latest `operation_time` among the account's `OK` operations.
    async fn latest_operation_time(&self, account_id: &str) -> DbResult<Option<DateTime<Utc>>>;

    /// Deletes the account's non-debited `OK` operations at or after `since`, then upserts the
    /// batch, replacing each operation's children.
    async fn replace_operations(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
        batch: &OperationsBatch,
    ) -> DbResult<()>;

    /// Debited operations flagged with a shopping receipt that has not been stored yet,
    /// ordered by `debiting_time`.
    async fn pending_receipts(&self, phone: &str, offset: i64, limit: i64)
    -> DbResult<Vec<String>>;

    async fn save_receipt(&self, record: &ReceiptRecord) -> DbResult<()>;

    async fn clear_shopping_receipt(&self, operation_id: &str) -> DbResult<()>;

    async fn sync_invest_accounts(&self, phone: &str, accounts: &[InvestAccount]) -> DbResult<()>;

    /// Cursor of the latest stored operation dated strictly before the account's latest
    /// operation date minus `overlap`.
    async fn invest_operations_start_cursor(
        &self,
        invest_account_id: &str,
        overlap: Duration,
    ) -> DbResult<Option<String>>;

    async fn upsert_invest_operations(&self, records: &[InvestOperationRecord]) -> DbResult<()>;

    async fn sync_invest_operation_types(
        &self,
        phone: &str,
        types: &[InvestOperationType],
    ) -> DbResult<()>;

    async fn replace_client_offers(&self, batch: &ClientOffersBatch) -> DbResult<()>;
}

/// Fiscal receipts written by the LKDR loaders.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait FiscalStore: Send + Sync {
    async fn upsert_user(&self, phone: &str) -> DbResult<()>;

    async fn load_tokens(&self, phone: &str) -> DbResult<Option<lkdr::Tokens>>;

    async fn store_tokens(&self, phone: &str, tokens: Option<lkdr::Tokens>) -> DbResult<()>;

    async fn latest_receive_date(&self, phone: &str) -> DbResult<Option<DateTime<Utc>>>;

    async fn upsert_receipts(
        &self,
        brands: &[lkdr::Brand],
        receipts: &[lkdr::Receipt],
    ) -> DbResult<()>;

    /// Receipt keys of the user without fiscal data, oldest first.
    async fn receipts_without_fiscal_data(
        &self,
        phone: &str,
        offset: i64,
        limit: i64,
    ) -> DbResult<Vec<String>>;

    async fn save_fiscal_data(&self, record: &FiscalDataRecord) -> DbResult<()>;
}

/// Reads and links already-ingested bank data for the Firefly mirror pass.
///
/// Only `firefly_id` columns are ever written through this trait.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn unmirrored_categories(&self) -> DbResult<Vec<SpendingCategory>>;

    async fn set_category_firefly_id(&self, id: &str, firefly_id: &str) -> DbResult<()>;

    async fn unmirrored_currencies(&self) -> DbResult<Vec<Currency>>;

    async fn currencies(&self) -> DbResult<Vec<Currency>>;

    async fn set_currency_firefly_id(&self, code: i32, firefly_id: &str) -> DbResult<()>;

    async fn accounts(&self, phone: &str) -> DbResult<Vec<Account>>;

    async fn set_account_firefly_id(&self, id: &str, firefly_id: &str) -> DbResult<()>;

    async fn transfer_candidates(&self, phone: &str) -> DbResult<Vec<TransferCandidate>>;

    /// Links (or with `None` unlinks) the given operations.
    async fn set_operation_firefly_id(
        &self,
        operation_ids: &[String],
        firefly_id: Option<String>,
    ) -> DbResult<()>;
}
