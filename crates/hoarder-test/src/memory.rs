//! In-memory implementation of every store trait, with the same upsert and tombstone rules as
//! the Postgres one.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use hoarder_db::db::enums::OperationType;
use hoarder_db::error::DbResult;
use hoarder_db::model::lkdr;
use hoarder_db::model::mirror::{CandidateSide, CurrencyRef, TransferCandidate};
use hoarder_db::model::tinkoff::account::{Account, AccountRequisites, Card, NewAccount, Statement};
use hoarder_db::model::tinkoff::invest::{InvestAccount, InvestOperationType};
use hoarder_db::model::tinkoff::operation::{NewOperation, Operation};
use hoarder_db::model::tinkoff::reference::{Currency, NewCurrency, SpendingCategory};
use hoarder_db::model::tinkoff::user::{Session, User};
use hoarder_db::store::{
    AccountsBatch, BankStore, ClientOffersBatch, FiscalDataRecord, FiscalStore,
    InvestOperationRecord, MirrorStore, OperationRecord, OperationsBatch, ReceiptRecord,
};

const STATUS_OK: &str = "OK";

#[derive(Default)]
struct State {
    users: BTreeMap<String, User>,
    sessions: BTreeMap<String, Session>,
    currencies: BTreeMap<i32, Currency>,
    accounts: BTreeMap<String, Account>,
    cards: BTreeMap<String, Card>,
    requisites: BTreeMap<String, AccountRequisites>,
    statements: BTreeMap<String, Statement>,
    spending_categories: BTreeMap<String, SpendingCategory>,
    operations: BTreeMap<String, Operation>,
    operation_records: BTreeMap<String, OperationRecord>,
    receipts: BTreeMap<String, ReceiptRecord>,
    invest_accounts: BTreeMap<String, InvestAccount>,
    invest_operations: BTreeMap<String, InvestOperationRecord>,
    invest_operation_types: BTreeMap<(String, String), InvestOperationType>,
    client_offers: ClientOffersBatch,
    fiscal_users: BTreeSet<String>,
    tokens: BTreeMap<String, lkdr::Tokens>,
    fiscal_brands: BTreeMap<i64, lkdr::Brand>,
    fiscal_receipts: BTreeMap<String, lkdr::Receipt>,
    fiscal_data: BTreeMap<String, FiscalDataRecord>,
    link_writes: usize,
}

impl State {
    fn upsert_currencies(&mut self, currencies: &[NewCurrency]) {
        for currency in currencies {
            let firefly_id = self
                .currencies
                .get(&currency.code)
                .and_then(|existing| existing.firefly_id.clone());
            self.currencies.insert(currency.code, Currency {
                code: currency.code,
                name: currency.name.clone(),
                str_code: currency.str_code.clone(),
                firefly_id,
            });
        }
    }

    fn upsert_operation(&mut self, record: &OperationRecord) {
        let new = &record.operation;
        let firefly_id = self
            .operations
            .get(&new.id)
            .and_then(|existing| existing.firefly_id.clone());
        self.operations
            .insert(new.id.clone(), operation_row(new, firefly_id));
        self.operation_records.insert(new.id.clone(), record.clone());
    }

    fn side(&self, operation: &Operation) -> Option<CandidateSide> {
        let account = self.accounts.get(&operation.account_id)?;
        let currency = self.currencies.get(&operation.currency_code)?;
        let account_currency = self.currencies.get(&account.currency_code)?;
        Some(CandidateSide {
            operation_id: operation.id.clone(),
            operation_firefly_id: operation.firefly_id.clone(),
            description: operation.description.clone(),
            operation_time: operation.operation_time,
            value: operation.value.abs(),
            currency: CurrencyRef {
                code: currency.name.clone(),
                firefly_id: currency.firefly_id.clone(),
            },
            account_value: operation.account_value.abs(),
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            account_firefly_id: account.firefly_id.clone(),
            account_currency: CurrencyRef {
                code: account_currency.name.clone(),
                firefly_id: account_currency.firefly_id.clone(),
            },
        })
    }
}

/// Operations sort by time, then numerically by id when the id is all digits.
fn chronological(a: &Operation, b: &Operation) -> Ordering {
    let numeric = |op: &Operation| op.id.parse::<u64>().ok();
    a.operation_time
        .cmp(&b.operation_time)
        .then_with(|| match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Whether a debit at position `l` and a credit at position `r` form one transfer.
fn pairs(l: (usize, &Operation), r: (usize, &Operation)) -> bool {
    let ((l_num, lo), (r_num, ro)) = (l, r);
    ro.sender_agreement.as_deref() == Some(lo.account_id.as_str())
        && (l_num + 1 == r_num || lo.operation_time == ro.operation_time)
        && (same_amount(lo.value, ro.account_value) || same_amount(lo.account_value, ro.value))
        && lo.group_.as_deref() == Some("TRANSFER")
        && ro.group_.as_deref() == Some("INCOME")
}

fn same_amount(a: f64, b: f64) -> bool {
    (a.abs() - b.abs()).abs() < f64::EPSILON
}

fn operation_row(new: &NewOperation, firefly_id: Option<String>) -> Operation {
    Operation {
        id: new.id.clone(),
        account_id: new.account_id.clone(),
        user_phone: new.user_phone.clone(),
        operation_type: new.operation_type,
        status: new.status.clone(),
        group_: new.group_.clone(),
        description: new.description.clone(),
        operation_time: new.operation_time,
        debiting_time: new.debiting_time,
        value: new.value,
        currency_code: new.currency_code,
        account_value: new.account_value,
        account_currency_code: new.account_currency_code,
        cashback: new.cashback,
        mcc: new.mcc,
        is_inner: new.is_inner,
        sender_agreement: new.sender_agreement.clone(),
        has_shopping_receipt: new.has_shopping_receipt,
        card_number: new.card_number.clone(),
        message: new.message.clone(),
        brand_id: new.brand_id.clone(),
        spending_category_id: new.spending_category_id.clone(),
        category_id: new.category_id.clone(),
        subgroup_id: new.subgroup_id.clone(),
        firefly_id,
    }
}

fn account_row(new: &NewAccount, firefly_id: Option<String>) -> Account {
    Account {
        id: new.id.clone(),
        user_phone: new.user_phone.clone(),
        name: new.name.clone(),
        account_type: new.account_type,
        currency_code: new.currency_code,
        status: new.status.clone(),
        created_at: new.created_at,
        balance: new.balance,
        credit_limit: new.credit_limit,
        debt_balance: new.debt_balance,
        minimal_payment: new.minimal_payment,
        past_due_debt: new.past_due_debt,
        due_date: new.due_date,
        loyalty_program: new.loyalty_program.clone(),
        loyalty_balance: new.loyalty_balance,
        deleted: new.deleted,
        firefly_id,
    }
}

/// Store kept in process memory; cheap to build per test.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_currency(&self, currency: Currency) {
        self.lock().currencies.insert(currency.code, currency);
    }

    pub fn insert_account(&self, account: Account) {
        self.lock().accounts.insert(account.id.clone(), account);
    }

    pub fn insert_operation(&self, operation: Operation) {
        self.lock()
            .operations
            .insert(operation.id.clone(), operation);
    }

    #[must_use]
    pub fn account(&self, id: &str) -> Option<Account> {
        self.lock().accounts.get(id).cloned()
    }

    /// Accounts of `phone`, deleted ones included.
    #[must_use]
    pub fn accounts_of(&self, phone: &str) -> Vec<Account> {
        self.lock()
            .accounts
            .values()
            .filter(|account| account.user_phone == phone)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn operation(&self, id: &str) -> Option<Operation> {
        self.lock().operations.get(id).cloned()
    }

    /// Operations of an account in chronological order.
    #[must_use]
    pub fn operations_of(&self, account_id: &str) -> Vec<Operation> {
        let mut rows: Vec<Operation> = self
            .lock()
            .operations
            .values()
            .filter(|op| op.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(chronological);
        rows
    }

    #[must_use]
    pub fn receipts(&self) -> Vec<ReceiptRecord> {
        self.lock().receipts.values().cloned().collect()
    }

    #[must_use]
    pub fn session(&self, phone: &str) -> Option<Session> {
        self.lock().sessions.get(phone).cloned()
    }

    /// Row count of a table by its database name; `lkdr.` prefixes the fiscal family.
    #[must_use]
    pub fn rows(&self, table: &str) -> usize {
        let state = self.lock();
        match table {
            "users" => state.users.len(),
            "sessions" => state.sessions.len(),
            "currencies" => state.currencies.len(),
            "accounts" => state.accounts.len(),
            "cards" => state.cards.len(),
            "account_requisites" => state.requisites.len(),
            "statements" => state.statements.len(),
            "spending_categories" => state.spending_categories.len(),
            "operations" => state.operations.len(),
            "operation_locations" => state
                .operation_records
                .values()
                .map(|record| record.locations.len())
                .sum(),
            "receipts" => state.receipts.len(),
            "invest_accounts" => state.invest_accounts.len(),
            "invest_operations" => state.invest_operations.len(),
            "invest_operation_types" => state.invest_operation_types.len(),
            "client_offers" => state.client_offers.offers.len(),
            "lkdr.users" => state.fiscal_users.len(),
            "lkdr.tokens" => state.tokens.len(),
            "lkdr.brands" => state.fiscal_brands.len(),
            "lkdr.receipts" => state.fiscal_receipts.len(),
            "lkdr.fiscal_data" => state.fiscal_data.len(),
            _ => 0,
        }
    }

    /// How many `firefly_id` writes the mirror pass has made.
    #[must_use]
    pub fn link_writes(&self) -> usize {
        self.lock().link_writes
    }
}

#[async_trait]
impl BankStore for MemoryStore {
    async fn upsert_user(&self, user: &User) -> DbResult<()> {
        self.lock().users.insert(user.phone.clone(), user.clone());
        Ok(())
    }

    async fn load_session(&self, phone: &str) -> DbResult<Option<Session>> {
        Ok(self.session(phone))
    }

    async fn store_session(&self, phone: &str, session: Option<Session>) -> DbResult<()> {
        let mut state = self.lock();
        match session {
            Some(session) => state.sessions.insert(phone.to_owned(), session),
            None => state.sessions.remove(phone),
        };
        Ok(())
    }

    async fn sync_accounts(&self, phone: &str, batch: &AccountsBatch) -> DbResult<()> {
        let mut state = self.lock();
        state.upsert_currencies(&batch.currencies);
        for account in &batch.accounts {
            let firefly_id = state
                .accounts
                .get(&account.id)
                .and_then(|existing| existing.firefly_id.clone());
            state
                .accounts
                .insert(account.id.clone(), account_row(account, firefly_id));
        }
        for account in state.accounts.values_mut() {
            if account.user_phone == phone && !batch.accounts.iter().any(|a| a.id == account.id) {
                account.deleted = true;
            }
        }
        for card in &batch.cards {
            state.cards.insert(card.id.clone(), card.clone());
        }
        Ok(())
    }

    async fn upsert_requisites(&self, requisites: &AccountRequisites) -> DbResult<()> {
        self.lock()
            .requisites
            .insert(requisites.account_id.clone(), requisites.clone());
        Ok(())
    }

    async fn upsert_statements(&self, statements: &[Statement]) -> DbResult<()> {
        let mut state = self.lock();
        for statement in statements {
            state
                .statements
                .insert(statement.id.clone(), statement.clone());
        }
        Ok(())
    }

    async fn latest_operation_time(&self, account_id: &str) -> DbResult<Option<DateTime<Utc>>> {
        Ok(self
            .lock()
            .operations
            .values()
            .filter(|op| op.account_id == account_id && op.status == STATUS_OK)
            .map(|op| op.operation_time)
            .max())
    }

    async fn replace_operations(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
        batch: &OperationsBatch,
    ) -> DbResult<()> {
        let mut state = self.lock();
        let pending: Vec<String> = state
            .operations
            .values()
            .filter(|op| {
                op.account_id == account_id
                    && op.status == STATUS_OK
                    && op.debiting_time.is_none()
                    && op.operation_time >= since
            })
            .map(|op| op.id.clone())
            .collect();
        for id in pending {
            state.operations.remove(&id);
            state.operation_records.remove(&id);
        }

        let references = &batch.references;
        state.upsert_currencies(&references.currencies);
        for category in &references.spending_categories {
            let firefly_id = state
                .spending_categories
                .get(&category.id)
                .and_then(|existing| existing.firefly_id.clone());
            state
                .spending_categories
                .insert(category.id.clone(), SpendingCategory {
                    id: category.id.clone(),
                    name: category.name.clone(),
                    firefly_id,
                });
        }
        for record in &batch.operations {
            state.upsert_operation(record);
        }
        Ok(())
    }

    async fn pending_receipts(
        &self,
        phone: &str,
        offset: i64,
        limit: i64,
    ) -> DbResult<Vec<String>> {
        let state = self.lock();
        let mut pending: Vec<&Operation> = state
            .operations
            .values()
            .filter(|op| {
                op.user_phone == phone
                    && op.debiting_time.is_some()
                    && op.has_shopping_receipt
                    && !state.receipts.contains_key(&op.id)
            })
            .collect();
        pending.sort_by(|a, b| (a.debiting_time, &a.id).cmp(&(b.debiting_time, &b.id)));
        Ok(pending
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or_default())
            .take(usize::try_from(limit).unwrap_or_default())
            .map(|op| op.id.clone())
            .collect())
    }

    async fn save_receipt(&self, record: &ReceiptRecord) -> DbResult<()> {
        self.lock()
            .receipts
            .insert(record.receipt.operation_id.clone(), record.clone());
        Ok(())
    }

    async fn clear_shopping_receipt(&self, operation_id: &str) -> DbResult<()> {
        if let Some(op) = self.lock().operations.get_mut(operation_id) {
            op.has_shopping_receipt = false;
        }
        Ok(())
    }

    async fn sync_invest_accounts(&self, phone: &str, accounts: &[InvestAccount]) -> DbResult<()> {
        let mut state = self.lock();
        for account in accounts {
            state
                .invest_accounts
                .insert(account.id.clone(), account.clone());
        }
        for account in state.invest_accounts.values_mut() {
            if account.user_phone == phone && !accounts.iter().any(|a| a.id == account.id) {
                account.deleted = true;
            }
        }
        Ok(())
    }

    async fn invest_operations_start_cursor(
        &self,
        invest_account_id: &str,
        overlap: Duration,
    ) -> DbResult<Option<String>> {
        let state = self.lock();
        let operations: Vec<_> = state
            .invest_operations
            .values()
            .map(|record| &record.operation)
            .filter(|op| op.invest_account_id == invest_account_id)
            .collect();
        let threshold = operations
            .iter()
            .map(|op| op.date)
            .max()
            .zip(TimeDelta::from_std(overlap).ok())
            .and_then(|(latest, overlap)| latest.checked_sub_signed(overlap));
        let Some(threshold) = threshold else {
            return Ok(None);
        };
        Ok(operations
            .into_iter()
            .filter(|op| op.date < threshold)
            .max_by_key(|op| op.date)
            .map(|op| op.cursor.clone()))
    }

    async fn upsert_invest_operations(&self, records: &[InvestOperationRecord]) -> DbResult<()> {
        let mut state = self.lock();
        for record in records {
            state
                .invest_operations
                .insert(record.operation.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn sync_invest_operation_types(
        &self,
        phone: &str,
        types: &[InvestOperationType],
    ) -> DbResult<()> {
        let mut state = self.lock();
        for row in types {
            state.invest_operation_types.insert(
                (row.user_phone.clone(), row.operation_type.clone()),
                row.clone(),
            );
        }
        for ((user, kind), row) in &mut state.invest_operation_types {
            if user == phone && !types.iter().any(|t| &t.operation_type == kind) {
                row.deleted = true;
            }
        }
        Ok(())
    }

    async fn replace_client_offers(&self, batch: &ClientOffersBatch) -> DbResult<()> {
        self.lock().client_offers = batch.clone();
        Ok(())
    }
}

#[async_trait]
impl FiscalStore for MemoryStore {
    async fn upsert_user(&self, phone: &str) -> DbResult<()> {
        self.lock().fiscal_users.insert(phone.to_owned());
        Ok(())
    }

    async fn load_tokens(&self, phone: &str) -> DbResult<Option<lkdr::Tokens>> {
        Ok(self.lock().tokens.get(phone).cloned())
    }

    async fn store_tokens(&self, phone: &str, tokens: Option<lkdr::Tokens>) -> DbResult<()> {
        let mut state = self.lock();
        match tokens {
            Some(tokens) => state.tokens.insert(phone.to_owned(), tokens),
            None => state.tokens.remove(phone),
        };
        Ok(())
    }

    async fn latest_receive_date(&self, phone: &str) -> DbResult<Option<DateTime<Utc>>> {
        Ok(self
            .lock()
            .fiscal_receipts
            .values()
            .filter(|receipt| receipt.user_phone == phone)
            .map(|receipt| receipt.receive_date)
            .max())
    }

    async fn upsert_receipts(
        &self,
        brands: &[lkdr::Brand],
        receipts: &[lkdr::Receipt],
    ) -> DbResult<()> {
        let mut state = self.lock();
        for brand in brands {
            state.fiscal_brands.insert(brand.id, brand.clone());
        }
        for receipt in receipts {
            state
                .fiscal_receipts
                .insert(receipt.key.clone(), receipt.clone());
        }
        Ok(())
    }

    async fn receipts_without_fiscal_data(
        &self,
        phone: &str,
        offset: i64,
        limit: i64,
    ) -> DbResult<Vec<String>> {
        let state = self.lock();
        let mut keys: Vec<&lkdr::Receipt> = state
            .fiscal_receipts
            .values()
            .filter(|receipt| {
                receipt.user_phone == phone && !state.fiscal_data.contains_key(&receipt.key)
            })
            .collect();
        keys.sort_by(|a, b| (a.receive_date, &a.key).cmp(&(b.receive_date, &b.key)));
        Ok(keys
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or_default())
            .take(usize::try_from(limit).unwrap_or_default())
            .map(|receipt| receipt.key.clone())
            .collect())
    }

    async fn save_fiscal_data(&self, record: &FiscalDataRecord) -> DbResult<()> {
        self.lock()
            .fiscal_data
            .insert(record.fiscal_data.receipt_key.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn unmirrored_categories(&self) -> DbResult<Vec<SpendingCategory>> {
        Ok(self
            .lock()
            .spending_categories
            .values()
            .filter(|category| category.firefly_id.is_none())
            .cloned()
            .collect())
    }

    async fn set_category_firefly_id(&self, id: &str, firefly_id: &str) -> DbResult<()> {
        let mut state = self.lock();
        state.link_writes += 1;
        if let Some(category) = state.spending_categories.get_mut(id) {
            category.firefly_id = Some(firefly_id.to_owned());
        }
        Ok(())
    }

    async fn unmirrored_currencies(&self) -> DbResult<Vec<Currency>> {
        Ok(self
            .lock()
            .currencies
            .values()
            .filter(|currency| currency.firefly_id.is_none())
            .cloned()
            .collect())
    }

    async fn currencies(&self) -> DbResult<Vec<Currency>> {
        Ok(self.lock().currencies.values().cloned().collect())
    }

    async fn set_currency_firefly_id(&self, code: i32, firefly_id: &str) -> DbResult<()> {
        let mut state = self.lock();
        state.link_writes += 1;
        if let Some(currency) = state.currencies.get_mut(&code) {
            currency.firefly_id = Some(firefly_id.to_owned());
        }
        Ok(())
    }

    async fn accounts(&self, phone: &str) -> DbResult<Vec<Account>> {
        Ok(self.accounts_of(phone))
    }

    async fn set_account_firefly_id(&self, id: &str, firefly_id: &str) -> DbResult<()> {
        let mut state = self.lock();
        state.link_writes += 1;
        if let Some(account) = state.accounts.get_mut(id) {
            account.firefly_id = Some(firefly_id.to_owned());
        }
        Ok(())
    }

    async fn transfer_candidates(&self, phone: &str) -> DbResult<Vec<TransferCandidate>> {
        let state = self.lock();
        let mut ops: Vec<&Operation> = state
            .operations
            .values()
            .filter(|op| {
                op.user_phone == phone && op.status == STATUS_OK && op.debiting_time.is_some()
            })
            .collect();
        ops.sort_by(|a, b| chronological(a, b));
        let numbered: Vec<(usize, &Operation)> =
            ops.into_iter().enumerate().map(|(i, op)| (i + 1, op)).collect();
        let debits: Vec<_> = numbered
            .iter()
            .copied()
            .filter(|(_, op)| op.operation_type == OperationType::Debit)
            .collect();
        let credits: Vec<_> = numbered
            .iter()
            .copied()
            .filter(|(_, op)| op.operation_type == OperationType::Credit)
            .collect();

        let mut rows: Vec<(usize, Option<&Operation>, Option<&Operation>)> = Vec::new();
        for &left in &debits {
            let matched: Vec<_> = credits.iter().filter(|&&right| pairs(left, right)).collect();
            if matched.is_empty() {
                rows.push((left.0, Some(left.1), None));
            }
            rows.extend(matched.into_iter().map(|right| (left.0, Some(left.1), Some(right.1))));
        }
        for &right in &credits {
            if !debits.iter().any(|&left| pairs(left, right)) {
                rows.push((right.0, None, Some(right.1)));
            }
        }
        rows.sort_by_key(|(num, _, _)| *num);

        let linked_pending = |side: &Option<CandidateSide>| {
            side.as_ref()
                .is_some_and(|side| side.is_mirrored() && side.operation_firefly_id.is_none())
        };
        Ok(rows
            .into_iter()
            .map(|(_, left, right)| TransferCandidate {
                left: left.and_then(|op| state.side(op)),
                right: right.and_then(|op| state.side(op)),
            })
            .filter(|candidate| linked_pending(&candidate.left) || linked_pending(&candidate.right))
            .collect())
    }

    async fn set_operation_firefly_id(
        &self,
        operation_ids: &[String],
        firefly_id: Option<String>,
    ) -> DbResult<()> {
        let mut state = self.lock();
        state.link_writes += 1;
        for id in operation_ids {
            if let Some(op) = state.operations.get_mut(id) {
                op.firefly_id.clone_from(&firefly_id);
            }
        }
        Ok(())
    }
}
