//! Firefly III server kept in memory.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use hoarder_api::error::{ApiError, ApiResult};
use hoarder_api::firefly::{
    AccountUpdate, Currency, FireflyApi, NewAccount, NewCurrency, NewTransaction,
};
use hoarder_core::context::Ctx;

#[derive(Default)]
struct State {
    next_id: u64,
    categories: BTreeMap<String, String>,
    currencies: BTreeMap<String, Currency>,
    accounts: BTreeMap<String, NewAccount>,
    transactions: BTreeMap<String, NewTransaction>,
    deleted: Vec<String>,
}

impl State {
    fn id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

fn not_found(id: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("resource {id} not found"),
    }
}

/// Records what the mirror pass creates and deletes; ids are sequential from `1`.
#[derive(Default)]
pub struct FakeFirefly {
    state: Mutex<State>,
}

impl FakeFirefly {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn transactions(&self) -> BTreeMap<String, NewTransaction> {
        self.lock().transactions.clone()
    }

    #[must_use]
    pub fn accounts(&self) -> BTreeMap<String, NewAccount> {
        self.lock().accounts.clone()
    }

    /// Ids of deleted transactions, in deletion order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }
}

#[async_trait]
impl FireflyApi for FakeFirefly {
    async fn create_category(&self, _ctx: &Ctx, name: &str) -> ApiResult<String> {
        let mut state = self.lock();
        let id = state.id();
        state.categories.insert(id.clone(), name.to_owned());
        Ok(id)
    }

    async fn find_currency(&self, _ctx: &Ctx, code: &str) -> ApiResult<Option<Currency>> {
        Ok(self.lock().currencies.get(code).cloned())
    }

    async fn enable_currency(&self, _ctx: &Ctx, code: &str) -> ApiResult<()> {
        let mut state = self.lock();
        let currency = state.currencies.get_mut(code).ok_or_else(|| not_found(code))?;
        currency.enabled = true;
        Ok(())
    }

    async fn create_currency(&self, _ctx: &Ctx, currency: &NewCurrency) -> ApiResult<String> {
        let mut state = self.lock();
        let id = state.id();
        state.currencies.insert(currency.code.clone(), Currency {
            id: id.clone(),
            code: currency.code.clone(),
            enabled: currency.enabled,
        });
        Ok(id)
    }

    async fn create_account(&self, _ctx: &Ctx, account: &NewAccount) -> ApiResult<String> {
        let mut state = self.lock();
        let id = state.id();
        state.accounts.insert(id.clone(), account.clone());
        Ok(id)
    }

    async fn update_account(&self, _ctx: &Ctx, id: &str, update: &AccountUpdate) -> ApiResult<()> {
        let mut state = self.lock();
        let account = state.accounts.get_mut(id).ok_or_else(|| not_found(id))?;
        account.name.clone_from(&update.name);
        account.active = update.active;
        Ok(())
    }

    async fn create_transaction(
        &self,
        _ctx: &Ctx,
        transaction: &NewTransaction,
    ) -> ApiResult<String> {
        let mut state = self.lock();
        let id = state.id();
        state.transactions.insert(id.clone(), transaction.clone());
        Ok(id)
    }

    async fn delete_transaction(&self, _ctx: &Ctx, id: &str) -> ApiResult<()> {
        let mut state = self.lock();
        state.transactions.remove(id).ok_or_else(|| not_found(id))?;
        state.deleted.push(id.to_owned());
        Ok(())
    }
}
