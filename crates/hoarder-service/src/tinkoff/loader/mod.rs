//! Bank loaders. Each one covers a table family and writes it through [`BankStore`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hoarder_api::tinkoff::TinkoffApi;
use hoarder_db::store::BankStore;

use crate::pipeline::{Loaded, Loader};

mod accounts;
mod invest;
mod offers;
mod operations;
mod receipts;

pub use accounts::{AccountsLoader, RequisitesLoader, StatementsLoader};
pub use invest::{InvestAccountsLoader, InvestOperationTypesLoader, InvestOperationsLoader};
pub use offers::ClientOffersLoader;
pub use operations::OperationsLoader;
pub use receipts::ReceiptsLoader;

pub type BankLoader = Box<dyn Loader<dyn TinkoffApi, dyn BankStore>>;
pub type BankLoaded = Loaded<dyn TinkoffApi, dyn BankStore>;

/// What every loader of one phone's run shares.
#[derive(Debug, Clone)]
pub struct Scope {
    pub phone: String,
    pub now: DateTime<Utc>,
    pub batch_size: i64,
    pub overlap: Duration,
    pub with_receipts: bool,
}

/// ## Summary
/// Root loaders of a phone's run, in the order they run.
#[must_use]
pub fn roots(scope: &Arc<Scope>) -> Vec<BankLoader> {
    vec![
        Box::new(AccountsLoader::new(Arc::clone(scope))),
        Box::new(InvestAccountsLoader::new(Arc::clone(scope))),
        Box::new(InvestOperationTypesLoader::new(Arc::clone(scope))),
        Box::new(ClientOffersLoader::new(Arc::clone(scope))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_run_accounts_first() {
        let scope = Arc::new(Scope {
            phone: "+7000".to_owned(),
            now: Utc::now(),
            batch_size: 10,
            overlap: Duration::ZERO,
            with_receipts: false,
        });

        let tables: Vec<_> = roots(&scope).iter().map(|l| l.table_name()).collect();

        assert_eq!(tables, [
            "accounts",
            "invest_accounts",
            "invest_operation_types",
            "client_offers"
        ]);
    }
}
