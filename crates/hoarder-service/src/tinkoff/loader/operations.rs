use std::sync::Arc;

use async_trait::async_trait;
use hoarder_api::tinkoff::TinkoffApi;
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::store::{BankStore, OperationsBatch};

use super::{BankLoaded, Scope};
use crate::pipeline::{Loaded, Loader, check, window_start};
use crate::tinkoff::convert::{self, References};

/// Reloads the operations of one account from shortly before the last confirmed one.
pub struct OperationsLoader {
    scope: Arc<Scope>,
    account_id: String,
}

impl OperationsLoader {
    #[must_use]
    pub fn new(scope: Arc<Scope>, account_id: String) -> Self {
        Self { scope, account_id }
    }
}

#[async_trait]
impl Loader<dyn TinkoffApi, dyn BankStore> for OperationsLoader {
    fn table_name(&self) -> &'static str {
        "operations"
    }

    async fn load(&self, ctx: &Ctx, client: &dyn TinkoffApi, store: &dyn BankStore) -> BankLoaded {
        let ctx = ctx.with("account", &self.account_id);
        let mut errors = Errors::new();

        let checkpoint = store.latest_operation_time(&self.account_id).await;
        let Some(checkpoint) = check(&ctx, &mut errors, checkpoint, "load checkpoint") else {
            return Loaded::errors(errors);
        };
        let start = window_start(checkpoint, self.scope.overlap);
        tracing::debug!(start = %start, end = %self.scope.now, "Loading operations");

        let loaded = client
            .operations(&ctx, &self.account_id, start, self.scope.now)
            .await;
        let Some(operations) = check(&ctx, &mut errors, loaded, "load operations") else {
            return Loaded::errors(errors);
        };

        let mut references = References::default();
        let mut records = Vec::with_capacity(operations.len());
        for operation in &operations {
            let converted =
                convert::operation(&self.scope.phone, &self.account_id, operation, &mut references);
            if let Some(record) = check(&ctx, &mut errors, converted, "convert operation") {
                records.push(record);
            }
        }

        let batch = OperationsBatch {
            references: references.into_references(),
            operations: records,
        };
        let saved = store
            .replace_operations(&self.account_id, start, &batch)
            .await;
        if check(&ctx, &mut errors, saved, "save operations").is_some() {
            tracing::info!(count = batch.operations.len(), "Operations saved");
        }
        Loaded::errors(errors)
    }
}
