//! Firefly III mirror pass.
//!
//! Runs after the bank loaders of a phone and links every mirrored row through its
//! `firefly_id` column, so a second pass over unchanged data does nothing.

use std::sync::Arc;

use hoarder_api::firefly::FireflyApi;
use hoarder_core::context::{Ctx, Errors};
use hoarder_db::store::MirrorStore;
use tracing::Instrument;

use crate::pipeline::{self, Loaded, Loader};

pub mod loader;
pub mod transaction;

pub type MirrorLoader = Box<dyn Loader<dyn FireflyApi, dyn MirrorStore>>;
pub type MirrorLoaded = Loaded<dyn FireflyApi, dyn MirrorStore>;

pub struct Mirror {
    api: Arc<dyn FireflyApi>,
    store: Arc<dyn MirrorStore>,
}

impl Mirror {
    #[must_use]
    pub fn new(api: Arc<dyn FireflyApi>, store: Arc<dyn MirrorStore>) -> Self {
        Self { api, store }
    }

    /// ## Summary
    /// Mirrors categories, currencies, then the accounts and transactions of `phone`.
    ///
    /// Failures are reported per item; the pass continues with the next one.
    pub async fn run(&self, ctx: &Ctx, phone: &str) -> Errors {
        let ctx = ctx.with("mirror", "firefly");
        let span = ctx.span();
        let roots: Vec<MirrorLoader> = vec![
            Box::new(loader::CategoriesLoader),
            Box::new(loader::CurrenciesLoader),
            Box::new(loader::AccountsLoader::new(Arc::from(phone))),
        ];
        async {
            tracing::info!("Mirroring");
            pipeline::run(&ctx, self.api.as_ref(), self.store.as_ref(), roots).await
        }
        .instrument(span)
        .await
    }
}
