//! Bank API: session management, account data and the brokerage gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoarder_core::context::Ctx;

use crate::error::ApiResult;

pub mod client;
pub mod model;
pub mod transport;

pub use client::HttpTinkoffClient;
pub use transport::{Device, Transport};

/// Access level of a fully authorized session.
pub const ACCESS_LEVEL_CLIENT: &str = "CLIENT";

/// Session of one phone as stored between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub access_level: Option<String>,
}

/// Unauthenticated calls used to establish a session.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait TinkoffAuthApi: Send + Sync {
    async fn new_session(&self, ctx: &Ctx) -> ApiResult<String>;

    /// Submits the phone; the bank answers with an operation ticket and sends an SMS code.
    async fn sign_up(&self, ctx: &Ctx, session_id: &str, phone: &str) -> ApiResult<String>;

    async fn confirm(&self, ctx: &Ctx, session_id: &str, ticket: &str, code: &str)
    -> ApiResult<()>;

    async fn password(&self, ctx: &Ctx, session_id: &str, password: &str) -> ApiResult<()>;

    /// Escalates the session and returns the new access level.
    async fn level_up(&self, ctx: &Ctx, session_id: &str) -> ApiResult<String>;

    /// Returns the current access level of the session.
    async fn ping(&self, ctx: &Ctx, session_id: &str) -> ApiResult<String>;
}

/// Authenticated data calls. Implementations own the session of one phone.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait TinkoffApi: Send + Sync {
    async fn accounts(&self, ctx: &Ctx) -> ApiResult<Vec<model::Account>>;

    async fn account_requisites(&self, ctx: &Ctx, account_id: &str)
    -> ApiResult<model::Requisites>;

    async fn statements(&self, ctx: &Ctx, account_id: &str) -> ApiResult<Vec<model::Statement>>;

    async fn operations(
        &self,
        ctx: &Ctx,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Vec<model::Operation>>;

    /// ## Errors
    /// Returns [`crate::error::ApiError::NoDataFound`] when the bank has no receipt for the
    /// operation.
    async fn shopping_receipt(
        &self,
        ctx: &Ctx,
        operation_id: &str,
    ) -> ApiResult<model::ShoppingReceipt>;

    async fn invest_accounts(&self, ctx: &Ctx) -> ApiResult<model::InvestAccounts>;

    async fn invest_operations(
        &self,
        ctx: &Ctx,
        broker_account_id: &str,
        cursor: Option<String>,
        limit: i64,
    ) -> ApiResult<model::InvestOperations>;

    async fn invest_operation_types(&self, ctx: &Ctx) -> ApiResult<model::InvestOperationTypes>;

    async fn client_offers(&self, ctx: &Ctx) -> ApiResult<Vec<model::ClientOffer>>;
}
