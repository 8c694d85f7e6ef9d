//! Firefly III REST client covering the resources the mirror pass writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoarder_core::context::Ctx;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::http;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountRole {
    DefaultAsset,
    SavingAsset,
    CcAsset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CreditCardType {
    MonthlyFull,
}

/// Body of an asset account creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAccount {
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: &'static str,
    pub account_role: AccountRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_card_type: Option<CreditCardType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_payment_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountUpdate {
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Withdrawal,
    Deposit,
    Transfer,
}

/// One split of a transaction group. Amounts are positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTransaction {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub date: DateTime<Utc>,
    pub amount: String,
    pub description: String,
    pub currency_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCurrency {
    pub code: String,
    pub name: String,
    pub symbol: String,
    pub decimal_places: u8,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrencyAttributes {
    pub code: String,
    #[serde(default)]
    pub enabled: bool,
}

/// A currency known to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    pub id: String,
    pub code: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
struct Single<A> {
    data: Resource<A>,
}

#[derive(Debug, Deserialize)]
struct Resource<A> {
    id: String,
    attributes: A,
}

#[derive(Debug, Serialize)]
struct TransactionGroup<'a> {
    error_if_duplicate_hash: bool,
    apply_rules: bool,
    transactions: [&'a NewTransaction; 1],
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait FireflyApi: Send + Sync {
    /// Creates a category and returns its id.
    async fn create_category(&self, ctx: &Ctx, name: &str) -> ApiResult<String>;

    /// Looks a currency up by its ISO code; `None` when the server does not know it.
    async fn find_currency(&self, ctx: &Ctx, code: &str) -> ApiResult<Option<Currency>>;

    async fn enable_currency(&self, ctx: &Ctx, code: &str) -> ApiResult<()>;

    async fn create_currency(&self, ctx: &Ctx, currency: &NewCurrency) -> ApiResult<String>;

    async fn create_account(&self, ctx: &Ctx, account: &NewAccount) -> ApiResult<String>;

    async fn update_account(&self, ctx: &Ctx, id: &str, update: &AccountUpdate) -> ApiResult<()>;

    /// Creates a single-split transaction group and returns the group id.
    async fn create_transaction(&self, ctx: &Ctx, transaction: &NewTransaction)
    -> ApiResult<String>;

    async fn delete_transaction(&self, ctx: &Ctx, id: &str) -> ApiResult<()>;
}

pub struct HttpFireflyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpFireflyClient {
    #[must_use]
    pub fn new(http: reqwest::Client, server_url: &str, token: String) -> Self {
        Self {
            http,
            base_url: format!("{}/api/v1", server_url.trim_end_matches('/')),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{path}", self.base_url))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json")
    }

    async fn create<B, A>(&self, ctx: &Ctx, path: &str, body: &B) -> ApiResult<Resource<A>>
    where
        B: Serialize + Sync + ?Sized,
        A: DeserializeOwned,
    {
        let request = self.request(Method::POST, path).json(body);
        let created: Single<A> = http::json(ctx, http::send(ctx, request).await?).await?;
        Ok(created.data)
    }
}

#[async_trait]
impl FireflyApi for HttpFireflyClient {
    #[tracing::instrument(skip(self, ctx))]
    async fn create_category(&self, ctx: &Ctx, name: &str) -> ApiResult<String> {
        let created = self
            .create::<_, serde_json::Value>(ctx, "categories", &serde_json::json!({ "name": name }))
            .await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn find_currency(&self, ctx: &Ctx, code: &str) -> ApiResult<Option<Currency>> {
        let request = self.request(Method::GET, &format!("currencies/{code}"));
        let response = http::send(ctx, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: Single<CurrencyAttributes> = http::json(ctx, response).await?;
        Ok(Some(Currency {
            id: found.data.id,
            code: found.data.attributes.code,
            enabled: found.data.attributes.enabled,
        }))
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn enable_currency(&self, ctx: &Ctx, code: &str) -> ApiResult<()> {
        let request = self.request(Method::POST, &format!("currencies/{code}/enable"));
        http::ensure_success(ctx, http::send(ctx, request).await?).await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn create_currency(&self, ctx: &Ctx, currency: &NewCurrency) -> ApiResult<String> {
        let created = self
            .create::<_, serde_json::Value>(ctx, "currencies", currency)
            .await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn create_account(&self, ctx: &Ctx, account: &NewAccount) -> ApiResult<String> {
        let created = self
            .create::<_, serde_json::Value>(ctx, "accounts", account)
            .await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn update_account(&self, ctx: &Ctx, id: &str, update: &AccountUpdate) -> ApiResult<()> {
        let request = self
            .request(Method::PUT, &format!("accounts/{id}"))
            .json(update);
        http::ensure_success(ctx, http::send(ctx, request).await?).await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn create_transaction(
        &self,
        ctx: &Ctx,
        transaction: &NewTransaction,
    ) -> ApiResult<String> {
        let group = TransactionGroup {
            error_if_duplicate_hash: false,
            apply_rules: true,
            transactions: [transaction],
        };
        let created = self
            .create::<_, serde_json::Value>(ctx, "transactions", &group)
            .await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn delete_transaction(&self, ctx: &Ctx, id: &str) -> ApiResult<()> {
        let request = self.request(Method::DELETE, &format!("transactions/{id}"));
        match http::ensure_success(ctx, http::send(ctx, request).await?).await {
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                tracing::debug!(id, "Transaction already gone");
                Ok(())
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn credit_card_account_serializes_liability_fields() {
        let account = NewAccount {
            name: "Platinum".to_owned(),
            account_type: "asset",
            account_role: AccountRole::CcAsset,
            currency_code: Some("RUB".to_owned()),
            active: true,
            credit_card_type: Some(CreditCardType::MonthlyFull),
            monthly_payment_date: Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()),
            notes: None,
        };

        let body = serde_json::to_value(&account).unwrap();

        assert_eq!(body["account_role"], "ccAsset");
        assert_eq!(body["credit_card_type"], "monthlyFull");
        assert_eq!(body["monthly_payment_date"], "2024-03-05T00:00:00Z");
    }

    #[test]
    fn saving_account_omits_credit_fields() {
        let account = NewAccount {
            name: "Piggy".to_owned(),
            account_type: "asset",
            account_role: AccountRole::SavingAsset,
            currency_code: None,
            active: false,
            credit_card_type: None,
            monthly_payment_date: None,
            notes: None,
        };

        let body = serde_json::to_value(&account).unwrap();

        assert_eq!(body["account_role"], "savingAsset");
        assert!(body.get("credit_card_type").is_none());
    }

    #[test]
    fn transaction_group_wraps_one_split() {
        let transaction = NewTransaction {
            transaction_type: TransactionType::Transfer,
            date: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            amount: "100".to_owned(),
            description: "Between accounts".to_owned(),
            currency_code: "RUB".to_owned(),
            foreign_amount: Some("1.1".to_owned()),
            foreign_currency_code: Some("USD".to_owned()),
            source_id: Some("1".to_owned()),
            source_name: None,
            destination_id: Some("2".to_owned()),
            destination_name: None,
            category_id: None,
            external_id: "op-1".to_owned(),
        };
        let group = TransactionGroup {
            error_if_duplicate_hash: false,
            apply_rules: true,
            transactions: [&transaction],
        };

        let body = serde_json::to_value(&group).unwrap();

        assert_eq!(body["transactions"][0]["type"], "transfer");
        assert_eq!(body["transactions"][0]["foreign_currency_code"], "USD");
        assert!(body["transactions"][0].get("source_name").is_none());
        assert_eq!(body["error_if_duplicate_hash"], json!(false));
    }

    #[test]
    fn currency_resource_decodes() {
        let found: Single<CurrencyAttributes> = serde_json::from_value(json!({
            "data": {
                "type": "currencies",
                "id": "3",
                "attributes": { "code": "EUR", "enabled": false, "name": "Euro" }
            }
        }))
        .unwrap();

        assert_eq!(found.data.id, "3");
        assert_eq!(found.data.attributes.code, "EUR");
        assert!(!found.data.attributes.enabled);
    }
}
