//! Payloads of the fiscal receipts API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub token: String,
    pub token_expire_in: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_in: Option<DateTime<Utc>>,
}

impl Tokens {
    /// Whether the refresh token may still be exchanged at `now`.
    #[must_use]
    pub fn can_refresh(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token_expires_in.is_none_or(|expires| expires > now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub challenge_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub key: String,
    pub brand_id: Option<i64>,
    pub receive_date: DateTime<Utc>,
    pub created_date: Option<DateTime<Utc>>,
    pub kkt_owner: Option<String>,
    pub kkt_owner_inn: Option<String>,
    pub operation_type: Option<i32>,
    pub total_sum: Option<String>,
    pub fiscal_document_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipts {
    #[serde(default)]
    pub brands: Vec<Brand>,
    #[serde(default)]
    pub receipts: Vec<Receipt>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalDataItem {
    pub name: String,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
    pub sum: Option<f64>,
    pub nds: Option<i32>,
    pub payment_type: Option<i32>,
    pub product_type: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalData {
    pub date_time: Option<DateTime<Utc>>,
    pub retail_place: Option<String>,
    pub retail_place_address: Option<String>,
    pub buyer_address: Option<String>,
    pub operator: Option<String>,
    pub user_inn: Option<String>,
    pub kkt_reg_id: Option<String>,
    pub fiscal_drive_number: Option<String>,
    pub fiscal_document_number: Option<i64>,
    pub fiscal_sign: Option<i64>,
    pub total_sum: Option<f64>,
    pub cash_total_sum: Option<f64>,
    pub ecash_total_sum: Option<f64>,
    #[serde(default)]
    pub items: Vec<FiscalDataItem>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Failure {
    pub code: Option<String>,
    pub message: Option<String>,
}
