//! Payloads of the bank API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bank timestamps are wrapped objects carrying epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Timestamp {
    pub milliseconds: i64,
}

impl Timestamp {
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.milliseconds)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            milliseconds: value.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub code: i32,
    pub name: String,
    pub str_code: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Money {
    pub value: f64,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Loyalty {
    pub program_name: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub account_type: String,
    pub status: Option<String>,
    pub currency: Currency,
    pub creation_date: Option<Timestamp>,
    pub money_amount: Option<Money>,
    pub credit_limit: Option<Money>,
    pub debt_amount: Option<Money>,
    pub current_minimal_payment: Option<Money>,
    pub past_due_debt: Option<Money>,
    pub due_date: Option<Timestamp>,
    pub loyalty: Option<Loyalty>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub ucid: Option<String>,
    pub value: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub payment_system: Option<String>,
    pub expiration: Option<Timestamp>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requisites {
    pub recipient: Option<String>,
    pub beneficiary_bank_name: Option<String>,
    pub recipient_external_account: Option<String>,
    pub correspondent_account: Option<String>,
    pub bank_bik: Option<String>,
    pub inn: Option<String>,
    pub kpp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Period {
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub id: String,
    pub period: Period,
    pub expense: Option<Money>,
    pub income: Option<Money>,
    pub cashback: Option<Money>,
    pub interest: Option<Money>,
    pub overdraft_fee: Option<Money>,
    pub balance: Option<Money>,
    pub past_due_debt: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: String,
    pub name: String,
    pub base_color: Option<String>,
    pub link: Option<String>,
    pub logo: Option<String>,
}

/// Shape shared by spending categories, categories and subgroups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Named {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInfo {
    pub field_name: String,
    pub field_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyBonus {
    pub description: Option<String>,
    pub loyalty_type: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyPayment {
    pub program: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub payment_id: Option<String>,
    pub payment_type: Option<String>,
    pub provider_id: Option<String>,
    pub template_id: Option<String>,
    pub repeatable: Option<bool>,
    /// Provider-specific form values, keyed by field name.
    pub fields_values: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    pub account: String,
    #[serde(rename = "type")]
    pub operation_type: String,
    pub status: String,
    pub group: Option<String>,
    #[serde(default)]
    pub description: String,
    pub operation_time: Timestamp,
    pub debiting_time: Option<Timestamp>,
    pub amount: Money,
    pub account_amount: Money,
    pub cashback_amount: Option<Money>,
    pub mcc: Option<i32>,
    #[serde(default)]
    pub is_inner: bool,
    pub sender_agreement: Option<String>,
    #[serde(default)]
    pub has_shopping_receipt: bool,
    pub card_number: Option<String>,
    pub message: Option<String>,
    pub brand: Option<Brand>,
    pub spending_category: Option<Named>,
    pub category: Option<Named>,
    pub subgroup: Option<Named>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub additional_info: Vec<AdditionalInfo>,
    #[serde(default)]
    pub loyalty_bonus: Vec<LoyaltyBonus>,
    #[serde(default)]
    pub loyalty_payment: Vec<LoyaltyPayment>,
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    pub price: f64,
    pub quantity: f64,
    pub sum: f64,
    pub nds: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub retail_place: Option<String>,
    pub retail_place_address: Option<String>,
    pub operator: Option<String>,
    pub total_sum: f64,
    pub cash_total_sum: Option<f64>,
    pub ecash_total_sum: Option<f64>,
    /// Epoch seconds.
    pub date_time: Option<i64>,
    pub fiscal_document_number: Option<i64>,
    pub fiscal_sign: Option<i64>,
    pub kkt_reg_id: Option<String>,
    pub user_inn: Option<String>,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShoppingReceipt {
    pub receipt: Receipt,
}

/// Result of the session check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub access_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub access_level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InvestMoney {
    pub value: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestAccount {
    pub broker_account_id: String,
    pub name: String,
    pub broker_account_type: Option<String>,
    pub opened_date: Option<DateTime<Utc>>,
    pub total_amount: Option<InvestMoney>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestAccounts {
    #[serde(default)]
    pub accounts: Vec<InvestAccount>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub num: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub quantity: Option<f64>,
    pub price: Option<InvestMoney>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesInfo {
    #[serde(default)]
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildOperation {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub operation_type: Option<String>,
    pub payment: Option<InvestMoney>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestOperation {
    pub id: String,
    pub cursor: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub operation_type: String,
    pub status: Option<String>,
    pub description: Option<String>,
    pub ticker: Option<String>,
    pub instrument_type: Option<String>,
    pub payment: Option<InvestMoney>,
    pub quantity: Option<f64>,
    pub price: Option<InvestMoney>,
    pub commission: Option<InvestMoney>,
    pub trades_info: Option<TradesInfo>,
    #[serde(default)]
    pub child_operations: Vec<ChildOperation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestOperations {
    #[serde(default)]
    pub items: Vec<InvestOperation>,
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestOperationType {
    pub operation_type: String,
    pub operation_name: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestOperationTypes {
    #[serde(default)]
    pub operations_types: Vec<InvestOperationType>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Essence {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub percent: Option<f64>,
    #[serde(default)]
    pub mcc_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOffer {
    pub id: String,
    #[serde(rename = "type")]
    pub offer_type: Option<String>,
    pub title: Option<String>,
    pub active_from: Option<Timestamp>,
    pub active_till: Option<Timestamp>,
    #[serde(default)]
    pub essences: Vec<Essence>,
    #[serde(default)]
    pub accounts: Vec<String>,
}
