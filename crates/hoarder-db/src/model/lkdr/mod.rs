//! Rows of the fiscal receipts database.

use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::schema::lkdr::{brands, fiscal_data, fiscal_data_items, receipts, tokens, users};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Pg))]
pub struct User {
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = tokens)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(phone))]
#[diesel(treat_none_as_null = true)]
pub struct Tokens {
    pub phone: String,
    pub token: String,
    pub token_expire_in: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = brands)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = receipts)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(key))]
#[diesel(treat_none_as_null = true)]
pub struct Receipt {
    pub key: String,
    pub user_phone: String,
    pub brand_id: Option<i64>,
    pub receive_date: DateTime<Utc>,
    pub created_date: Option<DateTime<Utc>>,
    pub kkt_owner: Option<String>,
    pub kkt_owner_inn: Option<String>,
    pub operation_type: Option<i32>,
    pub total_sum: Option<String>,
    pub fiscal_document_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = fiscal_data)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(receipt_key))]
#[diesel(treat_none_as_null = true)]
pub struct FiscalData {
    pub receipt_key: String,
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
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = fiscal_data_items)]
#[diesel(check_for_backend(Pg))]
pub struct FiscalDataItem {
    pub receipt_key: String,
    pub position: i32,
    pub name: String,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
    pub sum: Option<f64>,
    pub nds: Option<i32>,
    pub payment_type: Option<i32>,
    pub product_type: Option<i32>,
}
