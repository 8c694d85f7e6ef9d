use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::schema::tinkoff::{receipt_items, receipts};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = receipts)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(operation_id))]
#[diesel(treat_none_as_null = true)]
pub struct Receipt {
    pub operation_id: String,
    pub retail_place: Option<String>,
    pub retail_place_address: Option<String>,
    pub operator: Option<String>,
    pub total_sum: f64,
    pub cash_total_sum: Option<f64>,
    pub ecash_total_sum: Option<f64>,
    pub date_time: Option<DateTime<Utc>>,
    pub fiscal_document_number: Option<i64>,
    pub fiscal_sign: Option<i64>,
    pub kkt_reg_id: Option<String>,
    pub user_inn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = receipt_items)]
#[diesel(check_for_backend(Pg))]
pub struct ReceiptItem {
    pub operation_id: String,
    pub position: i32,
    pub name: String,
    pub price: f64,
    pub quantity: f64,
    pub sum: f64,
    pub nds: Option<i32>,
}
