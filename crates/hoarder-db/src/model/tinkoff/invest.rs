use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::schema::tinkoff::{
    invest_accounts, invest_child_operations, invest_operation_types, invest_operations,
    invest_trades,
};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = invest_accounts)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct InvestAccount {
    pub id: String,
    pub user_phone: String,
    pub name: String,
    pub broker_account_type: Option<String>,
    pub opened_date: Option<DateTime<Utc>>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = invest_operation_types)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(user_phone, operation_type))]
#[diesel(treat_none_as_null = true)]
pub struct InvestOperationType {
    pub user_phone: String,
    pub operation_type: String,
    pub operation_name: Option<String>,
    pub category: Option<String>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = invest_operations)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct InvestOperation {
    pub id: String,
    pub invest_account_id: String,
    pub cursor: String,
    pub date: DateTime<Utc>,
    pub operation_type: String,
    pub status: Option<String>,
    pub description: Option<String>,
    pub ticker: Option<String>,
    pub instrument_type: Option<String>,
    pub payment: Option<f64>,
    pub currency: Option<String>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub commission: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = invest_trades)]
#[diesel(check_for_backend(Pg))]
pub struct InvestTrade {
    pub operation_id: String,
    pub position: i32,
    pub trade_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = invest_child_operations)]
#[diesel(check_for_backend(Pg))]
pub struct InvestChildOperation {
    pub operation_id: String,
    pub position: i32,
    pub child_id: Option<String>,
    pub operation_type: Option<String>,
    pub payment: Option<f64>,
    pub currency: Option<String>,
}
