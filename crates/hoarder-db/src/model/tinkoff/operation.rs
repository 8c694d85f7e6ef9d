use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::enums::OperationType;
use crate::db::schema::tinkoff::{
    operation_additional_info, operation_locations, operation_loyalty_bonuses,
    operation_loyalty_payments, operation_payment_fields, operation_payments, operations,
};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = operations)]
#[diesel(check_for_backend(Pg))]
pub struct Operation {
    pub id: String,
    pub account_id: String,
    pub user_phone: String,
    pub operation_type: OperationType,
    pub status: String,
    pub group_: Option<String>,
    pub description: String,
    pub operation_time: DateTime<Utc>,
    pub debiting_time: Option<DateTime<Utc>>,
    pub value: f64,
    pub currency_code: i32,
    pub account_value: f64,
    pub account_currency_code: i32,
    pub cashback: Option<f64>,
    pub mcc: Option<i32>,
    pub is_inner: bool,
    pub sender_agreement: Option<String>,
    pub has_shopping_receipt: bool,
    pub card_number: Option<String>,
    pub message: Option<String>,
    pub brand_id: Option<String>,
    pub spending_category_id: Option<String>,
    pub category_id: Option<String>,
    pub subgroup_id: Option<String>,
    pub firefly_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = operations)]
#[diesel(treat_none_as_null = true)]
pub struct NewOperation {
    pub id: String,
    pub account_id: String,
    pub user_phone: String,
    pub operation_type: OperationType,
    pub status: String,
    pub group_: Option<String>,
    pub description: String,
    pub operation_time: DateTime<Utc>,
    pub debiting_time: Option<DateTime<Utc>>,
    pub value: f64,
    pub currency_code: i32,
    pub account_value: f64,
    pub account_currency_code: i32,
    pub cashback: Option<f64>,
    pub mcc: Option<i32>,
    pub is_inner: bool,
    pub sender_agreement: Option<String>,
    pub has_shopping_receipt: bool,
    pub card_number: Option<String>,
    pub message: Option<String>,
    pub brand_id: Option<String>,
    pub spending_category_id: Option<String>,
    pub category_id: Option<String>,
    pub subgroup_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = operation_locations)]
#[diesel(check_for_backend(Pg))]
pub struct OperationLocation {
    pub operation_id: String,
    pub position: i32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = operation_additional_info)]
#[diesel(check_for_backend(Pg))]
pub struct OperationAdditionalInfo {
    pub operation_id: String,
    pub position: i32,
    pub field_name: String,
    pub field_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = operation_loyalty_bonuses)]
#[diesel(check_for_backend(Pg))]
pub struct OperationLoyaltyBonus {
    pub operation_id: String,
    pub position: i32,
    pub description: Option<String>,
    pub loyalty_type: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = operation_loyalty_payments)]
#[diesel(check_for_backend(Pg))]
pub struct OperationLoyaltyPayment {
    pub operation_id: String,
    pub position: i32,
    pub program: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = operation_payments)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(operation_id))]
#[diesel(treat_none_as_null = true)]
pub struct OperationPayment {
    pub operation_id: String,
    pub payment_id: Option<String>,
    pub payment_type: Option<String>,
    pub provider_id: Option<String>,
    pub template_id: Option<String>,
    pub repeatable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = operation_payment_fields)]
#[diesel(check_for_backend(Pg))]
pub struct OperationPaymentField {
    pub operation_id: String,
    pub name: String,
    pub value: String,
}
