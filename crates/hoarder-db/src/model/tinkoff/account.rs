use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::enums::AccountType;
use crate::db::schema::tinkoff::{account_requisites, accounts, cards, statements};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = accounts)]
#[diesel(check_for_backend(Pg))]
pub struct Account {
    pub id: String,
    pub user_phone: String,
    pub name: String,
    pub account_type: AccountType,
    pub currency_code: i32,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub balance: Option<f64>,
    pub credit_limit: Option<f64>,
    pub debt_balance: Option<f64>,
    pub minimal_payment: Option<f64>,
    pub past_due_debt: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
    pub loyalty_program: Option<String>,
    pub loyalty_balance: Option<f64>,
    pub deleted: bool,
    pub firefly_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = accounts)]
#[diesel(treat_none_as_null = true)]
pub struct NewAccount {
    pub id: String,
    pub user_phone: String,
    pub name: String,
    pub account_type: AccountType,
    pub currency_code: i32,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub balance: Option<f64>,
    pub credit_limit: Option<f64>,
    pub debt_balance: Option<f64>,
    pub minimal_payment: Option<f64>,
    pub past_due_debt: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
    pub loyalty_program: Option<String>,
    pub loyalty_balance: Option<f64>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = account_requisites)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(account_id))]
#[diesel(treat_none_as_null = true)]
pub struct AccountRequisites {
    pub account_id: String,
    pub recipient: Option<String>,
    pub beneficiary_bank: Option<String>,
    pub recipient_external_account: Option<String>,
    pub correspondent_account: Option<String>,
    pub bank_bik: Option<String>,
    pub inn: Option<String>,
    pub kpp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = cards)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct Card {
    pub id: String,
    pub account_id: String,
    pub ucid: Option<String>,
    pub value: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub payment_system: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
    pub is_primary: bool,
    pub is_virtual: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = statements)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct Statement {
    pub id: String,
    pub account_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub expense: Option<f64>,
    pub income: Option<f64>,
    pub cashback: Option<f64>,
    pub interest: Option<f64>,
    pub overdraft_fee: Option<f64>,
    pub balance: Option<f64>,
    pub past_due_debt: Option<f64>,
}
