use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::schema::tinkoff::{
    client_offer_accounts, client_offer_essence_mcc_codes, client_offer_essences, client_offers,
};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = client_offers)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct ClientOffer {
    pub id: String,
    pub user_phone: String,
    pub offer_type: Option<String>,
    pub title: Option<String>,
    pub active_from: Option<DateTime<Utc>>,
    pub active_till: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = client_offer_essences)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct ClientOfferEssence {
    pub id: String,
    pub offer_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = client_offer_essence_mcc_codes)]
#[diesel(check_for_backend(Pg))]
pub struct ClientOfferEssenceMccCode {
    pub essence_id: String,
    pub mcc_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = client_offer_accounts)]
#[diesel(check_for_backend(Pg))]
pub struct ClientOfferAccount {
    pub offer_id: String,
    pub account_id: String,
}
