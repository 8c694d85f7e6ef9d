//! Reference tables shared by all users: currencies, brands and the category families.

use diesel::{pg::Pg, prelude::*};

use crate::db::schema::tinkoff::{brands, categories, currencies, spending_categories, subgroups};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = currencies)]
#[diesel(check_for_backend(Pg))]
pub struct Currency {
    pub code: i32,
    pub name: String,
    pub str_code: String,
    pub firefly_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable, AsChangeset)]
#[diesel(table_name = currencies)]
#[diesel(primary_key(code))]
pub struct NewCurrency {
    pub code: i32,
    pub name: String,
    pub str_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = brands)]
#[diesel(check_for_backend(Pg))]
#[diesel(treat_none_as_null = true)]
pub struct Brand {
    pub id: String,
    pub name: String,
    pub base_color: Option<String>,
    pub link: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = spending_categories)]
#[diesel(check_for_backend(Pg))]
pub struct SpendingCategory {
    pub id: String,
    pub name: String,
    pub firefly_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable, AsChangeset)]
#[diesel(table_name = spending_categories)]
pub struct NewSpendingCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = categories)]
#[diesel(check_for_backend(Pg))]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = subgroups)]
#[diesel(check_for_backend(Pg))]
pub struct Subgroup {
    pub id: String,
    pub name: String,
}
