use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::schema::tinkoff::{sessions, users};

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(phone))]
#[diesel(treat_none_as_null = true)]
pub struct User {
    pub phone: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(phone))]
#[diesel(treat_none_as_null = true)]
pub struct Session {
    pub phone: String,
    pub session_id: String,
    pub access_level: Option<String>,
    pub updated_at: DateTime<Utc>,
}
