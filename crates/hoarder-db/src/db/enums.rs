//! Database enum types with Diesel serialization.
//!
//! Each enum maps to a `CHECK` constrained text column and implements `ToSql` and `FromSql`
//! for conversion between Rust and `PostgreSQL`.

use std::fmt;
use std::io::Write;

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;

/// Kind of bank account. Only these three kinds are ingested.
///
/// Maps to `accounts.account_type`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
pub enum AccountType {
    Current,
    Credit,
    Saving,
}

impl AccountType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "Current",
            Self::Credit => "Credit",
            Self::Saving => "Saving",
        }
    }

    /// ## Summary
    /// Parses the API account type; `None` for kinds that are not ingested.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Current" => Some(Self::Current),
            "Credit" => Some(Self::Credit),
            "Saving" => Some(Self::Saving),
            _ => None,
        }
    }
}

impl ToSql<Text, Pg> for AccountType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for AccountType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        std::str::from_utf8(bytes.as_bytes())
            .ok()
            .and_then(Self::parse)
            .ok_or_else(|| "Unrecognized account type".into())
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a bank operation.
///
/// Maps to `operations.operation_type`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
pub enum OperationType {
    Debit,
    Credit,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "Debit",
            Self::Credit => "Credit",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Debit" => Some(Self::Debit),
            "Credit" => Some(Self::Credit),
            _ => None,
        }
    }
}

impl ToSql<Text, Pg> for OperationType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for OperationType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"Debit" => Ok(Self::Debit),
            b"Credit" => Ok(Self::Credit),
            _ => Err("Unrecognized operation type".into()),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an operation that has been confirmed by the bank.
pub const STATUS_OK: &str = "OK";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_parses_ingested_kinds_only() {
        assert_eq!(AccountType::parse("Saving"), Some(AccountType::Saving));
        assert_eq!(AccountType::parse("Wallet"), None);
        assert_eq!(AccountType::Credit.to_string(), "Credit");
    }

    #[test]
    fn operation_type_round_trips_names() {
        for kind in [OperationType::Debit, OperationType::Credit] {
            assert_eq!(OperationType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OperationType::parse("debit"), None);
    }
}
