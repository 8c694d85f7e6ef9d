//! Rows of the transfer-pairing query used by the Firefly mirror pass.

use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Float8, Nullable, Text, Timestamptz};

/// Currency as referenced by a candidate side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyRef {
    pub code: String,
    pub firefly_id: Option<String>,
}

/// One side of a candidate: an operation together with its account.
///
/// Amounts are absolute; the side (left = outgoing, right = incoming) carries the direction.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSide {
    pub operation_id: String,
    pub operation_firefly_id: Option<String>,
    pub description: String,
    pub operation_time: DateTime<Utc>,
    pub value: f64,
    pub currency: CurrencyRef,
    pub account_value: f64,
    pub account_id: String,
    pub account_name: String,
    pub account_firefly_id: Option<String>,
    pub account_currency: CurrencyRef,
}

impl CandidateSide {
    #[must_use]
    pub fn is_mirrored(&self) -> bool {
        self.account_firefly_id.is_some()
    }
}

/// A one-sided operation or a matched transfer pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCandidate {
    pub left: Option<CandidateSide>,
    pub right: Option<CandidateSide>,
}

impl TransferCandidate {
    /// Sides whose account is mirrored, i.e. the operations linked to the downstream transaction.
    pub fn mirrored_sides(&self) -> impl Iterator<Item = &CandidateSide> {
        self.left
            .iter()
            .chain(self.right.iter())
            .filter(|side| side.is_mirrored())
    }
}

/// Flat projection of the pairing query; `l_` columns describe the outgoing side, `r_` the
/// incoming one.
#[derive(Debug, Clone, PartialEq, QueryableByName)]
#[diesel(check_for_backend(Pg))]
pub struct CandidateRow {
    #[diesel(sql_type = Nullable<Text>)]
    pub l_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub l_firefly_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub l_description: Option<String>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub l_operation_time: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub l_value: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    pub l_currency: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub l_currency_firefly_id: Option<String>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub l_account_value: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    pub la_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub la_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub la_firefly_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub la_currency: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub la_currency_firefly_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub r_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub r_firefly_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub r_description: Option<String>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub r_operation_time: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub r_value: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    pub r_currency: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub r_currency_firefly_id: Option<String>,
    #[diesel(sql_type = Nullable<Float8>)]
    pub r_account_value: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    pub ra_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub ra_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub ra_firefly_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub ra_currency: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub ra_currency_firefly_id: Option<String>,
}

impl From<CandidateRow> for TransferCandidate {
    fn from(row: CandidateRow) -> Self {
        let left = (|| {
            Some(CandidateSide {
                operation_id: row.l_id?,
                operation_firefly_id: row.l_firefly_id,
                description: row.l_description.unwrap_or_default(),
                operation_time: row.l_operation_time?,
                value: row.l_value?,
                currency: CurrencyRef {
                    code: row.l_currency?,
                    firefly_id: row.l_currency_firefly_id,
                },
                account_value: row.l_account_value?,
                account_id: row.la_id?,
                account_name: row.la_name.unwrap_or_default(),
                account_firefly_id: row.la_firefly_id,
                account_currency: CurrencyRef {
                    code: row.la_currency?,
                    firefly_id: row.la_currency_firefly_id,
                },
            })
        })();

        let right = (|| {
            Some(CandidateSide {
                operation_id: row.r_id?,
                operation_firefly_id: row.r_firefly_id,
                description: row.r_description.unwrap_or_default(),
                operation_time: row.r_operation_time?,
                value: row.r_value?,
                currency: CurrencyRef {
                    code: row.r_currency?,
                    firefly_id: row.r_currency_firefly_id,
                },
                account_value: row.r_account_value?,
                account_id: row.ra_id?,
                account_name: row.ra_name.unwrap_or_default(),
                account_firefly_id: row.ra_firefly_id,
                account_currency: CurrencyRef {
                    code: row.ra_currency?,
                    firefly_id: row.ra_currency_firefly_id,
                },
            })
        })();

        Self { left, right }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> CandidateRow {
        let time = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        CandidateRow {
            l_id: Some("1".to_owned()),
            l_firefly_id: None,
            l_description: Some("To savings".to_owned()),
            l_operation_time: Some(time),
            l_value: Some(100.0),
            l_currency: Some("RUB".to_owned()),
            l_currency_firefly_id: Some("12".to_owned()),
            l_account_value: Some(100.0),
            la_id: Some("A".to_owned()),
            la_name: Some("Current".to_owned()),
            la_firefly_id: Some("FA".to_owned()),
            la_currency: Some("RUB".to_owned()),
            la_currency_firefly_id: Some("12".to_owned()),
            r_id: None,
            r_firefly_id: None,
            r_description: None,
            r_operation_time: None,
            r_value: None,
            r_currency: None,
            r_currency_firefly_id: None,
            r_account_value: None,
            ra_id: None,
            ra_name: None,
            ra_firefly_id: None,
            ra_currency: None,
            ra_currency_firefly_id: None,
        }
    }

    #[test]
    fn one_sided_row_has_no_right_side() {
        let candidate = TransferCandidate::from(row());

        let left = candidate.left.as_ref().unwrap();
        assert_eq!(left.operation_id, "1");
        assert_eq!(left.account_firefly_id.as_deref(), Some("FA"));
        assert_eq!(left.currency.code, "RUB");
        assert!(candidate.right.is_none());
        assert_eq!(candidate.mirrored_sides().count(), 1);
    }

    #[test]
    fn unmirrored_side_is_not_linked() {
        let mut row = row();
        row.r_id = Some("2".to_owned());
        row.r_operation_time = row.l_operation_time;
        row.r_value = Some(100.0);
        row.r_currency = Some("RUB".to_owned());
        row.r_account_value = Some(100.0);
        row.ra_id = Some("B".to_owned());
        row.ra_currency = Some("RUB".to_owned());

        let candidate = TransferCandidate::from(row);

        let right = candidate.right.as_ref().unwrap();
        assert!(!right.is_mirrored());
        assert_eq!(right.description, "");
        let linked: Vec<_> = candidate
            .mirrored_sides()
            .map(|side| side.operation_id.as_str())
            .collect();
        assert_eq!(linked, ["1"]);
    }
}
