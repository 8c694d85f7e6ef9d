//! Derivation of a downstream transaction from a transfer candidate.

use std::collections::HashMap;

use hoarder_api::firefly::{NewTransaction, TransactionType};
use hoarder_db::model::mirror::{CandidateSide, TransferCandidate};

use crate::error::{ServiceError, ServiceResult};

/// What the mirror has to do for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Every mirrored side is linked already.
    Complete,
    /// Create the transaction and link it to `link`.
    Create {
        transaction: NewTransaction,
        link: Vec<String>,
    },
}

/// ## Summary
/// Downstream transactions some, but not all, mirrored sides are linked to. These have to be
/// deleted and unlinked before the candidate is created again.
#[must_use]
pub fn stale_links(candidate: &TransferCandidate) -> Vec<(String, Vec<String>)> {
    let sides: Vec<&CandidateSide> = candidate.mirrored_sides().collect();
    if sides.iter().all(|side| side.operation_firefly_id.is_some()) {
        return Vec::new();
    }

    let mut stale: Vec<(String, Vec<String>)> = Vec::new();
    for side in sides {
        let Some(firefly_id) = &side.operation_firefly_id else {
            continue;
        };
        match stale.iter_mut().find(|(id, _)| id == firefly_id) {
            Some((_, operations)) => operations.push(side.operation_id.clone()),
            None => stale.push((firefly_id.clone(), vec![side.operation_id.clone()])),
        }
    }
    stale
}

/// Links written by the current mirror pass, keyed by operation id. The candidate list is read
/// once, so later rows see stale link columns for operations an earlier row already touched.
#[derive(Debug, Default)]
pub struct PassLinks(HashMap<String, Option<String>>);

impl PassLinks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, operation_ids: &[String], firefly_id: Option<&str>) {
        for id in operation_ids {
            self.0.insert(id.clone(), firefly_id.map(str::to_owned));
        }
    }

    /// ## Summary
    /// Brings `candidate` up to date with this pass. A side already linked by an earlier row is
    /// claimed by that transaction and dropped, so the rest is planned as one-sided. A side
    /// unlinked by an earlier row loses its stale link.
    pub fn refresh(&self, candidate: &mut TransferCandidate) {
        for slot in [&mut candidate.left, &mut candidate.right] {
            let Some(side) = slot.as_mut() else {
                continue;
            };
            match self.0.get(&side.operation_id) {
                Some(Some(_)) => *slot = None,
                Some(None) => side.operation_firefly_id = None,
                None => {}
            }
        }
    }
}

fn amount(value: f64) -> String {
    format!("{:.2}", value.abs())
}

/// Amount of a side in its account's currency.
fn account_amount(side: &CandidateSide) -> (String, f64) {
    (side.account_currency.code.clone(), side.account_value)
}

/// Amount of a side in the operation's own currency, used for the missing counterpart.
fn operation_amount(side: &CandidateSide) -> (String, f64) {
    (side.currency.code.clone(), side.value)
}

/// ## Summary
/// Plans the transaction for `candidate`, assuming stale links were already removed.
///
/// Both sides mirrored make a transfer, only the outgoing side a withdrawal, only the incoming
/// side a deposit. The amount is in the currency of the mirrored account the transaction is
/// booked on; the other side's amount becomes the foreign amount for transfers and whenever the
/// currencies differ.
///
/// Only sides on mirrored accounts are linked. An operation on an unmirrored account stays
/// unlinked, so once its account is mirrored the candidate turns partial and is rebuilt as a
/// transfer.
///
/// ## Errors
/// Fails for a candidate without any mirrored side.
pub fn plan(candidate: &TransferCandidate) -> ServiceResult<Plan> {
    let link: Vec<String> = candidate
        .mirrored_sides()
        .filter(|side| side.operation_firefly_id.is_none())
        .map(|side| side.operation_id.clone())
        .collect();
    if link.is_empty() {
        return Ok(Plan::Complete);
    }

    let left = candidate.left.as_ref();
    let right = candidate.right.as_ref();
    let (outgoing, incoming) = match (left, right) {
        (Some(l), Some(r)) => (account_amount(l), account_amount(r)),
        (Some(l), None) => (account_amount(l), operation_amount(l)),
        (None, Some(r)) => (operation_amount(r), account_amount(r)),
        (None, None) => {
            return Err(ServiceError::InvalidValue("empty transfer candidate".to_owned()));
        }
    };

    let left_mirrored = left.is_some_and(CandidateSide::is_mirrored);
    let right_mirrored = right.is_some_and(CandidateSide::is_mirrored);
    let transaction_type = match (left_mirrored, right_mirrored) {
        (true, true) => TransactionType::Transfer,
        (true, false) => TransactionType::Withdrawal,
        (false, true) => TransactionType::Deposit,
        (false, false) => {
            return Err(ServiceError::InvalidValue("candidate is not mirrored".to_owned()));
        }
    };

    let ((currency, value), (foreign_currency, foreign_value)) = match transaction_type {
        TransactionType::Deposit => (incoming, outgoing),
        TransactionType::Withdrawal | TransactionType::Transfer => (outgoing, incoming),
    };
    let foreign = (foreign_currency != currency || transaction_type == TransactionType::Transfer)
        .then(|| (amount(foreign_value), foreign_currency));

    let first = left.or(right).ok_or_else(|| {
        ServiceError::InvalidValue("empty transfer candidate".to_owned())
    })?;
    let description = [left, right]
        .into_iter()
        .flatten()
        .map(|side| side.description.as_str())
        .find(|description| !description.trim().is_empty())
        .unwrap_or_default()
        .to_owned();
    // The counterparty of a one-sided operation is named by its description.
    let counterparty = |side: Option<&CandidateSide>| {
        Some(side.map_or_else(|| description.clone(), |side| side.account_name.clone()))
    };

    let (source_id, source_name) = if left_mirrored {
        (left.and_then(|l| l.account_firefly_id.clone()), None)
    } else {
        (None, counterparty(left))
    };
    let (destination_id, destination_name) = if right_mirrored {
        (right.and_then(|r| r.account_firefly_id.clone()), None)
    } else {
        (None, counterparty(right))
    };

    let (foreign_amount, foreign_currency_code) = foreign.unzip();
    Ok(Plan::Create {
        transaction: NewTransaction {
            transaction_type,
            date: first.operation_time,
            amount: amount(value),
            description: description.clone(),
            currency_code: currency,
            foreign_amount,
            foreign_currency_code,
            source_id,
            source_name,
            destination_id,
            destination_name,
            category_id: None,
            external_id: first.operation_id.clone(),
        },
        link,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use hoarder_db::model::mirror::CurrencyRef;

    use super::*;

    fn currency(code: &str) -> CurrencyRef {
        CurrencyRef {
            code: code.to_owned(),
            firefly_id: Some(format!("cur-{code}")),
        }
    }

    fn side(id: &str, account: &str, mirrored: bool, value: f64, code: &str) -> CandidateSide {
        CandidateSide {
            operation_id: id.to_owned(),
            operation_firefly_id: None,
            description: format!("op {id}"),
            operation_time: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            value,
            currency: currency(code),
            account_value: value,
            account_id: account.to_owned(),
            account_name: format!("Account {account}"),
            account_firefly_id: mirrored.then(|| format!("ff-{account}")),
            account_currency: currency(code),
        }
    }

    fn created(plan: Plan) -> (NewTransaction, Vec<String>) {
        match plan {
            Plan::Create { transaction, link } => (transaction, link),
            Plan::Complete => panic!("expected a transaction"),
        }
    }

    #[test]
    fn test_both_sides_mirrored_make_a_transfer() {
        let candidate = TransferCandidate {
            left: Some(side("1", "A", true, 100.0, "RUB")),
            right: Some(side("2", "B", true, 100.0, "RUB")),
        };

        let (transaction, link) = created(plan(&candidate).unwrap());

        assert_eq!(transaction.transaction_type, TransactionType::Transfer);
        assert_eq!(transaction.source_id.as_deref(), Some("ff-A"));
        assert_eq!(transaction.destination_id.as_deref(), Some("ff-B"));
        assert_eq!(transaction.amount, "100.00");
        assert_eq!(transaction.foreign_amount.as_deref(), Some("100.00"));
        assert_eq!(transaction.external_id, "1");
        assert_eq!(link, ["1", "2"]);
    }

    #[test]
    fn test_one_sided_debit_is_a_withdrawal_to_counterparty() {
        let candidate = TransferCandidate {
            left: Some(side("1", "A", true, 250.0, "RUB")),
            right: None,
        };

        let (transaction, link) = created(plan(&candidate).unwrap());

        assert_eq!(transaction.transaction_type, TransactionType::Withdrawal);
        assert_eq!(transaction.destination_name.as_deref(), Some("op 1"));
        assert_eq!(transaction.destination_id, None);
        assert_eq!(transaction.foreign_amount, None);
        assert_eq!(link, ["1"]);
    }

    #[test]
    fn test_deposit_from_unmirrored_account_is_booked_in_destination_currency() {
        let mut left = side("1", "A", false, 10.0, "USD");
        left.account_value = 10.0;
        let mut right = side("2", "B", true, 10.0, "USD");
        right.account_value = 920.5;
        right.account_currency = currency("RUB");
        let candidate = TransferCandidate {
            left: Some(left),
            right: Some(right),
        };

        let (transaction, link) = created(plan(&candidate).unwrap());

        assert_eq!(transaction.transaction_type, TransactionType::Deposit);
        assert_eq!(transaction.currency_code, "RUB");
        assert_eq!(transaction.amount, "920.50");
        assert_eq!(transaction.foreign_currency_code.as_deref(), Some("USD"));
        assert_eq!(transaction.foreign_amount.as_deref(), Some("10.00"));
        assert_eq!(transaction.source_name.as_deref(), Some("Account A"));
        assert_eq!(link, ["2"]);
    }

    #[test]
    fn test_fully_linked_candidate_is_complete() {
        let mut left = side("1", "A", true, 5.0, "RUB");
        left.operation_firefly_id = Some("t1".to_owned());
        let candidate = TransferCandidate {
            left: Some(left),
            right: Some(side("2", "B", false, 5.0, "RUB")),
        };

        assert_eq!(plan(&candidate).unwrap(), Plan::Complete);
        assert!(stale_links(&candidate).is_empty());
    }

    #[test]
    fn test_side_claimed_earlier_in_the_pass_is_dropped() {
        let mut links = PassLinks::new();
        links.record(&["1".to_owned()], Some("t0"));
        links.record(&["3".to_owned()], None);
        let mut stale = side("3", "C", true, 5.0, "RUB");
        stale.operation_firefly_id = Some("old".to_owned());
        let mut candidate = TransferCandidate {
            left: Some(side("1", "A", true, 5.0, "RUB")),
            right: Some(side("2", "B", true, 5.0, "RUB")),
        };
        let mut unlinked = TransferCandidate {
            left: None,
            right: Some(stale),
        };

        links.refresh(&mut candidate);
        links.refresh(&mut unlinked);

        assert!(candidate.left.is_none());
        let (transaction, link) = created(plan(&candidate).unwrap());
        assert_eq!(transaction.transaction_type, TransactionType::Deposit);
        assert_eq!(link, ["2"]);
        assert_eq!(
            unlinked.right.and_then(|side| side.operation_firefly_id),
            None
        );
    }

    #[test]
    fn test_partially_linked_transfer_has_stale_links() {
        let mut left = side("1", "A", true, 5.0, "RUB");
        left.operation_firefly_id = Some("t1".to_owned());
        let candidate = TransferCandidate {
            left: Some(left),
            right: Some(side("2", "B", true, 5.0, "RUB")),
        };

        assert_eq!(stale_links(&candidate), [(
            "t1".to_owned(),
            vec!["1".to_owned()]
        )]);
    }
}
