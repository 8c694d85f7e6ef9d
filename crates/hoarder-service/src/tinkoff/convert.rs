//! Bank payloads to rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hoarder_api::tinkoff::model as api;
use hoarder_core::convert::{flatten_fields, non_blank, non_blank_str, positions};
use hoarder_db::db::enums::{AccountType, OperationType};
use hoarder_db::model::tinkoff::account::{AccountRequisites, Card, NewAccount, Statement};
use hoarder_db::model::tinkoff::invest::{
    InvestAccount, InvestChildOperation, InvestOperation, InvestOperationType, InvestTrade,
};
use hoarder_db::model::tinkoff::offer::{
    ClientOffer, ClientOfferAccount, ClientOfferEssence, ClientOfferEssenceMccCode,
};
use hoarder_db::model::tinkoff::operation::{
    NewOperation, OperationAdditionalInfo, OperationLocation, OperationLoyaltyBonus,
    OperationLoyaltyPayment, OperationPayment, OperationPaymentField,
};
use hoarder_db::model::tinkoff::receipt::{Receipt, ReceiptItem};
use hoarder_db::model::tinkoff::reference::{
    Brand, Category, NewCurrency, NewSpendingCategory, Subgroup,
};
use hoarder_db::store::{
    AccountsBatch, ClientOffersBatch, InvestOperationRecord, OperationRecord,
    OperationReferences, ReceiptRecord,
};

use crate::error::{ServiceError, ServiceResult};

fn time(value: Option<api::Timestamp>) -> Option<DateTime<Utc>> {
    value.and_then(api::Timestamp::to_datetime)
}

fn money(value: Option<&api::Money>) -> Option<f64> {
    value.map(|money| money.value)
}

fn currency(value: &api::Currency) -> NewCurrency {
    NewCurrency {
        code: value.code,
        name: value.name.clone(),
        str_code: value.str_code.clone(),
    }
}

/// Collects rows keyed by id so a reference seen twice in one batch is written once.
struct Unique<K, V>(BTreeMap<K, V>);

impl<K, V> Default for Unique<K, V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord, V> Unique<K, V> {
    fn insert(&mut self, key: K, value: V) {
        self.0.entry(key).or_insert(value);
    }

    fn into_vec(self) -> Vec<V> {
        self.0.into_values().collect()
    }
}

/// ## Summary
/// Converts the ingested account kinds; other kinds yield `None`.
#[must_use]
pub fn account(phone: &str, value: &api::Account) -> Option<(NewAccount, Vec<Card>)> {
    let account_type = AccountType::parse(&value.account_type)?;
    let cards = value
        .cards
        .iter()
        .map(|card| Card {
            id: card.id.clone(),
            account_id: value.id.clone(),
            ucid: non_blank(card.ucid.clone()),
            value: card.value.clone(),
            name: non_blank(card.name.clone()),
            status: non_blank(card.status.clone()),
            payment_system: non_blank(card.payment_system.clone()),
            expiration: time(card.expiration),
            is_primary: card.primary,
            is_virtual: card.is_virtual,
        })
        .collect();

    let loyalty = value.loyalty.as_ref();
    let row = NewAccount {
        id: value.id.clone(),
        user_phone: phone.to_owned(),
        name: value.name.clone(),
        account_type,
        currency_code: value.currency.code,
        status: non_blank(value.status.clone()),
        created_at: time(value.creation_date),
        balance: money(value.money_amount.as_ref()),
        credit_limit: money(value.credit_limit.as_ref()),
        debt_balance: money(value.debt_amount.as_ref()),
        minimal_payment: money(value.current_minimal_payment.as_ref()),
        past_due_debt: money(value.past_due_debt.as_ref()),
        due_date: time(value.due_date),
        loyalty_program: non_blank(loyalty.and_then(|l| l.program_name.clone())),
        loyalty_balance: loyalty.and_then(|l| l.amount),
        deleted: false,
    };
    Some((row, cards))
}

/// ## Summary
/// Converts the ingested accounts of `values` into one batch and returns the skipped ones'
/// ids and types.
#[must_use]
pub fn accounts(phone: &str, values: &[api::Account]) -> (AccountsBatch, Vec<(String, String)>) {
    let mut currencies = Unique::default();
    let mut batch = AccountsBatch::default();
    let mut skipped = Vec::new();

    for value in values {
        let Some((row, cards)) = account(phone, value) else {
            skipped.push((value.id.clone(), value.account_type.clone()));
            continue;
        };
        currencies.insert(value.currency.code, currency(&value.currency));
        batch.accounts.push(row);
        batch.cards.extend(cards);
    }

    batch.currencies = currencies.into_vec();
    (batch, skipped)
}

#[must_use]
pub fn requisites(account_id: &str, value: api::Requisites) -> AccountRequisites {
    AccountRequisites {
        account_id: account_id.to_owned(),
        recipient: non_blank(value.recipient),
        beneficiary_bank: non_blank(value.beneficiary_bank_name),
        recipient_external_account: non_blank(value.recipient_external_account),
        correspondent_account: non_blank(value.correspondent_account),
        bank_bik: non_blank(value.bank_bik),
        inn: non_blank(value.inn),
        kpp: non_blank(value.kpp),
    }
}

/// ## Errors
/// Fails when the statement period has an unrepresentable timestamp.
pub fn statement(account_id: &str, value: &api::Statement) -> ServiceResult<Statement> {
    let invalid = || ServiceError::InvalidValue(format!("statement {} period", value.id));
    Ok(Statement {
        id: value.id.clone(),
        account_id: account_id.to_owned(),
        period_start: value.period.start.to_datetime().ok_or_else(invalid)?,
        period_end: value.period.end.to_datetime().ok_or_else(invalid)?,
        expense: money(value.expense.as_ref()),
        income: money(value.income.as_ref()),
        cashback: money(value.cashback.as_ref()),
        interest: money(value.interest.as_ref()),
        overdraft_fee: money(value.overdraft_fee.as_ref()),
        balance: money(value.balance.as_ref()),
        past_due_debt: money(value.past_due_debt.as_ref()),
    })
}

/// Collects the reference rows operations point at.
#[derive(Default)]
pub struct References {
    currencies: Unique<i32, NewCurrency>,
    brands: Unique<String, Brand>,
    spending_categories: Unique<String, NewSpendingCategory>,
    categories: Unique<String, Category>,
    subgroups: Unique<String, Subgroup>,
}

impl References {
    fn add(&mut self, value: &api::Operation) {
        self.currencies
            .insert(value.amount.currency.code, currency(&value.amount.currency));
        self.currencies.insert(
            value.account_amount.currency.code,
            currency(&value.account_amount.currency),
        );
        if let Some(brand) = &value.brand {
            self.brands.insert(brand.id.clone(), Brand {
                id: brand.id.clone(),
                name: brand.name.clone(),
                base_color: non_blank(brand.base_color.clone()),
                link: non_blank(brand.link.clone()),
                logo: non_blank(brand.logo.clone()),
            });
        }
        if let Some(named) = &value.spending_category {
            self.spending_categories
                .insert(named.id.clone(), NewSpendingCategory {
                    id: named.id.clone(),
                    name: named.name.clone(),
                });
        }
        if let Some(named) = &value.category {
            self.categories.insert(named.id.clone(), Category {
                id: named.id.clone(),
                name: named.name.clone(),
            });
        }
        if let Some(named) = &value.subgroup {
            self.subgroups.insert(named.id.clone(), Subgroup {
                id: named.id.clone(),
                name: named.name.clone(),
            });
        }
    }

    #[must_use]
    pub fn into_references(self) -> OperationReferences {
        OperationReferences {
            currencies: self.currencies.into_vec(),
            brands: self.brands.into_vec(),
            spending_categories: self.spending_categories.into_vec(),
            categories: self.categories.into_vec(),
            subgroups: self.subgroups.into_vec(),
        }
    }
}

/// ## Summary
/// Converts one operation with its children and records the references it points at.
///
/// ## Errors
/// Fails on an unknown operation type or an unrepresentable operation time.
pub fn operation(
    phone: &str,
    account_id: &str,
    value: &api::Operation,
    references: &mut References,
) -> ServiceResult<OperationRecord> {
    let operation_type = OperationType::parse(&value.operation_type).ok_or_else(|| {
        ServiceError::InvalidValue(format!("operation type {:?}", value.operation_type))
    })?;
    let operation_time = value.operation_time.to_datetime().ok_or_else(|| {
        ServiceError::InvalidValue(format!("operation {} time", value.id))
    })?;
    let id = &value.id;

    let payment = value.payment.as_ref();
    let payment_fields = payment
        .and_then(|payment| payment.fields_values.as_ref())
        .map(flatten_fields)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, field)| OperationPaymentField {
            operation_id: id.clone(),
            name,
            value: field,
        })
        .collect();

    let record = OperationRecord {
        operation: NewOperation {
            id: id.clone(),
            account_id: account_id.to_owned(),
            user_phone: phone.to_owned(),
            operation_type,
            status: value.status.clone(),
            group_: non_blank(value.group.clone()),
            description: value.description.clone(),
            operation_time,
            debiting_time: time(value.debiting_time),
            value: value.amount.value,
            currency_code: value.amount.currency.code,
            account_value: value.account_amount.value,
            account_currency_code: value.account_amount.currency.code,
            cashback: money(value.cashback_amount.as_ref()),
            mcc: value.mcc,
            is_inner: value.is_inner,
            sender_agreement: non_blank(value.sender_agreement.clone()),
            has_shopping_receipt: value.has_shopping_receipt,
            card_number: non_blank(value.card_number.clone()),
            message: non_blank(value.message.clone()),
            brand_id: value.brand.as_ref().map(|brand| brand.id.clone()),
            spending_category_id: value.spending_category.as_ref().map(|c| c.id.clone()),
            category_id: value.category.as_ref().map(|c| c.id.clone()),
            subgroup_id: value.subgroup.as_ref().map(|c| c.id.clone()),
        },
        payment: payment.map(|payment| OperationPayment {
            operation_id: id.clone(),
            payment_id: non_blank(payment.payment_id.clone()),
            payment_type: non_blank(payment.payment_type.clone()),
            provider_id: non_blank(payment.provider_id.clone()),
            template_id: non_blank(payment.template_id.clone()),
            repeatable: payment.repeatable,
        }),
        payment_fields,
        locations: positions(&value.locations)
            .map(|(position, location)| OperationLocation {
                operation_id: id.clone(),
                position,
                latitude: location.latitude,
                longitude: location.longitude,
            })
            .collect(),
        additional_info: positions(&value.additional_info)
            .map(|(position, info)| OperationAdditionalInfo {
                operation_id: id.clone(),
                position,
                field_name: info.field_name.clone(),
                field_value: non_blank(info.field_value.clone()),
            })
            .collect(),
        loyalty_bonuses: positions(&value.loyalty_bonus)
            .map(|(position, bonus)| OperationLoyaltyBonus {
                operation_id: id.clone(),
                position,
                description: non_blank(bonus.description.clone()),
                loyalty_type: non_blank(bonus.loyalty_type.clone()),
                amount: bonus.amount,
                status: non_blank(bonus.status.clone()),
            })
            .collect(),
        loyalty_payments: positions(&value.loyalty_payment)
            .map(|(position, payment)| OperationLoyaltyPayment {
                operation_id: id.clone(),
                position,
                program: non_blank(payment.program.clone()),
                amount: payment.amount,
                status: non_blank(payment.status.clone()),
            })
            .collect(),
    };

    references.add(value);
    Ok(record)
}

/// ## Errors
/// Fails when the receipt date is out of range.
pub fn receipt(operation_id: &str, value: api::ShoppingReceipt) -> ServiceResult<ReceiptRecord> {
    let receipt = value.receipt;
    let date_time = receipt
        .date_time
        .map(|seconds| {
            DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
                ServiceError::InvalidValue(format!("receipt date {seconds}"))
            })
        })
        .transpose()?;

    let items = positions(receipt.items)
        .map(|(position, item)| ReceiptItem {
            operation_id: operation_id.to_owned(),
            position,
            name: item.name,
            price: item.price,
            quantity: item.quantity,
            sum: item.sum,
            nds: item.nds,
        })
        .collect();

    Ok(ReceiptRecord {
        receipt: Receipt {
            operation_id: operation_id.to_owned(),
            retail_place: non_blank(receipt.retail_place),
            retail_place_address: non_blank(receipt.retail_place_address),
            operator: non_blank(receipt.operator),
            total_sum: receipt.total_sum,
            cash_total_sum: receipt.cash_total_sum,
            ecash_total_sum: receipt.ecash_total_sum,
            date_time,
            fiscal_document_number: receipt.fiscal_document_number,
            fiscal_sign: receipt.fiscal_sign,
            kkt_reg_id: non_blank(receipt.kkt_reg_id),
            user_inn: non_blank(receipt.user_inn),
        },
        items,
    })
}

#[must_use]
pub fn invest_account(phone: &str, value: &api::InvestAccount) -> InvestAccount {
    InvestAccount {
        id: value.broker_account_id.clone(),
        user_phone: phone.to_owned(),
        name: value.name.clone(),
        broker_account_type: non_blank(value.broker_account_type.clone()),
        opened_date: value.opened_date,
        total_amount: value.total_amount.as_ref().map(|money| money.value),
        currency: value
            .total_amount
            .as_ref()
            .and_then(|money| non_blank_str(&money.currency)),
        deleted: false,
    }
}

#[must_use]
pub fn invest_operation(account_id: &str, value: &api::InvestOperation) -> InvestOperationRecord {
    let id = &value.id;
    let trades = value
        .trades_info
        .as_ref()
        .map(|info| info.trades.as_slice())
        .unwrap_or_default();

    InvestOperationRecord {
        operation: InvestOperation {
            id: id.clone(),
            invest_account_id: account_id.to_owned(),
            cursor: value.cursor.clone(),
            date: value.date,
            operation_type: value.operation_type.clone(),
            status: non_blank(value.status.clone()),
            description: non_blank(value.description.clone()),
            ticker: non_blank(value.ticker.clone()),
            instrument_type: non_blank(value.instrument_type.clone()),
            payment: value.payment.as_ref().map(|money| money.value),
            currency: value
                .payment
                .as_ref()
                .and_then(|money| non_blank_str(&money.currency)),
            quantity: value.quantity,
            price: value.price.as_ref().map(|money| money.value),
            commission: value.commission.as_ref().map(|money| money.value),
        },
        trades: positions(trades)
            .map(|(position, trade)| InvestTrade {
                operation_id: id.clone(),
                position,
                trade_id: non_blank(trade.num.clone()),
                date: trade.date,
                quantity: trade.quantity,
                price: trade.price.as_ref().map(|money| money.value),
            })
            .collect(),
        children: positions(&value.child_operations)
            .map(|(position, child)| InvestChildOperation {
                operation_id: id.clone(),
                position,
                child_id: non_blank(child.id.clone()),
                operation_type: non_blank(child.operation_type.clone()),
                payment: child.payment.as_ref().map(|money| money.value),
                currency: child
                    .payment
                    .as_ref()
                    .and_then(|money| non_blank_str(&money.currency)),
            })
            .collect(),
    }
}

/// ## Summary
/// Converts operation types, keeping the first occurrence of each type.
#[must_use]
pub fn invest_operation_types(
    phone: &str,
    values: &[api::InvestOperationType],
) -> Vec<InvestOperationType> {
    let mut unique = Unique::default();
    for value in values {
        unique.insert(value.operation_type.clone(), InvestOperationType {
            user_phone: phone.to_owned(),
            operation_type: value.operation_type.clone(),
            operation_name: non_blank(value.operation_name.clone()),
            category: non_blank(value.category.clone()),
            deleted: false,
        });
    }
    unique.into_vec()
}

#[must_use]
pub fn client_offers(phone: &str, values: &[api::ClientOffer]) -> ClientOffersBatch {
    let mut batch = ClientOffersBatch::default();
    for offer in values {
        batch.offers.push(ClientOffer {
            id: offer.id.clone(),
            user_phone: phone.to_owned(),
            offer_type: non_blank(offer.offer_type.clone()),
            title: non_blank(offer.title.clone()),
            active_from: time(offer.active_from),
            active_till: time(offer.active_till),
        });
        for essence in &offer.essences {
            batch.essences.push(ClientOfferEssence {
                id: essence.id.clone(),
                offer_id: offer.id.clone(),
                name: non_blank(essence.name.clone()),
                description: non_blank(essence.description.clone()),
                percent: essence.percent,
            });
            batch
                .mcc_codes
                .extend(essence.mcc_codes.iter().map(|mcc| ClientOfferEssenceMccCode {
                    essence_id: essence.id.clone(),
                    mcc_code: mcc.clone(),
                }));
        }
        batch
            .accounts
            .extend(offer.accounts.iter().map(|account| ClientOfferAccount {
                offer_id: offer.id.clone(),
                account_id: account.clone(),
            }));
    }
    batch
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn operation_json() -> serde_json::Value {
        json!({
            "id": "1001",
            "account": "A",
            "type": "Debit",
            "status": "OK",
            "group": "PAY",
            "description": "Coffee",
            "operationTime": {"milliseconds": 1_709_287_200_000_i64},
            "debitingTime": {"milliseconds": 1_709_290_800_000_i64},
            "amount": {"value": -250.0, "currency": {"code": 643, "name": "RUB", "strCode": "643"}},
            "accountAmount": {"value": -250.0, "currency": {"code": 643, "name": "RUB", "strCode": "643"}},
            "senderAgreement": "  ",
            "hasShoppingReceipt": true,
            "brand": {"id": "b1", "name": "Cafe", "baseColor": ""},
            "spendingCategory": {"id": "s1", "name": "Restaurants"},
            "locations": [{"latitude": 1.0, "longitude": 2.0}, {"latitude": 3.0, "longitude": 4.0}],
            "additionalInfo": [{"fieldName": "Place", "fieldValue": ""}],
            "payment": {"paymentId": "p1", "fieldsValues": {"bank": {"name": "X"}, "phone": "7999"}}
        })
    }

    #[test]
    fn test_operation_converts_children_and_references() {
        let value: api::Operation = serde_json::from_value(operation_json()).unwrap();
        let mut references = References::default();

        let record = operation("+7000", "A", &value, &mut references).unwrap();
        let references = references.into_references();

        assert_eq!(record.operation.operation_type, OperationType::Debit);
        assert_eq!(record.operation.value, -250.0);
        assert_eq!(record.operation.sender_agreement, None);
        assert_eq!(record.operation.brand_id.as_deref(), Some("b1"));
        assert!(record.operation.debiting_time.is_some());
        assert_eq!(
            record.locations.iter().map(|l| l.position).collect::<Vec<_>>(),
            [1, 2]
        );
        assert_eq!(record.additional_info[0].field_value, None);
        assert_eq!(
            record
                .payment_fields
                .iter()
                .map(|f| (f.name.as_str(), f.value.as_str()))
                .collect::<Vec<_>>(),
            [("bank.name", "X"), ("phone", "7999")]
        );
        assert_eq!(references.currencies.len(), 1);
        assert_eq!(references.brands[0].base_color, None);
        assert_eq!(references.spending_categories[0].name, "Restaurants");
    }

    #[test]
    fn test_unknown_operation_type_is_rejected() {
        let mut json = operation_json();
        json["type"] = json!("Transfer");
        let value: api::Operation = serde_json::from_value(json).unwrap();

        let err = operation("+7000", "A", &value, &mut References::default()).unwrap_err();

        assert!(err.to_string().contains("Transfer"));
    }

    #[test]
    fn test_accounts_skip_other_kinds() {
        let values: Vec<api::Account> = serde_json::from_value(json!([
            {
                "id": "A", "name": "Black", "accountType": "Current",
                "currency": {"code": 643, "name": "RUB", "strCode": "643"},
                "moneyAmount": {"value": 10.5, "currency": {"code": 643, "name": "RUB", "strCode": "643"}},
                "cards": [{"id": "c1", "value": "5213 **** 0001", "primary": true}]
            },
            {
                "id": "W", "name": "Wallet", "accountType": "Wallet",
                "currency": {"code": 643, "name": "RUB", "strCode": "643"}
            },
            {
                "id": "S", "name": "Piggy", "accountType": "Saving",
                "currency": {"code": 643, "name": "RUB", "strCode": "643"}
            }
        ]))
        .unwrap();

        let (batch, skipped) = accounts("+7000", &values);

        assert_eq!(
            batch.accounts.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            ["A", "S"]
        );
        assert_eq!(batch.accounts[0].balance, Some(10.5));
        assert_eq!(batch.currencies.len(), 1);
        assert_eq!(batch.cards[0].account_id, "A");
        assert!(batch.cards[0].is_primary);
        assert_eq!(skipped, [("W".to_owned(), "Wallet".to_owned())]);
    }

    #[test]
    fn test_invest_operation_types_are_deduplicated() {
        let values: Vec<api::InvestOperationType> = serde_json::from_value(json!([
            {"operationType": "BUY", "operationName": "Buy"},
            {"operationType": "SELL", "operationName": "Sell"},
            {"operationType": "BUY", "operationName": "Buy again"}
        ]))
        .unwrap();

        let rows = invest_operation_types("+7000", &values);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].operation_name.as_deref(), Some("Buy"));
    }

    #[test]
    fn test_receipt_items_are_positioned() {
        let value: api::ShoppingReceipt = serde_json::from_value(json!({
            "receipt": {
                "totalSum": 300.0,
                "dateTime": 1_709_287_200,
                "retailPlace": "",
                "items": [
                    {"name": "Milk", "price": 100.0, "quantity": 1.0, "sum": 100.0},
                    {"name": "Bread", "price": 100.0, "quantity": 2.0, "sum": 200.0}
                ]
            }
        }))
        .unwrap();

        let record = receipt("1001", value).unwrap();

        assert_eq!(record.receipt.retail_place, None);
        assert_eq!(
            record.receipt.date_time.unwrap().to_rfc3339(),
            "2024-03-01T10:00:00+00:00"
        );
        assert_eq!(record.items[1].position, 2);
        assert_eq!(record.items[1].name, "Bread");
    }

    #[test]
    fn test_client_offers_flatten_essences() {
        let values: Vec<api::ClientOffer> = serde_json::from_value(json!([{
            "id": "o1",
            "type": "CASHBACK",
            "essences": [{"id": "e1", "percent": 5.0, "mccCodes": ["5411", "5499"]}],
            "accounts": ["A"]
        }]))
        .unwrap();

        let batch = client_offers("+7000", &values);

        assert_eq!(batch.offers[0].offer_type.as_deref(), Some("CASHBACK"));
        assert_eq!(batch.essences[0].offer_id, "o1");
        assert_eq!(batch.mcc_codes.len(), 2);
        assert_eq!(batch.accounts[0].account_id, "A");
    }
}
