//! Fiscal receipt payloads to rows.

use hoarder_api::lkdr::model as api;
use hoarder_core::convert::{non_blank, positions};
use hoarder_db::model::lkdr::{Brand, FiscalData, FiscalDataItem, Receipt};
use hoarder_db::store::FiscalDataRecord;

#[must_use]
pub fn brands(values: &[api::Brand]) -> Vec<Brand> {
    values
        .iter()
        .map(|brand| Brand {
            id: brand.id,
            name: brand.name.clone(),
            image: non_blank(brand.image.clone()),
        })
        .collect()
}

#[must_use]
pub fn receipt(phone: &str, value: &api::Receipt) -> Receipt {
    Receipt {
        key: value.key.clone(),
        user_phone: phone.to_owned(),
        brand_id: value.brand_id,
        receive_date: value.receive_date,
        created_date: value.created_date,
        kkt_owner: non_blank(value.kkt_owner.clone()),
        kkt_owner_inn: non_blank(value.kkt_owner_inn.clone()),
        operation_type: value.operation_type,
        total_sum: non_blank(value.total_sum.clone()),
        fiscal_document_number: non_blank(value.fiscal_document_number.clone()),
    }
}

/// ## Summary
/// Converts the fiscal data of the receipt `key`; items keep their order as 1-based positions.
#[must_use]
pub fn fiscal_data(key: &str, value: api::FiscalData) -> FiscalDataRecord {
    let items = positions(value.items)
        .map(|(position, item)| FiscalDataItem {
            receipt_key: key.to_owned(),
            position,
            name: item.name,
            price: item.price,
            quantity: item.quantity,
            sum: item.sum,
            nds: item.nds,
            payment_type: item.payment_type,
            product_type: item.product_type,
        })
        .collect();

    FiscalDataRecord {
        fiscal_data: FiscalData {
            receipt_key: key.to_owned(),
            date_time: value.date_time,
            retail_place: non_blank(value.retail_place),
            retail_place_address: non_blank(value.retail_place_address),
            buyer_address: non_blank(value.buyer_address),
            operator: non_blank(value.operator),
            user_inn: non_blank(value.user_inn),
            kkt_reg_id: non_blank(value.kkt_reg_id),
            fiscal_drive_number: non_blank(value.fiscal_drive_number),
            fiscal_document_number: value.fiscal_document_number,
            fiscal_sign: value.fiscal_sign,
            total_sum: value.total_sum,
            cash_total_sum: value.cash_total_sum,
            ecash_total_sum: value.ecash_total_sum,
        },
        items,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fiscal_items_are_numbered_from_one() {
        let value: api::FiscalData = serde_json::from_value(json!({
            "retailPlace": " ",
            "totalSum": 150.0,
            "items": [
                {"name": "Milk", "price": 100.0, "quantity": 1.0, "sum": 100.0},
                {"name": "Bread", "price": 50.0, "quantity": 1.0, "sum": 50.0}
            ]
        }))
        .unwrap();

        let record = fiscal_data("k1", value);

        assert_eq!(record.fiscal_data.receipt_key, "k1");
        assert_eq!(record.fiscal_data.retail_place, None);
        let names: Vec<_> = record
            .items
            .iter()
            .map(|item| (item.position, item.name.as_str()))
            .collect();
        assert_eq!(names, [(1, "Milk"), (2, "Bread")]);
    }

    #[test]
    fn test_receipt_belongs_to_phone() {
        let value: api::Receipt = serde_json::from_value(json!({
            "key": "k1",
            "brandId": 7,
            "receiveDate": "2024-03-01T10:00:00Z",
            "totalSum": ""
        }))
        .unwrap();

        let row = receipt("+7000", &value);

        assert_eq!(row.user_phone, "+7000");
        assert_eq!(row.brand_id, Some(7));
        assert_eq!(row.total_sum, None);
    }
}
