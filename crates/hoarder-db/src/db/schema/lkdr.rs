// Fiscal receipts database schema. Kept in sync with `migrations/lkdr` by hand.

diesel::table! {
    users (phone) {
        phone -> Text,
    }
}

diesel::table! {
    tokens (phone) {
        phone -> Text,
        token -> Text,
        token_expire_in -> Timestamptz,
        refresh_token -> Text,
        refresh_token_expires_in -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    brands (id) {
        id -> Int8,
        name -> Text,
        image -> Nullable<Text>,
    }
}

diesel::table! {
    receipts (key) {
        key -> Text,
        user_phone -> Text,
        brand_id -> Nullable<Int8>,
        receive_date -> Timestamptz,
        created_date -> Nullable<Timestamptz>,
        kkt_owner -> Nullable<Text>,
        kkt_owner_inn -> Nullable<Text>,
        operation_type -> Nullable<Int4>,
        total_sum -> Nullable<Text>,
        fiscal_document_number -> Nullable<Text>,
    }
}

diesel::table! {
    fiscal_data (receipt_key) {
        receipt_key -> Text,
        date_time -> Nullable<Timestamptz>,
        retail_place -> Nullable<Text>,
        retail_place_address -> Nullable<Text>,
        buyer_address -> Nullable<Text>,
        operator -> Nullable<Text>,
        user_inn -> Nullable<Text>,
        kkt_reg_id -> Nullable<Text>,
        fiscal_drive_number -> Nullable<Text>,
        fiscal_document_number -> Nullable<Int8>,
        fiscal_sign -> Nullable<Int8>,
        total_sum -> Nullable<Float8>,
        cash_total_sum -> Nullable<Float8>,
        ecash_total_sum -> Nullable<Float8>,
    }
}

diesel::table! {
    fiscal_data_items (receipt_key, position) {
        receipt_key -> Text,
        position -> Int4,
        name -> Text,
        price -> Nullable<Float8>,
        quantity -> Nullable<Float8>,
        sum -> Nullable<Float8>,
        nds -> Nullable<Int4>,
        payment_type -> Nullable<Int4>,
        product_type -> Nullable<Int4>,
    }
}

diesel::joinable!(tokens -> users (phone));
diesel::joinable!(receipts -> users (user_phone));
diesel::joinable!(receipts -> brands (brand_id));
diesel::joinable!(fiscal_data -> receipts (receipt_key));
diesel::joinable!(fiscal_data_items -> fiscal_data (receipt_key));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    tokens,
    brands,
    receipts,
    fiscal_data,
    fiscal_data_items,
);
