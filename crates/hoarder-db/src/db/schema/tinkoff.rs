// Bank database schema. Kept in sync with `migrations/tinkoff` by hand.

diesel::table! {
    users (phone) {
        phone -> Text,
        name -> Nullable<Text>,
    }
}

diesel::table! {
    sessions (phone) {
        phone -> Text,
        session_id -> Text,
        access_level -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    currencies (code) {
        code -> Int4,
        name -> Text,
        str_code -> Text,
        firefly_id -> Nullable<Text>,
    }
}

diesel::table! {
    accounts (id) {
        id -> Text,
        user_phone -> Text,
        name -> Text,
        account_type -> Text,
        currency_code -> Int4,
        status -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
        balance -> Nullable<Float8>,
        credit_limit -> Nullable<Float8>,
        debt_balance -> Nullable<Float8>,
        minimal_payment -> Nullable<Float8>,
        past_due_debt -> Nullable<Float8>,
        due_date -> Nullable<Timestamptz>,
        loyalty_program -> Nullable<Text>,
        loyalty_balance -> Nullable<Float8>,
        deleted -> Bool,
        firefly_id -> Nullable<Text>,
    }
}

diesel::table! {
    account_requisites (account_id) {
        account_id -> Text,
        recipient -> Nullable<Text>,
        beneficiary_bank -> Nullable<Text>,
        recipient_external_account -> Nullable<Text>,
        correspondent_account -> Nullable<Text>,
        bank_bik -> Nullable<Text>,
        inn -> Nullable<Text>,
        kpp -> Nullable<Text>,
    }
}

diesel::table! {
    cards (id) {
        id -> Text,
        account_id -> Text,
        ucid -> Nullable<Text>,
        value -> Text,
        name -> Nullable<Text>,
        status -> Nullable<Text>,
        payment_system -> Nullable<Text>,
        expiration -> Nullable<Timestamptz>,
        is_primary -> Bool,
        is_virtual -> Bool,
    }
}

diesel::table! {
    statements (id) {
        id -> Text,
        account_id -> Text,
        period_start -> Timestamptz,
        period_end -> Timestamptz,
        expense -> Nullable<Float8>,
        income -> Nullable<Float8>,
        cashback -> Nullable<Float8>,
        interest -> Nullable<Float8>,
        overdraft_fee -> Nullable<Float8>,
        balance -> Nullable<Float8>,
        past_due_debt -> Nullable<Float8>,
    }
}

diesel::table! {
    brands (id) {
        id -> Text,
        name -> Text,
        base_color -> Nullable<Text>,
        link -> Nullable<Text>,
        logo -> Nullable<Text>,
    }
}

diesel::table! {
    spending_categories (id) {
        id -> Text,
        name -> Text,
        firefly_id -> Nullable<Text>,
    }
}

diesel::table! {
    categories (id) {
        id -> Text,
        name -> Text,
    }
}

diesel::table! {
    subgroups (id) {
        id -> Text,
        name -> Text,
    }
}

diesel::table! {
    operations (id) {
        id -> Text,
        account_id -> Text,
        user_phone -> Text,
        operation_type -> Text,
        status -> Text,
        #[sql_name = "group"]
        group_ -> Nullable<Text>,
        description -> Text,
        operation_time -> Timestamptz,
        debiting_time -> Nullable<Timestamptz>,
        value -> Float8,
        currency_code -> Int4,
        account_value -> Float8,
        account_currency_code -> Int4,
        cashback -> Nullable<Float8>,
        mcc -> Nullable<Int4>,
        is_inner -> Bool,
        sender_agreement -> Nullable<Text>,
        has_shopping_receipt -> Bool,
        card_number -> Nullable<Text>,
        message -> Nullable<Text>,
        brand_id -> Nullable<Text>,
        spending_category_id -> Nullable<Text>,
        category_id -> Nullable<Text>,
        subgroup_id -> Nullable<Text>,
        firefly_id -> Nullable<Text>,
    }
}

diesel::table! {
    operation_locations (operation_id, position) {
        operation_id -> Text,
        position -> Int4,
        latitude -> Float8,
        longitude -> Float8,
    }
}

diesel::table! {
    operation_additional_info (operation_id, position) {
        operation_id -> Text,
        position -> Int4,
        field_name -> Text,
        field_value -> Nullable<Text>,
    }
}

diesel::table! {
    operation_loyalty_bonuses (operation_id, position) {
        operation_id -> Text,
        position -> Int4,
        description -> Nullable<Text>,
        loyalty_type -> Nullable<Text>,
        amount -> Nullable<Float8>,
        status -> Nullable<Text>,
    }
}

diesel::table! {
    operation_loyalty_payments (operation_id, position) {
        operation_id -> Text,
        position -> Int4,
        program -> Nullable<Text>,
        amount -> Nullable<Float8>,
        status -> Nullable<Text>,
    }
}

diesel::table! {
    operation_payments (operation_id) {
        operation_id -> Text,
        payment_id -> Nullable<Text>,
        payment_type -> Nullable<Text>,
        provider_id -> Nullable<Text>,
        template_id -> Nullable<Text>,
        repeatable -> Nullable<Bool>,
    }
}

diesel::table! {
    operation_payment_fields (operation_id, name) {
        operation_id -> Text,
        name -> Text,
        value -> Text,
    }
}

diesel::table! {
    receipts (operation_id) {
        operation_id -> Text,
        retail_place -> Nullable<Text>,
        retail_place_address -> Nullable<Text>,
        operator -> Nullable<Text>,
        total_sum -> Float8,
        cash_total_sum -> Nullable<Float8>,
        ecash_total_sum -> Nullable<Float8>,
        date_time -> Nullable<Timestamptz>,
        fiscal_document_number -> Nullable<Int8>,
        fiscal_sign -> Nullable<Int8>,
        kkt_reg_id -> Nullable<Text>,
        user_inn -> Nullable<Text>,
    }
}

diesel::table! {
    receipt_items (operation_id, position) {
        operation_id -> Text,
        position -> Int4,
        name -> Text,
        price -> Float8,
        quantity -> Float8,
        sum -> Float8,
        nds -> Nullable<Int4>,
    }
}

diesel::table! {
    invest_accounts (id) {
        id -> Text,
        user_phone -> Text,
        name -> Text,
        broker_account_type -> Nullable<Text>,
        opened_date -> Nullable<Timestamptz>,
        total_amount -> Nullable<Float8>,
        currency -> Nullable<Text>,
        deleted -> Bool,
    }
}

diesel::table! {
    invest_operation_types (user_phone, operation_type) {
        user_phone -> Text,
        operation_type -> Text,
        operation_name -> Nullable<Text>,
        category -> Nullable<Text>,
        deleted -> Bool,
    }
}

diesel::table! {
    invest_operations (id) {
        id -> Text,
        invest_account_id -> Text,
        cursor -> Text,
        date -> Timestamptz,
        operation_type -> Text,
        status -> Nullable<Text>,
        description -> Nullable<Text>,
        ticker -> Nullable<Text>,
        instrument_type -> Nullable<Text>,
        payment -> Nullable<Float8>,
        currency -> Nullable<Text>,
        quantity -> Nullable<Float8>,
        price -> Nullable<Float8>,
        commission -> Nullable<Float8>,
    }
}

diesel::table! {
    invest_trades (operation_id, position) {
        operation_id -> Text,
        position -> Int4,
        trade_id -> Nullable<Text>,
        date -> Nullable<Timestamptz>,
        quantity -> Nullable<Float8>,
        price -> Nullable<Float8>,
    }
}

diesel::table! {
    invest_child_operations (operation_id, position) {
        operation_id -> Text,
        position -> Int4,
        child_id -> Nullable<Text>,
        operation_type -> Nullable<Text>,
        payment -> Nullable<Float8>,
        currency -> Nullable<Text>,
    }
}

diesel::table! {
    client_offers (id) {
        id -> Text,
        user_phone -> Text,
        offer_type -> Nullable<Text>,
        title -> Nullable<Text>,
        active_from -> Nullable<Timestamptz>,
        active_till -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    client_offer_essences (id) {
        id -> Text,
        offer_id -> Text,
        name -> Nullable<Text>,
        description -> Nullable<Text>,
        percent -> Nullable<Float8>,
    }
}

diesel::table! {
    client_offer_essence_mcc_codes (essence_id, mcc_code) {
        essence_id -> Text,
        mcc_code -> Text,
    }
}

diesel::table! {
    client_offer_accounts (offer_id, account_id) {
        offer_id -> Text,
        account_id -> Text,
    }
}

diesel::joinable!(sessions -> users (phone));
diesel::joinable!(accounts -> users (user_phone));
diesel::joinable!(accounts -> currencies (currency_code));
diesel::joinable!(account_requisites -> accounts (account_id));
diesel::joinable!(cards -> accounts (account_id));
diesel::joinable!(statements -> accounts (account_id));
diesel::joinable!(operations -> accounts (account_id));
diesel::joinable!(operations -> brands (brand_id));
diesel::joinable!(operations -> spending_categories (spending_category_id));
diesel::joinable!(operations -> categories (category_id));
diesel::joinable!(operations -> subgroups (subgroup_id));
diesel::joinable!(operation_locations -> operations (operation_id));
diesel::joinable!(operation_additional_info -> operations (operation_id));
diesel::joinable!(operation_loyalty_bonuses -> operations (operation_id));
diesel::joinable!(operation_loyalty_payments -> operations (operation_id));
diesel::joinable!(operation_payments -> operations (operation_id));
diesel::joinable!(operation_payment_fields -> operation_payments (operation_id));
diesel::joinable!(receipts -> operations (operation_id));
diesel::joinable!(receipt_items -> receipts (operation_id));
diesel::joinable!(invest_accounts -> users (user_phone));
diesel::joinable!(invest_operation_types -> users (user_phone));
diesel::joinable!(invest_operations -> invest_accounts (invest_account_id));
diesel::joinable!(invest_trades -> invest_operations (operation_id));
diesel::joinable!(invest_child_operations -> invest_operations (operation_id));
diesel::joinable!(client_offers -> users (user_phone));
diesel::joinable!(client_offer_essences -> client_offers (offer_id));
diesel::joinable!(client_offer_essence_mcc_codes -> client_offer_essences (essence_id));
diesel::joinable!(client_offer_accounts -> client_offers (offer_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    sessions,
    currencies,
    accounts,
    account_requisites,
    cards,
    statements,
    brands,
    spending_categories,
    categories,
    subgroups,
    operations,
    operation_locations,
    operation_additional_info,
    operation_loyalty_bonuses,
    operation_loyalty_payments,
    operation_payments,
    operation_payment_fields,
    receipts,
    receipt_items,
    invest_accounts,
    invest_operation_types,
    invest_operations,
    invest_trades,
    invest_child_operations,
    client_offers,
    client_offer_essences,
    client_offer_essence_mcc_codes,
    client_offer_accounts,
);
