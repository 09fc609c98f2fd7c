diesel::table! {
    inventories (product_id) {
        product_id -> Uuid,
        total -> Int4,
        locked -> Int4,
        sold -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    inventory_audit_log (id) {
        id -> Int8,
        product_id -> Uuid,
        change -> Int4,
        reason -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    cabin_holds (id) {
        id -> Uuid,
        product_id -> Uuid,
        customer_id -> Uuid,
        qty -> Int4,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    cabin_prices (id) {
        id -> Int8,
        product_id -> Uuid,
        calendar_date -> Timestamptz,
        occupancy -> Int4,
        unit_price -> Int8,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    inventories,
    inventory_audit_log,
    cabin_holds,
    cabin_prices,
);
