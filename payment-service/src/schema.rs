diesel::table! {
    payments (id) {
        id -> Uuid,
        order_id -> Uuid,
        provider -> Varchar,
        provider_trade_no -> Varchar,
        amount -> Int8,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    refunds (id) {
        id -> Uuid,
        payment_id -> Uuid,
        amount -> Int8,
        reason -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// Read-only view of booking status for reconciliation.
diesel::table! {
    bookings (id) {
        id -> Uuid,
        status -> Varchar,
    }
}

diesel::joinable!(refunds -> payments (payment_id));

diesel::allow_tables_to_appear_in_same_query!(
    payments,
    refunds,
    bookings,
);
