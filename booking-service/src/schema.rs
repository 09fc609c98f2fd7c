diesel::table! {
    bookings (id) {
        id -> Uuid,
        customer_id -> Uuid,
        voyage_id -> Uuid,
        product_id -> Uuid,
        guests -> Int4,
        status -> Varchar,
        total_amount -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
