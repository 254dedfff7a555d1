//! Diesel schema for the sqlite backend.

diesel::table! {
    orders (client_order_id) {
        client_order_id -> Text,
        side -> Text,
        symbol -> Text,
        quantity -> Text,
        price -> Text,
        created_at_ms -> BigInt,
        updated_at_ms -> BigInt,
        fired_at_ms -> Nullable<BigInt>,
        status -> Text,
        arbitrage_hash8 -> Nullable<BigInt>,
        exchange -> Text,
        exchange_order_id -> Nullable<BigInt>,
        transaction_time_ms -> Nullable<BigInt>,
        comment -> Text,
        raw -> Nullable<Text>,
    }
}

diesel::table! {
    chains (uid) {
        uid -> Text,
        hash8 -> BigInt,
        initial_coin -> Text,
        steps -> Text,
        roi -> Double,
        profit -> Double,
        profit_usd -> Double,
        time_ms -> BigInt,
        comment -> Text,
    }
}
