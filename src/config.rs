use once_cell::sync::Lazy;

/// Base URL of the product inventory registry.
pub static INVENTORY_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("INVENTORY_BASE_URL").unwrap_or_else(|_| "http://localhost:8637".to_string())
});

/// Base URL of the product catalog registry (price specifications).
pub static CATALOG_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("CATALOG_BASE_URL").unwrap_or_else(|_| "http://localhost:8620".to_string())
});

/// Base URL of the billing record store (bill headers and charge line items).
pub static RECORD_STORE_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("RECORD_STORE_BASE_URL").unwrap_or_else(|_| "http://localhost:8678".to_string())
});

/// Base URL of the rating engine that turns (product, window) into charges.
pub static RATING_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("RATING_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
});

/// Cadence of the periodic billing pass, in seconds.
pub static BILLING_SCAN_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("BILLING_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(3600)
});

/// Days the evaluation instant is shifted back for usage-based charge
/// kinds, so usage metering can settle before rating.
pub static USAGE_SETTLEMENT_DELAY_DAYS: Lazy<i64> = Lazy::new(|| {
    std::env::var("USAGE_SETTLEMENT_DELAY_DAYS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 0)
        .unwrap_or(3)
});

/// How many months the catch-up pass looks back for unbilled windows.
/// Zero disables the catch-up pass.
pub static CATCHUP_MONTHS_BACK: Lazy<u32> = Lazy::new(|| {
    std::env::var("CATCHUP_MONTHS_BACK")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(1)
});

/// Batch size for paginated fetches from the external registries.
pub static FETCH_PAGE_SIZE: Lazy<u32> = Lazy::new(|| {
    std::env::var("FETCH_PAGE_SIZE")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(50)
});
