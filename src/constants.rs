//! Constants for the listing ingestion engine
//!
//! Defaults for the runtime configuration live here. `IngestConfig` starts
//! from these values and may override some of them from the environment.

use std::time::Duration;

/// Base URL of the listing service
pub const NAVER_LAND_BASE_URL: &str = "https://new.land.naver.com";

/// Path template of the complex article listing (the target id is appended)
pub const COMPLEX_ARTICLES_PATH: &str = "/api/articles/complex";

/// Pause between two consecutive page requests of one run (in milliseconds)
pub const RATE_LIMIT_INTERVAL_MS: u64 = 1000;

/// HTTP request timeout when fetching a page (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "naver-land-ingest/0.1.0";

/// First page index of the listing endpoint
pub const FIRST_PAGE: u32 = 1;

/// Filter superset sent with every page request.
///
/// Price and area ranges are wide open and the property-type set is fixed.
/// Caller supplied filters replace entries with the same key.
pub const DEFAULT_FILTERS: &[(&str, &str)] = &[
    ("realEstateType", "APT:PRE:ABYG:JGC:OPST"),
    ("tradeType", ""),
    ("tag", "::::::::"),
    ("rentPriceMin", "0"),
    ("rentPriceMax", "900000000"),
    ("priceMin", "0"),
    ("priceMax", "900000000"),
    ("areaMin", "0"),
    ("areaMax", "900000000"),
    ("oldBuildYears", ""),
    ("recentlyBuildYears", ""),
    ("minHouseHoldCount", ""),
    ("maxHouseHoldCount", ""),
    ("showArticle", "false"),
    ("sameAddressGroup", "false"),
    ("minMaintenanceCost", ""),
    ("maxMaintenanceCost", ""),
    ("priceType", "RETAIL"),
    ("directions", ""),
    ("buildingNos", ""),
    ("areaNos", ""),
    ("type", "list"),
    ("order", "rank"),
];

/// Marker of the major currency unit in price strings
pub const MAJOR_UNIT_MARKER: &str = "억";

/// Currency units per major unit
pub const MAJOR_UNIT_WON: u64 = 100_000_000;

/// Currency units per minor unit
pub const MINOR_UNIT_WON: u64 = 10_000;

/// Minor units per major unit
pub const MINOR_PER_MAJOR: f64 = (MAJOR_UNIT_WON / MINOR_UNIT_WON) as f64;

/// Exclusive-area bins in square meters, half-open `[lower, upper)`
pub const AREA_BINS: &[(f64, f64, &str)] = &[
    (0.0, 30.0, "~30㎡"),
    (30.0, 60.0, "30~60㎡"),
    (60.0, 85.0, "60~85㎡"),
    (85.0, 120.0, "85~120㎡"),
    (120.0, 200.0, "120㎡~"),
];

/// Prefix shared by every exported metric family
pub const METRICS_NAMESPACE: &str = "naver_scraper";

/// Upper bounds of the latency histogram buckets (in seconds)
pub const LATENCY_BUCKETS_SECS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Number of recent requests kept per target for percentile snapshots
pub const LATENCY_WINDOW: usize = 100;

/// Default rate-limit interval as a `Duration`
pub fn default_rate_limit_interval() -> Duration {
    Duration::from_millis(RATE_LIMIT_INTERVAL_MS)
}

/// Default request timeout as a `Duration`
pub fn default_request_timeout() -> Duration {
    Duration::from_secs(REQUEST_TIMEOUT_SECS)
}
