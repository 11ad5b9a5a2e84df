//! Projection of raw listing records into the fixed row schema

use crate::metrics::MetricsSink;
use crate::price::normalize;
use crate::summary::PriceSummary;
use crate::types::RawRecord;
use serde::Serialize;
use std::time::Instant;

/// One listing in the normalized schema
///
/// Derived from exactly one [`RawRecord`]. Text fields default to "" and
/// numeric fields to `None` when the source omits them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRow {
    pub id: String,
    pub name: String,
    pub building_name: String,
    pub trade_type: String,
    /// Price text as listed, kept for display
    pub raw_price_text: String,
    /// Parsed price in 억 (100,000,000 KRW); `None` when empty or unparsable
    #[serde(rename = "priceBillionsKRW")]
    pub price_billions_krw: Option<f64>,
    pub area_label: String,
    pub supply_area_sqm: Option<f64>,
    pub exclusive_area_sqm: Option<f64>,
    pub floor_info: String,
    pub direction: String,
    pub tags: Vec<String>,
    pub features: String,
    pub realtor_name: String,
    pub confirmed_date: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NormalizedRow {
    /// Maps one raw record; never fails on missing or mistyped fields
    pub fn from_record(record: &RawRecord) -> Self {
        let raw_price_text = record.text("dealOrWarrantPrc");
        let price_billions_krw = normalize(&raw_price_text).as_f64();

        Self {
            id: record.text("articleNo"),
            name: record.text("articleName"),
            building_name: record.text("buildingName"),
            trade_type: record.text("tradeTypeName"),
            raw_price_text,
            price_billions_krw,
            area_label: record.text("areaName"),
            supply_area_sqm: record.number("area1"),
            exclusive_area_sqm: record.number("area2"),
            floor_info: record.text("floorInfo"),
            direction: record.text("direction"),
            tags: record.string_list("tagList"),
            features: record.text("articleFeatureDesc"),
            realtor_name: record.text("realtorName"),
            confirmed_date: record.text("articleConfirmYmd"),
            latitude: record.number("latitude"),
            longitude: record.number("longitude"),
        }
    }

    /// Tags joined for display
    pub fn tags_display(&self) -> String {
        self.tags.join(", ")
    }

    /// Floor number from floor info like "5/15"
    ///
    /// Returns `None` for non-numeric floors such as "저/15" or "B1/20".
    pub fn floor_number(&self) -> Option<u32> {
        let (floor, _) = self.floor_info.split_once('/')?;
        floor.trim().parse().ok()
    }

    /// Whether the listed price text was present but not numeric
    pub fn has_unparsed_price(&self) -> bool {
        !self.raw_price_text.is_empty() && self.price_billions_krw.is_none()
    }
}

/// Projects every record, preserving order
pub fn project(records: &[RawRecord]) -> Vec<NormalizedRow> {
    records.iter().map(NormalizedRow::from_record).collect()
}

/// Projects records and publishes processing time and price gauges for a target
pub fn project_with_metrics(
    records: &[RawRecord],
    target: &str,
    metrics: &MetricsSink,
) -> Vec<NormalizedRow> {
    let start = Instant::now();
    let rows = project(records);
    let prices = PriceSummary::from_rows(&rows);
    metrics.set_price_statistics(target, &prices);
    metrics.observe_processing_duration(target, start.elapsed());

    let unparsed = rows.iter().filter(|row| row.has_unparsed_price()).count();
    if unparsed > 0 {
        tracing::debug!(complex_no = target, unparsed, "Listings with unparsed price text");
    }

    rows
}
