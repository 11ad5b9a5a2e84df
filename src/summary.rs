//! Statistical summaries over normalized rows
//!
//! Unparsed or absent prices are ignored everywhere; they never count as 0.

use crate::constants::AREA_BINS;
use crate::projector::NormalizedRow;
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean/min/max/count over parsed prices
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PriceSummary {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        if count == 0 {
            return Self::default();
        }

        Self {
            count,
            mean: Some(sum / count as f64),
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn from_rows(rows: &[NormalizedRow]) -> Self {
        Self::from_values(rows.iter().filter_map(|row| row.price_billions_krw))
    }
}

/// Price mean/count of one trade type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeTypeSummary {
    pub trade_type: String,
    /// Rows of this trade type, priced or not
    pub listings: usize,
    /// Rows with a parsed price
    pub count: usize,
    pub mean_price: Option<f64>,
}

/// Price mean/count of one exclusive-area bin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaBinSummary {
    pub label: &'static str,
    pub lower_sqm: f64,
    pub upper_sqm: f64,
    /// Rows whose exclusive area falls in the bin
    pub listings: usize,
    /// Rows in the bin with a parsed price
    pub count: usize,
    pub mean_price: Option<f64>,
}

/// All summaries the dashboard shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub overall: PriceSummary,
    pub by_trade_type: Vec<TradeTypeSummary>,
    pub by_area: Vec<AreaBinSummary>,
}

pub fn summarize(rows: &[NormalizedRow]) -> Summary {
    Summary {
        overall: PriceSummary::from_rows(rows),
        by_trade_type: by_trade_type(rows),
        by_area: by_area_bin(rows),
    }
}

/// Groups rows by trade type, ordered by trade type name
pub fn by_trade_type(rows: &[NormalizedRow]) -> Vec<TradeTypeSummary> {
    let mut groups: BTreeMap<&str, (usize, Vec<f64>)> = BTreeMap::new();
    for row in rows {
        let entry = groups.entry(row.trade_type.as_str()).or_default();
        entry.0 += 1;
        if let Some(price) = row.price_billions_krw {
            entry.1.push(price);
        }
    }

    groups
        .into_iter()
        .map(|(trade_type, (listings, prices))| {
            let prices = PriceSummary::from_values(prices);
            TradeTypeSummary {
                trade_type: trade_type.to_string(),
                listings,
                count: prices.count,
                mean_price: prices.mean,
            }
        })
        .collect()
}

/// Index into `AREA_BINS` for an exclusive area; bins are `[lower, upper)`
pub fn area_bin_index(area_sqm: f64) -> Option<usize> {
    AREA_BINS
        .iter()
        .position(|(lower, upper, _)| area_sqm >= *lower && area_sqm < *upper)
}

/// Bins rows by exclusive area; every bin is reported, empty ones included
pub fn by_area_bin(rows: &[NormalizedRow]) -> Vec<AreaBinSummary> {
    let mut bins: Vec<(usize, Vec<f64>)> = vec![(0, Vec::new()); AREA_BINS.len()];
    for row in rows {
        let Some(idx) = row.exclusive_area_sqm.and_then(area_bin_index) else {
            continue;
        };
        bins[idx].0 += 1;
        if let Some(price) = row.price_billions_krw {
            bins[idx].1.push(price);
        }
    }

    AREA_BINS
        .iter()
        .zip(bins)
        .map(|((lower, upper, label), (listings, prices))| {
            let prices = PriceSummary::from_values(prices);
            AreaBinSummary {
                label: *label,
                lower_sqm: *lower,
                upper_sqm: *upper,
                listings,
                count: prices.count,
                mean_price: prices.mean,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawRecord;
    use serde_json::json;

    fn row(trade_type: &str, price: &str, area: Option<f64>) -> NormalizedRow {
        let mut value = json!({
            "tradeTypeName": trade_type,
            "dealOrWarrantPrc": price,
        });
        if let Some(area) = area {
            value["area2"] = json!(area);
        }
        NormalizedRow::from_record(&RawRecord::from(value))
    }

    #[test]
    fn test_overall_ignores_unparsed() {
        let rows = vec![
            row("매매", "10억", None),
            row("매매", "6억", None),
            row("전세", "협의", None),
            row("전세", "", None),
        ];
        let summary = PriceSummary::from_rows(&rows);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, Some(8.0));
        assert_eq!(summary.min, Some(6.0));
        assert_eq!(summary.max, Some(10.0));
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(PriceSummary::from_rows(&[]), PriceSummary::default());
    }

    #[test]
    fn test_by_trade_type() {
        let rows = vec![
            row("전세", "4억", None),
            row("매매", "10억", None),
            row("매매", "8억", None),
            row("전세", "협의", None),
        ];
        let groups = by_trade_type(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].trade_type, "매매");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].mean_price, Some(9.0));
        assert_eq!(groups[1].trade_type, "전세");
        assert_eq!(groups[1].listings, 2);
        assert_eq!(groups[1].count, 1);
        assert_eq!(groups[1].mean_price, Some(4.0));
    }

    #[test]
    fn test_area_boundaries_fall_into_upper_bin() {
        assert_eq!(area_bin_index(0.0), Some(0));
        assert_eq!(area_bin_index(29.99), Some(0));
        assert_eq!(area_bin_index(30.0), Some(1));
        assert_eq!(area_bin_index(60.0), Some(2));
        assert_eq!(area_bin_index(84.99), Some(2));
        assert_eq!(area_bin_index(85.0), Some(3));
        assert_eq!(area_bin_index(120.0), Some(4));
        assert_eq!(area_bin_index(200.0), None);
        assert_eq!(area_bin_index(-1.0), None);
    }

    #[test]
    fn test_by_area_bin() {
        let rows = vec![
            row("매매", "5억", Some(60.0)),
            row("매매", "7억", Some(84.0)),
            row("매매", "협의", Some(59.9)),
            row("매매", "3억", None),
            row("매매", "30억", Some(250.0)),
        ];
        let bins = by_area_bin(&rows);
        assert_eq!(bins.len(), 5);

        assert_eq!(bins[1].label, "30~60㎡");
        assert_eq!(bins[1].listings, 1);
        assert_eq!(bins[1].count, 0);
        assert_eq!(bins[1].mean_price, None);

        assert_eq!(bins[2].label, "60~85㎡");
        assert_eq!(bins[2].listings, 2);
        assert_eq!(bins[2].mean_price, Some(6.0));

        assert_eq!(bins[4].label, "120㎡~");
        assert_eq!(bins[4].listings, 0);
    }

    #[test]
    fn test_summarize() {
        let rows = vec![row("매매", "5억", Some(70.0))];
        let summary = summarize(&rows);
        assert_eq!(summary.overall.count, 1);
        assert_eq!(summary.by_trade_type.len(), 1);
        assert_eq!(summary.by_area[2].count, 1);
    }
}
