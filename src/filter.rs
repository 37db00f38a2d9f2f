use crate::config::DashboardConfig;
use crate::error::MarginHistoryError;
use crate::merge::{MergedDataset, MergedRow};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Named row filter for the detail table. Numeric predicates look at the
/// selected period's own margin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterSelector {
    #[default]
    All,
    Positive,
    Negative,
    High,
    Low,
    /// Margin went up from the previous period.
    Improving,
    /// Margin went down from the previous period.
    Declining,
}

impl FilterSelector {
    pub const ALL: [FilterSelector; 7] = [
        FilterSelector::All,
        FilterSelector::Positive,
        FilterSelector::Negative,
        FilterSelector::High,
        FilterSelector::Low,
        FilterSelector::Improving,
        FilterSelector::Declining,
    ];

    pub fn label(&self, thresholds: &MarginThresholds) -> String {
        match self {
            FilterSelector::All => "All Margins".to_string(),
            FilterSelector::Positive => "Positive Margins Only".to_string(),
            FilterSelector::Negative => "Negative Margins Only".to_string(),
            FilterSelector::High => format!("High Margins (>{}%)", thresholds.high),
            FilterSelector::Low => format!("Low Margins (<{}%)", thresholds.low),
            FilterSelector::Improving => "Improving Margins".to_string(),
            FilterSelector::Declining => "Declining Margins".to_string(),
        }
    }

    fn matches(&self, row: &MergedRow, dataset: &MergedDataset, thresholds: &MarginThresholds) -> bool {
        let margin = row.current_margin();
        match self {
            FilterSelector::All => true,
            FilterSelector::Positive => margin.is_some_and(|m| m > 0.0),
            FilterSelector::Negative => margin.is_some_and(|m| m < 0.0),
            FilterSelector::High => margin.is_some_and(|m| m > thresholds.high),
            FilterSelector::Low => margin.is_some_and(|m| m < thresholds.low),
            FilterSelector::Improving => target_delta(row, dataset).is_some_and(|d| d > 0.0),
            FilterSelector::Declining => target_delta(row, dataset).is_some_and(|d| d < 0.0),
        }
    }
}

impl FromStr for FilterSelector {
    type Err = MarginHistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FilterSelector::All),
            "positive" => Ok(FilterSelector::Positive),
            "negative" => Ok(FilterSelector::Negative),
            "high" => Ok(FilterSelector::High),
            "low" => Ok(FilterSelector::Low),
            "improving" => Ok(FilterSelector::Improving),
            "declining" => Ok(FilterSelector::Declining),
            other => Err(MarginHistoryError::InvalidConfig(format!(
                "unknown filter '{}'",
                other
            ))),
        }
    }
}

// No earlier period means no change column, so nothing improves or declines.
fn target_delta(row: &MergedRow, dataset: &MergedDataset) -> Option<f64> {
    let (from, to) = dataset.target_delta()?;
    row.delta(from, to)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarginThresholds {
    pub high: f64,
    pub low: f64,
}

impl Default for MarginThresholds {
    fn default() -> Self {
        Self { high: 5.0, low: 1.0 }
    }
}

impl From<&DashboardConfig> for MarginThresholds {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            high: config.high_margin_threshold,
            low: config.low_margin_threshold,
        }
    }
}

/// Applies the selector and orders the survivors by total volume, largest
/// first. Equal volumes keep their merged order.
pub fn filter_rows<'a>(
    dataset: &'a MergedDataset,
    selector: FilterSelector,
    thresholds: &MarginThresholds,
) -> Vec<&'a MergedRow> {
    let mut rows: Vec<&MergedRow> = dataset
        .rows
        .iter()
        .filter(|row| selector.matches(row, dataset, thresholds))
        .collect();

    rows.sort_by(|a, b| b.record.total_volume.total_cmp(&a.record.total_volume));
    rows
}

/// Highlighting band for a margin cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MarginBand {
    High,
    Moderate,
    Negative,
    Neutral,
}

impl MarginBand {
    pub fn classify(margin: Option<f64>, thresholds: &MarginThresholds) -> Self {
        match margin {
            Some(m) if m > thresholds.high => MarginBand::High,
            Some(m) if m > 0.0 => MarginBand::Moderate,
            Some(m) if m < 0.0 => MarginBand::Negative,
            _ => MarginBand::Neutral,
        }
    }
}

/// Highlighting for a change cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn classify(change: f64) -> Self {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge_period;
    use crate::schema::{MerchantRecord, VolumeBreakdown};
    use crate::store::{Period, PeriodKey, PeriodStore};

    fn key(year: i32, month: u32) -> PeriodKey {
        PeriodKey::new(year, month).unwrap()
    }

    fn record(mid: &str, net: f64, volume: f64) -> MerchantRecord {
        let volumes = VolumeBreakdown {
            card_network: volume,
            ..Default::default()
        };
        MerchantRecord::new(mid, "DBA", volumes, net)
    }

    fn mids(rows: &[&MergedRow]) -> Vec<String> {
        rows.iter().map(|r| r.record.mid.clone()).collect()
    }

    fn single_period_store() -> PeriodStore {
        let mut store = PeriodStore::new();
        store.upsert(Period::new(
            key(2024, 1),
            "upload.xls",
            vec![
                record("pos", 2.0, 100.0),    // 2%
                record("neg", -3.0, 100.0),   // -3%
                record("high", 12.0, 200.0),  // 6%
                record("zero", 0.0, 50.0),    // 0%
                record("none", 4.0, 0.0),     // no data
            ],
        ));
        store
    }

    #[test]
    fn test_numeric_filters() {
        let store = single_period_store();
        let merged = merge_period(&store, key(2024, 1)).unwrap();
        let t = MarginThresholds::default();

        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::All, &t)),
            vec!["high", "pos", "neg", "zero", "none"]
        );
        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::Positive, &t)),
            vec!["high", "pos"]
        );
        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::Negative, &t)),
            vec!["neg"]
        );
        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::High, &t)),
            vec!["high"]
        );
        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::Low, &t)),
            vec!["neg", "zero"]
        );
    }

    #[test]
    fn test_trend_filters_without_prior_period_match_nothing() {
        let store = single_period_store();
        let merged = merge_period(&store, key(2024, 1)).unwrap();
        let t = MarginThresholds::default();

        assert!(filter_rows(&merged, FilterSelector::Improving, &t).is_empty());
        assert!(filter_rows(&merged, FilterSelector::Declining, &t).is_empty());
    }

    #[test]
    fn test_trend_filters_use_change_into_target() {
        let jan = key(2024, 1);
        let feb = key(2024, 2);
        let mut store = PeriodStore::new();
        store.upsert(Period::new(
            jan,
            "a.xls",
            vec![record("up", 1.0, 100.0), record("down", 10.0, 100.0)],
        ));
        store.upsert(Period::new(
            feb,
            "b.xls",
            vec![
                record("up", 4.0, 100.0),
                record("down", 5.0, 100.0),
                record("new", 9.0, 100.0),
            ],
        ));

        let merged = merge_period(&store, feb).unwrap();
        let t = MarginThresholds::default();
        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::Improving, &t)),
            vec!["up"]
        );
        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::Declining, &t)),
            vec!["down"]
        );
    }

    #[test]
    fn test_volume_sort_is_stable() {
        let mut store = PeriodStore::new();
        store.upsert(Period::new(
            key(2024, 1),
            "a.xls",
            vec![
                record("a", 1.0, 50.0),
                record("b", 1.0, 80.0),
                record("c", 1.0, 50.0),
                record("d", 1.0, 50.0),
            ],
        ));
        let merged = merge_period(&store, key(2024, 1)).unwrap();
        assert_eq!(
            mids(&filter_rows(&merged, FilterSelector::All, &MarginThresholds::default())),
            vec!["b", "a", "c", "d"]
        );
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("Declining".parse::<FilterSelector>().unwrap(), FilterSelector::Declining);
        assert!("sideways".parse::<FilterSelector>().is_err());
        let json = serde_json::to_string(&FilterSelector::High).unwrap();
        assert_eq!(json, "\"high\"");
    }

    #[test]
    fn test_bands() {
        let t = MarginThresholds::default();
        assert_eq!(MarginBand::classify(Some(5.5), &t), MarginBand::High);
        assert_eq!(MarginBand::classify(Some(5.0), &t), MarginBand::Moderate);
        assert_eq!(MarginBand::classify(Some(-0.1), &t), MarginBand::Negative);
        assert_eq!(MarginBand::classify(Some(0.0), &t), MarginBand::Neutral);
        assert_eq!(MarginBand::classify(None, &t), MarginBand::Neutral);
        assert_eq!(Trend::classify(-1.0), Trend::Down);
        assert_eq!(
            FilterSelector::High.label(&t),
            "High Margins (>5%)"
        );
    }
}
