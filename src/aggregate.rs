use crate::filter::Trend;
use crate::schema::gross_margin_pct;
use crate::store::{Period, PeriodKey, PeriodStore};
use crate::utils::{format_count, format_currency, format_signed_count, format_signed_currency};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-period totals with the change from the period before.
/// The first period's changes are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlySummary {
    pub period: PeriodKey,
    pub label: String,
    pub total_mids: usize,
    /// MIDs with positive total volume.
    pub processing_mids: usize,
    /// MIDs with positive agent net.
    pub positive_net_mids: usize,
    pub total_profit: f64,
    pub total_volume: f64,
    pub total_mids_change: i64,
    pub processing_mids_change: i64,
    pub positive_net_mids_change: i64,
    pub total_profit_change: f64,
    pub total_volume_change: f64,
}

impl MonthlySummary {
    fn from_period(period: &Period) -> Self {
        let records = &period.records;
        Self {
            period: period.key,
            label: period.label.clone(),
            total_mids: records.len(),
            processing_mids: records.iter().filter(|r| r.is_processing()).count(),
            positive_net_mids: records.iter().filter(|r| r.agent_net > 0.0).count(),
            total_profit: records.iter().map(|r| r.agent_net).sum(),
            total_volume: records.iter().map(|r| r.total_volume).sum(),
            total_mids_change: 0,
            processing_mids_change: 0,
            positive_net_mids_change: 0,
            total_profit_change: 0.0,
            total_volume_change: 0.0,
        }
    }

    fn apply_changes_from(&mut self, prev: &MonthlySummary) {
        self.total_mids_change = self.total_mids as i64 - prev.total_mids as i64;
        self.processing_mids_change = self.processing_mids as i64 - prev.processing_mids as i64;
        self.positive_net_mids_change =
            self.positive_net_mids as i64 - prev.positive_net_mids as i64;
        self.total_profit_change = self.total_profit - prev.total_profit;
        self.total_volume_change = self.total_volume - prev.total_volume;
    }

    /// Portfolio-wide margin %, absent when the period processed no volume.
    pub fn overall_margin(&self) -> Option<f64> {
        gross_margin_pct(self.total_profit, self.total_volume)
    }
}

/// One summary per stored period, chronological.
pub fn summarize(store: &PeriodStore) -> Vec<MonthlySummary> {
    let mut summaries: Vec<MonthlySummary> = store
        .all_periods_chronological()
        .into_iter()
        .map(MonthlySummary::from_period)
        .collect();

    for i in 1..summaries.len() {
        let prev = summaries[i - 1].clone();
        summaries[i].apply_changes_from(&prev);
    }

    summaries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Kpi {
    pub title: String,
    pub value: f64,
    /// Change from the previous period; absent with a single period.
    pub change: Option<f64>,
    pub display: String,
    pub change_display: Option<String>,
    pub trend: Option<Trend>,
}

impl Kpi {
    fn currency(title: &str, value: f64, change: Option<f64>) -> Self {
        Self {
            title: title.to_string(),
            value,
            change,
            display: format_currency(value),
            change_display: change.map(format_signed_currency),
            trend: change.map(Trend::classify),
        }
    }

    fn count(title: &str, value: usize, change: Option<i64>) -> Self {
        Self {
            title: title.to_string(),
            value: value as f64,
            change: change.map(|c| c as f64),
            display: format_count(value as i64),
            change_display: change.map(format_signed_count),
            trend: change.map(|c| Trend::classify(c as f64)),
        }
    }
}

/// Headline figures for the latest period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiSet {
    pub period: PeriodKey,
    pub label: String,
    pub total_profit: Kpi,
    pub mid_volume: Kpi,
    pub total_mids: Kpi,
    pub processing_mids: Kpi,
}

pub fn kpis(summaries: &[MonthlySummary]) -> Option<KpiSet> {
    let latest = summaries.last()?;
    let has_prev = summaries.len() > 1;

    Some(KpiSet {
        period: latest.period,
        label: latest.label.clone(),
        total_profit: Kpi::currency(
            "Total Profit",
            latest.total_profit,
            has_prev.then_some(latest.total_profit_change),
        ),
        mid_volume: Kpi::currency(
            "MID Volume",
            latest.total_volume,
            has_prev.then_some(latest.total_volume_change),
        ),
        total_mids: Kpi::count(
            "Total MIDs",
            latest.total_mids,
            has_prev.then_some(latest.total_mids_change),
        ),
        processing_mids: Kpi::count(
            "Processing MIDs",
            latest.processing_mids,
            has_prev.then_some(latest.processing_mids_change),
        ),
    })
}

/// Latest overall margin with the previous period's value as reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarginGauge {
    pub label: String,
    pub value: Option<f64>,
    pub reference: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChartSeries {
    pub months: Vec<String>,
    pub total_profit: Vec<f64>,
    pub mid_volume: Vec<f64>,
    pub total_mids: Vec<usize>,
    pub processing_mids: Vec<usize>,
    pub positive_net_mids: Vec<usize>,
    pub margin_gauge: Option<MarginGauge>,
}

pub fn chart_series(summaries: &[MonthlySummary]) -> ChartSeries {
    let margin_gauge = summaries.last().map(|latest| MarginGauge {
        label: latest.label.clone(),
        value: latest.overall_margin(),
        reference: summaries
            .len()
            .checked_sub(2)
            .and_then(|i| summaries[i].overall_margin()),
    });

    ChartSeries {
        months: summaries.iter().map(|s| s.label.clone()).collect(),
        total_profit: summaries.iter().map(|s| s.total_profit).collect(),
        mid_volume: summaries.iter().map(|s| s.total_volume).collect(),
        total_mids: summaries.iter().map(|s| s.total_mids).collect(),
        processing_mids: summaries.iter().map(|s| s.processing_mids).collect(),
        positive_net_mids: summaries.iter().map(|s| s.positive_net_mids).collect(),
        margin_gauge,
    }
}
