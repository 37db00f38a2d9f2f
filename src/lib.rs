//! # Merchant Margin History
//!
//! A library for turning monthly merchant-processing spreadsheet exports into a
//! per-merchant (MID) gross margin history, with summaries, KPIs and a
//! filterable, exportable detail table.
//!
//! ## Core Concepts
//!
//! - **Period**: one uploaded month, identified by the `" - <Month> <Year>"` token in the file name
//! - **Merchant Record**: one MID's volumes and agent net for a period, with derived total volume and margin
//! - **Gross Margin %**: agent net as a percentage of total volume; absent (not zero) without volume
//! - **Merged Row**: a selected period's record joined with the MID's margins in every other period
//! - **Change Column**: margin difference between two chronologically adjacent periods
//!
//! ## Example
//!
//! ```rust,ignore
//! use merchant_margin_history::*;
//!
//! let mut dashboard = MarginDashboard::new(DashboardConfig::default())?;
//! let report = dashboard.ingest(&[
//!     UploadPayload::from_data_url("Residuals - January 2024.xls", &jan_contents)?,
//!     UploadPayload::from_data_url("Residuals - February 2024.xls", &feb_contents)?,
//! ]);
//! assert!(!report.has_failures());
//!
//! let request = DetailRequest {
//!     period: Some("February 2024".to_string()),
//!     filter: FilterSelector::Declining,
//!     columns: dashboard.column_catalog().default_selection(),
//! };
//! if let ViewState::Ready(view) = dashboard.detail(&request)? {
//!     let export = view.csv_export()?;
//!     std::fs::write(&export.filename, export.contents)?;
//! }
//! ```

pub mod aggregate;
pub mod columns;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingestion;
pub mod merge;
pub mod projection;
pub mod schema;
pub mod store;
pub mod utils;
pub mod workbook;

pub use aggregate::{chart_series, kpis, summarize, ChartSeries, Kpi, KpiSet, MarginGauge, MonthlySummary};
pub use columns::{CatalogEntry, CellValue, ColumnCatalog, ColumnGroup, ColumnId, ValueFormat};
pub use config::DashboardConfig;
pub use error::{MarginHistoryError, Result};
pub use filter::{filter_rows, FilterSelector, MarginBand, MarginThresholds, Trend};
pub use ingestion::*;
pub use merge::{merge_period, MergedDataset, MergedRow};
pub use projection::{
    build_detail_view, export_columns, export_filename, CsvExport, DetailView, ProjectedTable,
    QuickStats,
};
pub use schema::*;
pub use store::{Period, PeriodKey, PeriodStore};
pub use utils::*;
pub use workbook::UploadPayload;

use log::{info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Why a view has nothing to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    NoData,
    NoPeriodSelected,
    NoColumnsSelected,
}

impl Placeholder {
    pub fn message(&self) -> &'static str {
        match self {
            Placeholder::NoData => "Please upload files to view analytics.",
            Placeholder::NoPeriodSelected => "Please select a month to view MID details.",
            Placeholder::NoColumnsSelected => "Please select at least one column to display.",
        }
    }
}

/// A derived view, or the placeholder to render instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum ViewState<T> {
    Ready(T),
    Placeholder(Placeholder),
}

impl<T> ViewState<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            ViewState::Ready(value) => Some(value),
            ViewState::Placeholder(_) => None,
        }
    }

    pub fn placeholder(&self) -> Option<Placeholder> {
        match self {
            ViewState::Ready(_) => None,
            ViewState::Placeholder(p) => Some(*p),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ViewState::Ready(_))
    }
}

/// Detail table request coming from the month picker, filter dropdown and
/// column checklists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DetailRequest {
    /// Month label ("March 2024") or key ("2024-03").
    pub period: Option<String>,
    pub filter: FilterSelector,
    pub columns: Vec<ColumnId>,
}

/// Everything the overview part of the dashboard renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardSnapshot {
    pub periods: Vec<String>,
    pub catalog: ColumnCatalog,
    pub summaries: ViewState<Vec<MonthlySummary>>,
    pub kpis: ViewState<KpiSet>,
    pub charts: ViewState<ChartSeries>,
}

impl DashboardSnapshot {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardSnapshot)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// JSON schema of the overview payload handed to a front end.
pub fn presentation_schema() -> schemars::schema::RootSchema {
    DashboardSnapshot::generate_json_schema()
}

/// One user's dashboard session. Each session owns its own store; nothing is
/// shared between sessions.
#[derive(Debug, Clone, Default)]
pub struct MarginDashboard {
    config: DashboardConfig,
    store: PeriodStore,
}

impl MarginDashboard {
    pub fn new(config: DashboardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store: PeriodStore::new(),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn store(&self) -> &PeriodStore {
        &self.store
    }

    fn thresholds(&self) -> MarginThresholds {
        MarginThresholds::from(&self.config)
    }

    /// Ingests an upload batch. Each file is parsed completely before it
    /// touches the store, so a failing file leaves earlier data intact while
    /// the other files of the batch still load.
    pub fn ingest(&mut self, uploads: &[UploadPayload]) -> UploadReport {
        let outcomes = uploads
            .iter()
            .map(|payload| {
                let parsed = ingest_payload(payload, &self.config);
                self.apply(&payload.filename, parsed)
            })
            .collect();

        UploadReport { outcomes }
    }

    /// Ingests a sheet that was already read into a table (footer removed).
    pub fn ingest_table(&mut self, filename: &str, table: &RawTable) -> IngestOutcome {
        let parsed = ingestion::ingest_table(filename, table, &self.config);
        self.apply(filename, parsed)
    }

    fn apply(&mut self, filename: &str, parsed: Result<Period>) -> IngestOutcome {
        match parsed {
            Ok(period) => {
                let key = period.key;
                let records = period.records.len();
                let replaced = self.store.upsert(period).is_some();
                IngestOutcome::Loaded {
                    filename: filename.to_string(),
                    period: key,
                    records,
                    replaced,
                }
            }
            Err(MarginHistoryError::UnrecognizedFilename(_)) => {
                warn!("Skipping '{}': no month/year in file name", filename);
                IngestOutcome::Skipped {
                    filename: filename.to_string(),
                }
            }
            Err(error) => {
                warn!("Rejected '{}': {}", filename, error);
                IngestOutcome::Failed {
                    filename: filename.to_string(),
                    error,
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.store.clear();
        info!("Dashboard session reset");
    }

    /// Uploaded months, chronological.
    pub fn period_labels(&self) -> Vec<String> {
        self.store.labels()
    }

    pub fn column_catalog(&self) -> ColumnCatalog {
        ColumnCatalog::from_store(&self.store)
    }

    pub fn summaries(&self) -> ViewState<Vec<MonthlySummary>> {
        if self.store.is_empty() {
            return ViewState::Placeholder(Placeholder::NoData);
        }
        ViewState::Ready(summarize(&self.store))
    }

    pub fn kpis(&self) -> ViewState<KpiSet> {
        match kpis(&summarize(&self.store)) {
            Some(set) => ViewState::Ready(set),
            None => ViewState::Placeholder(Placeholder::NoData),
        }
    }

    pub fn charts(&self) -> ViewState<ChartSeries> {
        if self.store.is_empty() {
            return ViewState::Placeholder(Placeholder::NoData);
        }
        ViewState::Ready(chart_series(&summarize(&self.store)))
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            periods: self.period_labels(),
            catalog: self.column_catalog(),
            summaries: self.summaries(),
            kpis: self.kpis(),
            charts: self.charts(),
        }
    }

    /// Builds the detail table. Missing data, a missing month selection and
    /// an empty column selection come back as placeholders; a month that was
    /// never uploaded is an error.
    pub fn detail(&self, request: &DetailRequest) -> Result<ViewState<DetailView>> {
        if self.store.is_empty() {
            return Ok(ViewState::Placeholder(Placeholder::NoData));
        }

        let Some(label) = request.period.as_deref() else {
            return Ok(ViewState::Placeholder(Placeholder::NoPeriodSelected));
        };
        let target = self.store.find(label)?.key;

        match build_detail_view(
            &self.store,
            target,
            request.filter,
            &request.columns,
            &self.thresholds(),
        ) {
            Ok(view) => Ok(ViewState::Ready(view)),
            Err(MarginHistoryError::EmptyColumnSelection) => {
                Ok(ViewState::Placeholder(Placeholder::NoColumnsSelected))
            }
            Err(e) => Err(e),
        }
    }

    /// CSV download of the rows the detail view currently shows.
    pub fn export(&self, request: &DetailRequest) -> Result<ViewState<CsvExport>> {
        match self.detail(request)? {
            ViewState::Ready(view) => Ok(ViewState::Ready(view.csv_export()?)),
            ViewState::Placeholder(p) => Ok(ViewState::Placeholder(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str, f64, f64)]) -> RawTable {
        let mut headers = vec![
            "MID".to_string(),
            "DBA Name".to_string(),
            "Agent Net".to_string(),
        ];
        headers.extend(VolumeComponent::ALL.iter().map(|c| c.column_name().to_string()));

        let rows = rows
            .iter()
            .map(|(mid, dba, net, card)| {
                let mut cells = vec![
                    RawCell::Text(mid.to_string()),
                    RawCell::Text(dba.to_string()),
                    RawCell::Number(*net),
                    RawCell::Number(*card),
                ];
                cells.extend(std::iter::repeat(RawCell::Number(0.0)).take(6));
                cells
            })
            .collect();

        RawTable::new(headers, rows)
    }

    #[test]
    fn test_end_to_end_two_months() {
        let mut dashboard = MarginDashboard::default();
        let jan = dashboard.ingest_table("Report - January 2024.xls", &table(&[("1", "A", 10.0, 100.0)]));
        let feb = dashboard.ingest_table("Report - February 2024.xls", &table(&[("1", "A", 5.0, 100.0)]));
        assert!(jan.is_loaded());
        assert!(feb.is_loaded());

        let mut request = DetailRequest {
            period: Some("February 2024".to_string()),
            filter: FilterSelector::Declining,
            columns: dashboard.column_catalog().select_all(),
        };
        let view = dashboard.detail(&request).unwrap().ready().unwrap();
        assert_eq!(view.table.len(), 1);

        let jan_key = PeriodKey::new(2024, 1).unwrap();
        let feb_key = PeriodKey::new(2024, 2).unwrap();
        assert_eq!(
            view.table.value(
                0,
                &ColumnId::MarginDelta {
                    from: jan_key,
                    to: feb_key
                }
            ),
            Some(&CellValue::Number(-5.0))
        );

        request.filter = FilterSelector::Improving;
        let view = dashboard.detail(&request).unwrap().ready().unwrap();
        assert!(view.table.is_empty());
    }

    #[test]
    fn test_placeholders() {
        let mut dashboard = MarginDashboard::default();
        let request = DetailRequest {
            period: Some("January 2024".to_string()),
            columns: vec![ColumnId::Mid],
            ..Default::default()
        };

        assert_eq!(dashboard.summaries().placeholder(), Some(Placeholder::NoData));
        assert_eq!(dashboard.kpis().placeholder(), Some(Placeholder::NoData));
        assert_eq!(dashboard.charts().placeholder(), Some(Placeholder::NoData));
        assert_eq!(
            dashboard.detail(&request).unwrap().placeholder(),
            Some(Placeholder::NoData)
        );

        dashboard.ingest_table("Report - January 2024.xls", &table(&[("1", "A", 1.0, 10.0)]));

        let no_period = DetailRequest {
            period: None,
            ..request.clone()
        };
        assert_eq!(
            dashboard.detail(&no_period).unwrap().placeholder(),
            Some(Placeholder::NoPeriodSelected)
        );

        let no_columns = DetailRequest {
            columns: vec![],
            ..request.clone()
        };
        assert_eq!(
            dashboard.export(&no_columns).unwrap().placeholder(),
            Some(Placeholder::NoColumnsSelected)
        );

        let unknown = DetailRequest {
            period: Some("June 2020".to_string()),
            ..request
        };
        assert!(matches!(
            dashboard.detail(&unknown),
            Err(MarginHistoryError::UnknownPeriod(_))
        ));
    }

    #[test]
    fn test_unrecognized_filename_is_skipped() {
        let mut dashboard = MarginDashboard::default();
        let outcome = dashboard.ingest_table("summary.xls", &table(&[("1", "A", 1.0, 10.0)]));
        assert!(matches!(outcome, IngestOutcome::Skipped { .. }));
        assert!(dashboard.store().is_empty());
    }

    #[test]
    fn test_failed_file_leaves_store_untouched() {
        let mut dashboard = MarginDashboard::default();
        dashboard.ingest_table("Report - January 2024.xls", &table(&[("1", "A", 1.0, 10.0)]));

        let mut bad = table(&[("1", "B", 2.0, 20.0)]);
        bad.rows[0][2] = RawCell::Text("twelve".to_string());
        let outcome = dashboard.ingest_table("Report - January 2024.xls", &bad);

        assert!(matches!(
            outcome,
            IngestOutcome::Failed {
                error: MarginHistoryError::InvalidNumber { .. },
                ..
            }
        ));
        let period = dashboard.store().find("January 2024").unwrap();
        assert_eq!(period.records[0].dba_name, "A");
    }

    #[test]
    fn test_snapshot_schema_and_serialization() {
        let root = presentation_schema();
        assert!(root.definitions.contains_key("ColumnCatalog"));

        let schema = DashboardSnapshot::schema_as_json().unwrap();
        assert!(schema.contains("summaries"));
        assert!(schema.contains("catalog"));

        let dashboard = MarginDashboard::default();
        let json = serde_json::to_string(&dashboard.snapshot()).unwrap();
        assert!(json.contains(r#""summaries":{"state":"placeholder","data":"no_data"}"#));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DashboardConfig {
            subtotal_marker: String::new(),
            ..Default::default()
        };
        assert!(MarginDashboard::new(config).is_err());
    }
}
