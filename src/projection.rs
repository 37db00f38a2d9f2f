use crate::columns::{CatalogEntry, CellValue, ColumnId, IDENTITY_COLUMNS};
use crate::error::{MarginHistoryError, Result};
use crate::filter::{filter_rows, FilterSelector, MarginThresholds};
use crate::merge::{merge_period, MergedDataset, MergedRow};
use crate::store::{PeriodKey, PeriodStore};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io;

/// Rows restricted to a set of columns. `None` cells are "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectedTable {
    pub columns: Vec<CatalogEntry>,
    pub rows: Vec<Vec<Option<CellValue>>>,
}

impl ProjectedTable {
    fn build(columns: Vec<ColumnId>, rows: &[&MergedRow]) -> Self {
        let data = rows
            .iter()
            .map(|row| columns.iter().map(|c| row.value(c)).collect())
            .collect();

        Self {
            columns: columns.into_iter().map(CatalogEntry::from).collect(),
            rows: data,
        }
    }

    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|c| c.id).collect()
    }

    pub fn column_index(&self, id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| c.id == *id)
    }

    pub fn value(&self, row: usize, id: &ColumnId) -> Option<&CellValue> {
        let col = self.column_index(id)?;
        self.rows.get(row)?.get(col)?.as_ref()
    }

    /// Cells formatted for display; "no data" renders as an empty string.
    pub fn render(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.columns)
                    .map(|(cell, column)| {
                        cell.as_ref()
                            .map(|v| v.render(column.format))
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Comma-separated text with a header row of column names and no index
    /// column. Numbers keep full precision; "no data" is an empty field.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;

        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| match cell {
                Some(CellValue::Text(s)) => s.clone(),
                Some(CellValue::Number(n)) => n.to_string(),
                None => String::new(),
            }))?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

/// Keeps the requested columns that exist for this dataset, in catalog order.
pub fn project_display(
    dataset: &MergedDataset,
    rows: &[&MergedRow],
    requested: &[ColumnId],
) -> Result<ProjectedTable> {
    if requested.is_empty() {
        return Err(MarginHistoryError::EmptyColumnSelection);
    }

    let columns = dataset.catalog().resolve(requested);
    if columns.is_empty() {
        return Err(MarginHistoryError::EmptyColumnSelection);
    }

    Ok(ProjectedTable::build(columns, rows))
}

/// Columns written on export regardless of the display selection: identity,
/// every margin and change column, then the volume breakdown.
pub fn export_columns(dataset: &MergedDataset) -> Vec<ColumnId> {
    let catalog = dataset.catalog();
    let mut columns = IDENTITY_COLUMNS.to_vec();
    columns.push(ColumnId::GrossMarginPct);
    columns.extend(
        catalog
            .entries
            .iter()
            .map(|e| e.id)
            .filter(|id| matches!(id, ColumnId::Margin { .. } | ColumnId::MarginDelta { .. })),
    );
    columns.extend(ColumnId::volume_columns());
    columns
}

pub fn project_export(dataset: &MergedDataset, rows: &[&MergedRow]) -> ProjectedTable {
    ProjectedTable::build(export_columns(dataset), rows)
}

pub fn export_filename(label: &str) -> String {
    format!("gross_margin_{}_comparison.csv", label)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CsvExport {
    pub filename: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuickStats {
    pub total_records: usize,
    /// Mean of the defined current-period margins.
    pub average_margin: Option<f64>,
    pub total_volume: f64,
    /// Rows with a margin in at least one other period.
    pub mids_with_history: usize,
    pub periods_available: usize,
}

impl QuickStats {
    pub fn compute(dataset: &MergedDataset, rows: &[&MergedRow]) -> Self {
        let margins: Vec<f64> = rows.iter().filter_map(|r| r.current_margin()).collect();
        let average_margin =
            (!margins.is_empty()).then(|| margins.iter().sum::<f64>() / margins.len() as f64);

        Self {
            total_records: rows.len(),
            average_margin,
            total_volume: rows.iter().map(|r| r.record.total_volume).sum(),
            mids_with_history: rows.iter().filter(|r| r.has_history(dataset.target)).count(),
            periods_available: dataset.periods.len(),
        }
    }
}

/// Detail view of one period: the filtered display table, the export table
/// for the same rows and summary stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetailView {
    pub period: PeriodKey,
    pub label: String,
    pub filter: FilterSelector,
    pub table: ProjectedTable,
    pub export: ProjectedTable,
    pub stats: QuickStats,
    pub available_columns: usize,
}

impl DetailView {
    pub fn csv_export(&self) -> Result<CsvExport> {
        Ok(CsvExport {
            filename: export_filename(&self.label),
            contents: self.export.to_csv()?,
        })
    }
}

pub fn build_detail_view(
    store: &PeriodStore,
    target: PeriodKey,
    filter: FilterSelector,
    requested: &[ColumnId],
    thresholds: &MarginThresholds,
) -> Result<DetailView> {
    if requested.is_empty() {
        return Err(MarginHistoryError::EmptyColumnSelection);
    }

    let dataset = merge_period(store, target)?;
    let rows = filter_rows(&dataset, filter, thresholds);
    let table = project_display(&dataset, &rows, requested)?;
    let export = project_export(&dataset, &rows);
    let stats = QuickStats::compute(&dataset, &rows);

    debug!(
        "Detail view for {} with {:?}: {} of {} rows, {} columns shown",
        target.label(),
        filter,
        rows.len(),
        dataset.len(),
        table.columns.len()
    );

    Ok(DetailView {
        period: target,
        label: target.label(),
        filter,
        table,
        export,
        stats,
        available_columns: dataset.catalog().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MerchantRecord, VolumeBreakdown};
    use crate::store::Period;

    fn key(year: i32, month: u32) -> PeriodKey {
        PeriodKey::new(year, month).unwrap()
    }

    fn record(mid: &str, net: f64, card: f64, amex: f64) -> MerchantRecord {
        let volumes = VolumeBreakdown {
            card_network: card,
            amex,
            ..Default::default()
        };
        MerchantRecord::new(mid, format!("Shop {}", mid), volumes, net)
    }

    fn two_month_store() -> PeriodStore {
        let mut store = PeriodStore::new();
        store.upsert(Period::new(
            key(2024, 1),
            "Report - January 2024.xls",
            vec![record("1", 10.0, 100.0, 0.0), record("2", 1.0, 50.0, 0.0)],
        ));
        store.upsert(Period::new(
            key(2024, 2),
            "Report - February 2024.xls",
            vec![
                record("1", 5.0, 80.0, 20.0),
                record("3", -2.0, 200.0, 0.0),
                record("4", 1.0, 0.0, 0.0),
            ],
        ));
        store
    }

    #[test]
    fn test_empty_selection_is_reported() {
        let store = two_month_store();
        let result = build_detail_view(
            &store,
            key(2024, 2),
            FilterSelector::All,
            &[],
            &MarginThresholds::default(),
        );
        assert!(matches!(result, Err(MarginHistoryError::EmptyColumnSelection)));

        let dataset = merge_period(&store, key(2024, 2)).unwrap();
        let unknown = [ColumnId::Margin {
            period: key(2020, 1),
        }];
        assert!(matches!(
            project_display(&dataset, &[], &unknown),
            Err(MarginHistoryError::EmptyColumnSelection)
        ));
    }

    #[test]
    fn test_display_only_requested_columns() {
        let store = two_month_store();
        let view = build_detail_view(
            &store,
            key(2024, 2),
            FilterSelector::All,
            &[ColumnId::GrossMarginPct, ColumnId::Mid],
            &MarginThresholds::default(),
        )
        .unwrap();

        assert_eq!(view.table.column_ids(), vec![ColumnId::Mid, ColumnId::GrossMarginPct]);
        // Sorted by volume: 3 (200), 1 (100), 4 (0)
        let mids: Vec<_> = (0..view.table.len())
            .map(|i| view.table.value(i, &ColumnId::Mid).cloned())
            .collect();
        assert_eq!(
            mids,
            vec![
                Some(CellValue::Text("3".into())),
                Some(CellValue::Text("1".into())),
                Some(CellValue::Text("4".into())),
            ]
        );
        assert_eq!(view.table.value(2, &ColumnId::GrossMarginPct), None);
        assert_eq!(view.available_columns, 12 + 2 + 1);
    }

    #[test]
    fn test_export_is_superset_of_display() {
        let store = two_month_store();
        let view = build_detail_view(
            &store,
            key(2024, 2),
            FilterSelector::All,
            &[ColumnId::Mid],
            &MarginThresholds::default(),
        )
        .unwrap();

        let export_ids = view.export.column_ids();
        for id in view.table.column_ids() {
            assert!(export_ids.contains(&id));
        }
        assert_eq!(&export_ids[..5], &[
            ColumnId::Mid,
            ColumnId::DbaName,
            ColumnId::TotalVolume,
            ColumnId::AgentNet,
            ColumnId::GrossMarginPct,
        ]);
        assert!(export_ids.contains(&ColumnId::MarginDelta {
            from: key(2024, 1),
            to: key(2024, 2)
        }));
        assert_eq!(export_ids.len(), 5 + 2 + 1 + 7);
        assert_eq!(view.export.len(), view.table.len());
    }

    #[test]
    fn test_csv_export() {
        let store = two_month_store();
        let view = build_detail_view(
            &store,
            key(2024, 2),
            FilterSelector::Declining,
            &[ColumnId::Mid],
            &MarginThresholds::default(),
        )
        .unwrap();
        let export = view.csv_export().unwrap();

        assert_eq!(export.filename, "gross_margin_February 2024_comparison.csv");
        let mut lines = export.contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("MID,DBA Name,Total Volume,Agent Net,Gross Margin %"));
        assert!(header.contains("January 2024 Margin %"));
        assert!(header.contains("Change January 2024 → February 2024"));
        assert!(header.ends_with("MCP Volume"));

        let body: Vec<&str> = lines.collect();
        assert_eq!(body.len(), 1);
        assert!(body[0].starts_with("1,Shop 1,100,5,5,10,5,-5,80,20,"));
    }

    #[test]
    fn test_quick_stats() {
        let store = two_month_store();
        let dataset = merge_period(&store, key(2024, 2)).unwrap();
        let rows = filter_rows(&dataset, FilterSelector::All, &MarginThresholds::default());
        let stats = QuickStats::compute(&dataset, &rows);

        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.total_volume, 300.0);
        assert_eq!(stats.mids_with_history, 1);
        assert_eq!(stats.periods_available, 2);
        // (5% + -1%) / 2
        assert_eq!(stats.average_margin, Some(2.0));
    }

    #[test]
    fn test_render_formats_cells() {
        let store = two_month_store();
        let view = build_detail_view(
            &store,
            key(2024, 2),
            FilterSelector::Positive,
            &[ColumnId::Mid, ColumnId::TotalVolume, ColumnId::GrossMarginPct],
            &MarginThresholds::default(),
        )
        .unwrap();

        assert_eq!(
            view.table.render(),
            vec![vec!["1".to_string(), "$100.00".to_string(), "5.00%".to_string()]]
        );
    }
}
