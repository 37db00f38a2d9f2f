use crate::columns::{adjacent_pairs, CellValue, ColumnCatalog, ColumnId};
use crate::error::{MarginHistoryError, Result};
use crate::schema::MerchantRecord;
use crate::store::{PeriodKey, PeriodStore};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// A merchant record of the selected period joined with the margins the same
/// MID had in every other uploaded period.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub record: MerchantRecord,
    /// Margin % per period, only where the MID exists and had volume.
    /// Includes the selected period itself.
    pub margins: BTreeMap<PeriodKey, f64>,
    /// `curr - prev` per adjacent pair, only where both margins exist.
    pub deltas: BTreeMap<(PeriodKey, PeriodKey), f64>,
}

impl MergedRow {
    pub fn current_margin(&self) -> Option<f64> {
        self.record.gross_margin_pct
    }

    pub fn margin(&self, period: PeriodKey) -> Option<f64> {
        self.margins.get(&period).copied()
    }

    pub fn delta(&self, from: PeriodKey, to: PeriodKey) -> Option<f64> {
        self.deltas.get(&(from, to)).copied()
    }

    /// Value of a column on this row; `None` is "no data".
    pub fn value(&self, column: &ColumnId) -> Option<CellValue> {
        match column {
            ColumnId::Mid => Some(CellValue::Text(self.record.mid.clone())),
            ColumnId::DbaName => Some(CellValue::Text(self.record.dba_name.clone())),
            ColumnId::TotalVolume => Some(CellValue::Number(self.record.total_volume)),
            ColumnId::AgentNet => Some(CellValue::Number(self.record.agent_net)),
            ColumnId::GrossMarginPct => self.current_margin().map(CellValue::Number),
            ColumnId::Volume { component } => {
                Some(CellValue::Number(self.record.volumes.get(*component)))
            }
            ColumnId::Margin { period } => self.margin(*period).map(CellValue::Number),
            ColumnId::MarginDelta { from, to } => self.delta(*from, *to).map(CellValue::Number),
        }
    }

    /// True when the MID has a margin in any period other than `target`.
    pub fn has_history(&self, target: PeriodKey) -> bool {
        self.margins.keys().any(|k| *k != target)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    pub target: PeriodKey,
    /// Every stored period, chronological.
    pub periods: Vec<PeriodKey>,
    pub rows: Vec<MergedRow>,
}

impl MergedDataset {
    /// The change column ending at the selected period, if there is an
    /// earlier period.
    pub fn target_delta(&self) -> Option<(PeriodKey, PeriodKey)> {
        adjacent_pairs(&self.periods)
            .into_iter()
            .find(|(_, to)| *to == self.target)
    }

    pub fn catalog(&self) -> ColumnCatalog {
        ColumnCatalog::from_periods(&self.periods)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Left-joins every other period's margin onto the target period's records,
/// by MID, and computes the change between each pair of adjacent periods.
///
/// One output row per target record, in the target's record order.
pub fn merge_period(store: &PeriodStore, target: PeriodKey) -> Result<MergedDataset> {
    let target_period = store
        .get(target)
        .ok_or_else(|| MarginHistoryError::UnknownPeriod(target.label()))?;
    let periods = store.keys();
    let pairs = adjacent_pairs(&periods);

    // MIDs are unique within a period, so each lookup yields at most one match.
    let lookups: Vec<(PeriodKey, HashMap<&str, Option<f64>>)> = store
        .all_periods_chronological()
        .into_iter()
        .filter(|p| p.key != target)
        .map(|p| {
            let by_mid = p
                .records
                .iter()
                .map(|r| (r.mid.as_str(), r.gross_margin_pct))
                .collect();
            (p.key, by_mid)
        })
        .collect();

    let rows: Vec<MergedRow> = target_period
        .records
        .iter()
        .map(|record| {
            let mut margins = BTreeMap::new();
            if let Some(margin) = record.gross_margin_pct {
                margins.insert(target, margin);
            }
            for (key, by_mid) in &lookups {
                if let Some(Some(margin)) = by_mid.get(record.mid.as_str()) {
                    margins.insert(*key, *margin);
                }
            }

            let deltas = pairs
                .iter()
                .filter_map(|(prev, curr)| {
                    let before = margins.get(prev)?;
                    let after = margins.get(curr)?;
                    Some(((*prev, *curr), after - before))
                })
                .collect();

            MergedRow {
                record: record.clone(),
                margins,
                deltas,
            }
        })
        .collect();

    debug!(
        "Merged {} rows for {} against {} other periods",
        rows.len(),
        target.label(),
        lookups.len()
    );

    Ok(MergedDataset {
        target,
        periods,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::VolumeBreakdown;
    use crate::store::Period;

    fn key(year: i32, month: u32) -> PeriodKey {
        PeriodKey::new(year, month).unwrap()
    }

    fn record(mid: &str, net: f64, volume: f64) -> MerchantRecord {
        let volumes = VolumeBreakdown {
            card_network: volume,
            ..Default::default()
        };
        MerchantRecord::new(mid, format!("DBA {}", mid), volumes, net)
    }

    fn store_with(periods: Vec<(PeriodKey, Vec<MerchantRecord>)>) -> PeriodStore {
        let mut store = PeriodStore::new();
        for (key, records) in periods {
            store.upsert(Period::new(key, "upload.xls", records));
        }
        store
    }

    #[test]
    fn test_two_month_scenario() {
        let jan = key(2024, 1);
        let feb = key(2024, 2);
        let store = store_with(vec![
            (jan, vec![record("1", 10.0, 100.0)]),
            (feb, vec![record("1", 5.0, 100.0)]),
        ]);

        let merged = merge_period(&store, feb).unwrap();
        assert_eq!(merged.len(), 1);
        let row = &merged.rows[0];
        assert_eq!(row.margin(jan), Some(10.0));
        assert_eq!(row.margin(feb), Some(5.0));
        assert_eq!(row.delta(jan, feb), Some(-5.0));
        assert_eq!(merged.target_delta(), Some((jan, feb)));
    }

    #[test]
    fn test_missing_mid_leaves_margin_absent() {
        let jan = key(2024, 1);
        let feb = key(2024, 2);
        let store = store_with(vec![
            (jan, vec![record("other", 1.0, 10.0)]),
            (feb, vec![record("1", 5.0, 100.0)]),
        ]);

        let merged = merge_period(&store, feb).unwrap();
        let row = &merged.rows[0];
        assert_eq!(row.margin(jan), None);
        assert_eq!(row.delta(jan, feb), None);
        assert!(!row.has_history(feb));
        assert_eq!(row.value(&ColumnId::Margin { period: jan }), None);
    }

    #[test]
    fn test_zero_volume_margin_is_no_data_not_zero() {
        let jan = key(2024, 1);
        let feb = key(2024, 2);
        let store = store_with(vec![
            (jan, vec![record("1", 3.0, 0.0)]),
            (feb, vec![record("1", 5.0, 100.0)]),
        ]);

        let row = &merge_period(&store, feb).unwrap().rows[0];
        assert_eq!(row.margin(jan), None);
        assert_eq!(row.delta(jan, feb), None);
    }

    #[test]
    fn test_deltas_only_between_adjacent_periods() {
        let jan = key(2024, 1);
        let feb = key(2024, 2);
        let mar = key(2024, 3);
        let store = store_with(vec![
            (mar, vec![record("1", 3.0, 100.0)]),
            (jan, vec![record("1", 1.0, 100.0)]),
            (feb, vec![record("2", 2.0, 100.0)]),
        ]);

        let merged = merge_period(&store, jan).unwrap();
        assert_eq!(merged.periods, vec![jan, feb, mar]);
        let row = &merged.rows[0];
        // Feb is missing for MID 1, so neither pair has both sides.
        assert!(row.deltas.is_empty());
        assert_eq!(row.margin(mar), Some(3.0));
        assert_eq!(merged.target_delta(), None);
    }

    #[test]
    fn test_merge_never_duplicates_or_drops_rows() {
        let periods: Vec<PeriodKey> = (1..=6).map(|m| key(2024, m)).collect();
        let store = store_with(
            periods
                .iter()
                .map(|k| (*k, vec![record("a", 1.0, 10.0), record("b", 2.0, 10.0), record("c", 0.0, 0.0)]))
                .collect(),
        );

        let merged = merge_period(&store, periods[3]).unwrap();
        let mids: Vec<&str> = merged.rows.iter().map(|r| r.record.mid.as_str()).collect();
        assert_eq!(mids, vec!["a", "b", "c"]);
        assert_eq!(merged.rows[0].deltas.len(), 5);
        assert!(merged.rows[2].margins.is_empty());
    }

    #[test]
    fn test_unknown_target() {
        let store = PeriodStore::new();
        assert!(matches!(
            merge_period(&store, key(2024, 1)),
            Err(MarginHistoryError::UnknownPeriod(_))
        ));
    }
}
