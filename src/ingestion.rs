use crate::config::DashboardConfig;
use crate::error::{MarginHistoryError, Result};
use crate::schema::{MerchantRecord, RawCell, RawTable, VolumeBreakdown, VolumeComponent};
use crate::store::{Period, PeriodKey};
use crate::utils::{extract_period_from_filename, parse_currency};
use crate::workbook::UploadPayload;
use log::{debug, info};
use std::collections::HashSet;

/// Row counts dropped while normalizing one sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub input_rows: usize,
    pub blank_mid: usize,
    pub subtotal_rows: usize,
    pub duplicates: usize,
}

struct ColumnLayout {
    mid: usize,
    dba_name: usize,
    agent_net: usize,
    volumes: Vec<(VolumeComponent, usize)>,
}

impl ColumnLayout {
    fn resolve(table: &RawTable, filename: &str, config: &DashboardConfig) -> Result<Self> {
        let required = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| MarginHistoryError::MissingColumn {
                    file: filename.to_string(),
                    column: name.to_string(),
                })
        };

        let mid = required(&config.columns.mid)?;
        let dba_name = required(&config.columns.dba_name)?;
        let agent_net = required(&config.columns.agent_net)?;

        // Absent volume columns contribute zero.
        let volumes = VolumeComponent::ALL
            .iter()
            .filter_map(|c| table.column_index(c.column_name()).map(|idx| (*c, idx)))
            .collect();

        Ok(Self {
            mid,
            dba_name,
            agent_net,
            volumes,
        })
    }
}

fn coerce_amount(cell: &RawCell, filename: &str, column: &str, row: usize) -> Result<f64> {
    let invalid = |value: String| MarginHistoryError::InvalidNumber {
        file: filename.to_string(),
        column: column.to_string(),
        row,
        value,
    };

    match cell {
        RawCell::Empty => Ok(0.0),
        RawCell::Number(n) if n.is_finite() => Ok(*n),
        RawCell::Number(n) => Err(invalid(n.to_string())),
        RawCell::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(0.0)
            } else {
                parse_currency(trimmed).ok_or_else(|| invalid(trimmed.to_string()))
            }
        }
        RawCell::Bool(b) => Err(invalid(b.to_string())),
    }
}

/// Turns one monthly sheet into the period's merchant records.
///
/// Every monetary cell is coerced first; a single bad cell rejects the whole
/// sheet. Rows without a MID and subtotal rows are dropped afterwards, then
/// duplicate MIDs are collapsed keeping the first occurrence.
pub fn normalize_table(
    table: &RawTable,
    filename: &str,
    config: &DashboardConfig,
) -> Result<(Vec<MerchantRecord>, NormalizeStats)> {
    let layout = ColumnLayout::resolve(table, filename, config)?;
    let mut stats = NormalizeStats {
        input_rows: table.rows.len(),
        ..Default::default()
    };

    let mut parsed = Vec::with_capacity(table.rows.len());
    for row_idx in 0..table.rows.len() {
        // Header is sheet row 1.
        let sheet_row = row_idx + 2;

        let mut volumes = VolumeBreakdown::default();
        for (component, col) in &layout.volumes {
            let value = coerce_amount(
                table.cell(row_idx, *col),
                filename,
                component.column_name(),
                sheet_row,
            )?;
            volumes.set(*component, value);
        }

        let agent_net = coerce_amount(
            table.cell(row_idx, layout.agent_net),
            filename,
            &config.columns.agent_net,
            sheet_row,
        )?;

        let mid_cell = table.cell(row_idx, layout.mid);
        let mid = if mid_cell.is_blank() {
            None
        } else {
            Some(mid_cell.as_text())
        };
        let dba_name = table.cell(row_idx, layout.dba_name).as_text();

        parsed.push((mid, dba_name, volumes, agent_net));
    }

    let marker = config.subtotal_marker.to_lowercase();
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for (mid, dba_name, volumes, agent_net) in parsed {
        let Some(mid) = mid else {
            stats.blank_mid += 1;
            continue;
        };

        if mid.to_lowercase().contains(&marker) {
            stats.subtotal_rows += 1;
            continue;
        }

        if !seen.insert(mid.clone()) {
            stats.duplicates += 1;
            continue;
        }

        records.push(MerchantRecord::new(mid, dba_name, volumes, agent_net));
    }

    debug!(
        "Normalized '{}': {} rows in, {} records out ({} blank MID, {} subtotal, {} duplicate)",
        filename,
        stats.input_rows,
        records.len(),
        stats.blank_mid,
        stats.subtotal_rows,
        stats.duplicates
    );

    Ok((records, stats))
}

/// Builds a period from an already-read sheet. The period comes from the file
/// name; a name without a month/year token yields `UnrecognizedFilename`.
pub fn ingest_table(filename: &str, table: &RawTable, config: &DashboardConfig) -> Result<Period> {
    let date = extract_period_from_filename(filename)
        .ok_or_else(|| MarginHistoryError::UnrecognizedFilename(filename.to_string()))?;
    let key = PeriodKey::from_date(date);

    let (records, _) = normalize_table(table, filename, config)?;

    info!(
        "Parsed {} merchant records for {} from '{}'",
        records.len(),
        key.label(),
        filename
    );

    Ok(Period::new(key, filename, records))
}

/// Reads and normalizes one uploaded workbook. The file name is checked
/// before the bytes are touched.
pub fn ingest_payload(payload: &UploadPayload, config: &DashboardConfig) -> Result<Period> {
    if extract_period_from_filename(&payload.filename).is_none() {
        return Err(MarginHistoryError::UnrecognizedFilename(
            payload.filename.clone(),
        ));
    }

    let table = payload.read_table(config)?;
    ingest_table(&payload.filename, &table, config)
}

/// What happened to a single file of an upload batch.
#[derive(Debug)]
pub enum IngestOutcome {
    Loaded {
        filename: String,
        period: PeriodKey,
        records: usize,
        replaced: bool,
    },
    /// No month/year token in the file name; nothing was read.
    Skipped { filename: String },
    /// The file could not be read or normalized; the store is unchanged.
    Failed {
        filename: String,
        error: MarginHistoryError,
    },
}

impl IngestOutcome {
    pub fn filename(&self) -> &str {
        match self {
            IngestOutcome::Loaded { filename, .. }
            | IngestOutcome::Skipped { filename }
            | IngestOutcome::Failed { filename, .. } => filename,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, IngestOutcome::Loaded { .. })
    }
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl UploadReport {
    pub fn loaded(&self) -> impl Iterator<Item = &IngestOutcome> {
        self.outcomes.iter().filter(|o| o.is_loaded())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|o| match o {
            IngestOutcome::Skipped { filename } => Some(filename.as_str()),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &MarginHistoryError)> {
        self.outcomes.iter().filter_map(|o| match o {
            IngestOutcome::Failed { filename, error } => Some((filename.as_str(), error)),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}
