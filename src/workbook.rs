use crate::config::DashboardConfig;
use crate::error::{MarginHistoryError, Result};
use crate::schema::{RawCell, RawTable};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use log::debug;
use std::io::Cursor;

/// One uploaded file as handed over by the upload widget.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPayload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadPayload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Decodes browser upload contents of the form
    /// `data:<mime>;base64,<payload>`. A bare base64 string is accepted too.
    pub fn from_data_url(filename: impl Into<String>, contents: &str) -> Result<Self> {
        let filename = filename.into();

        let encoded = match contents.split_once(',') {
            Some((header, body)) => {
                if !header.ends_with(";base64") {
                    return Err(MarginHistoryError::InvalidPayload {
                        file: filename,
                        details: format!("expected a base64 data URL, got header '{}'", header),
                    });
                }
                body
            }
            None => contents,
        };

        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| MarginHistoryError::InvalidPayload {
                file: filename.clone(),
                details: e.to_string(),
            })?;

        Ok(Self { filename, bytes })
    }

    /// Reads the configured sheet into a flat table and drops the footer rows.
    pub fn read_table(&self, config: &DashboardConfig) -> Result<RawTable> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(self.bytes.as_slice()))
            .map_err(|e| MarginHistoryError::Workbook {
                file: self.filename.clone(),
                details: e.to_string(),
            })?;

        let sheet_names = workbook.sheet_names();
        let sheet = match &config.sheet_name {
            Some(name) => sheet_names
                .iter()
                .find(|s| *s == name)
                .cloned()
                .ok_or_else(|| MarginHistoryError::SheetNotFound {
                    file: self.filename.clone(),
                    sheet: name.clone(),
                })?,
            None => sheet_names
                .first()
                .cloned()
                .ok_or_else(|| MarginHistoryError::Workbook {
                    file: self.filename.clone(),
                    details: "workbook contains no sheets".to_string(),
                })?,
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| MarginHistoryError::Workbook {
                file: self.filename.clone(),
                details: format!("failed to read sheet '{}': {}", sheet, e),
            })?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|header| header.iter().map(|c| convert_cell(c).as_text()).collect())
            .unwrap_or_default();
        let data_rows: Vec<Vec<RawCell>> = rows
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        let mut table = RawTable::new(headers, data_rows);
        table.strip_footer(config.footer_rows);

        debug!(
            "Read {} data rows from sheet '{}' of '{}'",
            table.rows.len(),
            sheet,
            self.filename
        );

        Ok(table)
    }
}

fn convert_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Float(n) => RawCell::Number(*n),
        Data::Int(n) => RawCell::Number(*n as f64),
        Data::Bool(b) => RawCell::Bool(*b),
        // Serial date number, 1900 date system
        Data::DateTime(dt) => RawCell::Number(dt.as_f64()),
        other => RawCell::Text(other.to_string()),
    }
}
