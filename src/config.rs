use crate::error::{MarginHistoryError, Result};
use crate::schema::SourceColumns;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for reading monthly exports and classifying margins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DashboardConfig {
    #[schemars(
        description = "Worksheet holding the per-MID table. When null the first sheet of the workbook is used."
    )]
    pub sheet_name: Option<String>,

    #[schemars(
        description = "Number of trailing rows to discard before normalizing. The processor export ends with one footer row."
    )]
    pub footer_rows: usize,

    #[schemars(description = "Header names of the identity and profit columns")]
    pub columns: SourceColumns,

    #[schemars(
        description = "Rows whose MID contains this text (case-insensitive) are subtotal rows and are dropped"
    )]
    pub subtotal_marker: String,

    #[schemars(description = "Margin % strictly above this value counts as high")]
    pub high_margin_threshold: f64,

    #[schemars(description = "Margin % strictly below this value counts as low")]
    pub low_margin_threshold: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            sheet_name: Some("PPI".to_string()),
            footer_rows: 1,
            columns: SourceColumns::default(),
            subtotal_marker: "total".to_string(),
            high_margin_threshold: 5.0,
            low_margin_threshold: 1.0,
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(sheet) = &self.sheet_name {
            if sheet.trim().is_empty() {
                return Err(MarginHistoryError::InvalidConfig(
                    "sheet_name must not be blank; use null to read the first sheet".to_string(),
                ));
            }
        }

        for (field, value) in [
            ("columns.mid", &self.columns.mid),
            ("columns.dba_name", &self.columns.dba_name),
            ("columns.agent_net", &self.columns.agent_net),
            ("subtotal_marker", &self.subtotal_marker),
        ] {
            if value.trim().is_empty() {
                return Err(MarginHistoryError::InvalidConfig(format!(
                    "{} must not be blank",
                    field
                )));
            }
        }

        if !self.high_margin_threshold.is_finite() || !self.low_margin_threshold.is_finite() {
            return Err(MarginHistoryError::InvalidConfig(
                "margin thresholds must be finite numbers".to_string(),
            ));
        }

        if self.low_margin_threshold > self.high_margin_threshold {
            return Err(MarginHistoryError::InvalidConfig(format!(
                "low_margin_threshold ({}) is above high_margin_threshold ({})",
                self.low_margin_threshold, self.high_margin_threshold
            )));
        }

        Ok(())
    }
}
