use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarginHistoryError {
    #[error("No month/year token found in file name: {0}")]
    UnrecognizedFilename(String),

    #[error("Invalid number in '{file}', column '{column}', row {row}: '{value}'")]
    InvalidNumber {
        file: String,
        column: String,
        row: usize,
        value: String,
    },

    #[error("Required column '{column}' not found in '{file}'")]
    MissingColumn { file: String, column: String },

    #[error("Sheet '{sheet}' not found in '{file}'")]
    SheetNotFound { file: String, sheet: String },

    #[error("Workbook error in '{file}': {details}")]
    Workbook { file: String, details: String },

    #[error("Invalid upload payload for '{file}': {details}")]
    InvalidPayload { file: String, details: String },

    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    #[error("Select at least one column to display")]
    EmptyColumnSelection,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MarginHistoryError {
    /// True for errors that concern a single uploaded file and leave the
    /// session untouched.
    pub fn is_file_local(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedFilename(_)
                | Self::InvalidNumber { .. }
                | Self::MissingColumn { .. }
                | Self::SheetNotFound { .. }
                | Self::Workbook { .. }
                | Self::InvalidPayload { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MarginHistoryError>;
