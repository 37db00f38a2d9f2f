use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One of the seven volume columns of the monthly processing export.
///
/// The column names are a contract with the upstream export and must match
/// the sheet headers verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VolumeComponent {
    #[schemars(description = "Visa, Mastercard and Discover card volume")]
    CardNetwork,

    #[schemars(description = "American Express volume")]
    Amex,

    #[schemars(description = "Wex and Voyager fleet card volume")]
    WexVoyager,

    #[schemars(description = "Electronic benefits transfer volume")]
    Ebt,

    #[schemars(description = "PIN debit volume")]
    PinDebit,

    #[schemars(description = "Visa/Mastercard REF volume")]
    VisaMcRef,

    #[schemars(description = "MCP volume")]
    Mcp,
}

impl VolumeComponent {
    pub const ALL: [VolumeComponent; 7] = [
        VolumeComponent::CardNetwork,
        VolumeComponent::Amex,
        VolumeComponent::WexVoyager,
        VolumeComponent::Ebt,
        VolumeComponent::PinDebit,
        VolumeComponent::VisaMcRef,
        VolumeComponent::Mcp,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            VolumeComponent::CardNetwork => "V/MC/Discover Vol",
            VolumeComponent::Amex => "AMEX Vol",
            VolumeComponent::WexVoyager => "Wex Voyager Volume",
            VolumeComponent::Ebt => "EBT Vol",
            VolumeComponent::PinDebit => "PIN DEB Vol",
            VolumeComponent::VisaMcRef => "VISA MC REF vol",
            VolumeComponent::Mcp => "MCP Volume",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VolumeBreakdown {
    pub card_network: f64,
    pub amex: f64,
    pub wex_voyager: f64,
    pub ebt: f64,
    pub pin_debit: f64,
    pub visa_mc_ref: f64,
    pub mcp: f64,
}

impl VolumeBreakdown {
    pub fn get(&self, component: VolumeComponent) -> f64 {
        match component {
            VolumeComponent::CardNetwork => self.card_network,
            VolumeComponent::Amex => self.amex,
            VolumeComponent::WexVoyager => self.wex_voyager,
            VolumeComponent::Ebt => self.ebt,
            VolumeComponent::PinDebit => self.pin_debit,
            VolumeComponent::VisaMcRef => self.visa_mc_ref,
            VolumeComponent::Mcp => self.mcp,
        }
    }

    pub fn set(&mut self, component: VolumeComponent, value: f64) {
        let slot = match component {
            VolumeComponent::CardNetwork => &mut self.card_network,
            VolumeComponent::Amex => &mut self.amex,
            VolumeComponent::WexVoyager => &mut self.wex_voyager,
            VolumeComponent::Ebt => &mut self.ebt,
            VolumeComponent::PinDebit => &mut self.pin_debit,
            VolumeComponent::VisaMcRef => &mut self.visa_mc_ref,
            VolumeComponent::Mcp => &mut self.mcp,
        };
        *slot = value;
    }

    pub fn total(&self) -> f64 {
        VolumeComponent::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// One merchant's figures for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MerchantRecord {
    #[schemars(description = "Merchant identifier, unique within a period")]
    pub mid: String,

    pub dba_name: String,

    pub volumes: VolumeBreakdown,

    #[schemars(description = "Agent net profit for the period. Can be negative.")]
    pub agent_net: f64,

    #[schemars(description = "Sum of the seven volume components")]
    pub total_volume: f64,

    #[schemars(
        description = "agent_net / total_volume * 100. Absent when total_volume is zero or negative."
    )]
    pub gross_margin_pct: Option<f64>,
}

impl MerchantRecord {
    pub fn new(
        mid: impl Into<String>,
        dba_name: impl Into<String>,
        volumes: VolumeBreakdown,
        agent_net: f64,
    ) -> Self {
        let total_volume = volumes.total();
        Self {
            mid: mid.into(),
            dba_name: dba_name.into(),
            volumes,
            agent_net,
            total_volume,
            gross_margin_pct: gross_margin_pct(agent_net, total_volume),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.total_volume > 0.0
    }
}

pub fn gross_margin_pct(agent_net: f64, total_volume: f64) -> Option<f64> {
    if total_volume > 0.0 {
        Some(agent_net / total_volume * 100.0)
    } else {
        None
    }
}

static EMPTY_CELL: RawCell = RawCell::Empty;

/// A single cell as read from an uploaded sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl RawCell {
    pub fn is_blank(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell as identifier text. Integral numbers lose their
    /// fractional part so a numeric MID of `1234.0` reads as `"1234"`.
    pub fn as_text(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.trim().to_string(),
            RawCell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            RawCell::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        }
    }
}

/// A flat sheet: one header row followed by data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawCell>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Drops the last `count` data rows (the export's footer artifact).
    pub fn strip_footer(&mut self, count: usize) {
        let keep = self.rows.len().saturating_sub(count);
        self.rows.truncate(keep);
    }

    pub fn cell(&self, row: usize, column: usize) -> &RawCell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Names of the identity and profit columns in the source sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceColumns {
    pub mid: String,
    pub dba_name: String,
    pub agent_net: String,
}

impl Default for SourceColumns {
    fn default() -> Self {
        Self {
            mid: "MID".to_string(),
            dba_name: "DBA Name".to_string(),
            agent_net: "Agent Net".to_string(),
        }
    }
}
