use crate::schema::VolumeComponent;
use crate::store::{PeriodKey, PeriodStore};
use crate::utils::{format_currency, format_percent, format_points};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifies a detail-table column. Margin and change columns carry the
/// periods they refer to; display names are only produced by `display_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnId {
    Mid,
    DbaName,
    TotalVolume,
    AgentNet,
    /// Margin of the selected period.
    GrossMarginPct,
    Volume {
        component: VolumeComponent,
    },
    Margin {
        period: PeriodKey,
    },
    MarginDelta {
        from: PeriodKey,
        to: PeriodKey,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnGroup {
    Basic,
    VolumeBreakdown,
    MonthlyMargins,
    MonthToMonthChanges,
}

impl ColumnGroup {
    pub const ALL: [ColumnGroup; 4] = [
        ColumnGroup::Basic,
        ColumnGroup::VolumeBreakdown,
        ColumnGroup::MonthlyMargins,
        ColumnGroup::MonthToMonthChanges,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ColumnGroup::Basic => "Basic Information",
            ColumnGroup::VolumeBreakdown => "Volume Breakdown",
            ColumnGroup::MonthlyMargins => "Monthly Margins",
            ColumnGroup::MonthToMonthChanges => "Month-to-Month Changes",
        }
    }
}

/// How a column's numbers are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Text,
    Currency,
    Percent,
    Points,
}

pub const BASIC_COLUMNS: [ColumnId; 5] = [
    ColumnId::Mid,
    ColumnId::DbaName,
    ColumnId::TotalVolume,
    ColumnId::AgentNet,
    ColumnId::GrossMarginPct,
];

pub const IDENTITY_COLUMNS: [ColumnId; 4] = [
    ColumnId::Mid,
    ColumnId::DbaName,
    ColumnId::TotalVolume,
    ColumnId::AgentNet,
];

impl ColumnId {
    pub fn display_name(&self) -> String {
        match self {
            ColumnId::Mid => "MID".to_string(),
            ColumnId::DbaName => "DBA Name".to_string(),
            ColumnId::TotalVolume => "Total Volume".to_string(),
            ColumnId::AgentNet => "Agent Net".to_string(),
            ColumnId::GrossMarginPct => "Gross Margin %".to_string(),
            ColumnId::Volume { component } => component.column_name().to_string(),
            ColumnId::Margin { period } => format!("{} Margin %", period.label()),
            ColumnId::MarginDelta { from, to } => {
                format!("Change {} → {}", from.label(), to.label())
            }
        }
    }

    pub fn group(&self) -> ColumnGroup {
        match self {
            ColumnId::Volume { .. } => ColumnGroup::VolumeBreakdown,
            ColumnId::Margin { .. } => ColumnGroup::MonthlyMargins,
            ColumnId::MarginDelta { .. } => ColumnGroup::MonthToMonthChanges,
            _ => ColumnGroup::Basic,
        }
    }

    pub fn format(&self) -> ValueFormat {
        match self {
            ColumnId::Mid | ColumnId::DbaName => ValueFormat::Text,
            ColumnId::GrossMarginPct | ColumnId::Margin { .. } => ValueFormat::Percent,
            ColumnId::MarginDelta { .. } => ValueFormat::Points,
            _ => ValueFormat::Currency,
        }
    }

    pub fn volume_columns() -> impl Iterator<Item = ColumnId> {
        VolumeComponent::ALL
            .into_iter()
            .map(|component| ColumnId::Volume { component })
    }
}

/// A single value in a projected row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(_) => None,
        }
    }

    pub fn render(&self, format: ValueFormat) -> String {
        match (self, format) {
            (CellValue::Text(s), _) => s.clone(),
            (CellValue::Number(n), ValueFormat::Currency) => format_currency(*n),
            (CellValue::Number(n), ValueFormat::Percent) => format_percent(*n),
            (CellValue::Number(n), ValueFormat::Points) => format_points(*n),
            (CellValue::Number(n), ValueFormat::Text) => n.to_string(),
        }
    }
}

/// Chronologically adjacent pairs, `(prev, curr)`.
pub fn adjacent_pairs(periods: &[PeriodKey]) -> Vec<(PeriodKey, PeriodKey)> {
    periods.windows(2).map(|w| (w[0], w[1])).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogEntry {
    pub id: ColumnId,
    pub name: String,
    pub group: ColumnGroup,
    pub format: ValueFormat,
}

impl From<ColumnId> for CatalogEntry {
    fn from(id: ColumnId) -> Self {
        Self {
            name: id.display_name(),
            group: id.group(),
            format: id.format(),
            id,
        }
    }
}

/// Every column the detail table can show for the uploaded periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnCatalog {
    pub entries: Vec<CatalogEntry>,
    pub latest: Option<PeriodKey>,
}

impl ColumnCatalog {
    /// `periods` must be in chronological order.
    pub fn from_periods(periods: &[PeriodKey]) -> Self {
        let mut ids: Vec<ColumnId> = BASIC_COLUMNS.to_vec();
        ids.extend(ColumnId::volume_columns());
        ids.extend(periods.iter().map(|p| ColumnId::Margin { period: *p }));
        ids.extend(
            adjacent_pairs(periods)
                .into_iter()
                .map(|(from, to)| ColumnId::MarginDelta { from, to }),
        );

        Self {
            entries: ids.into_iter().map(CatalogEntry::from).collect(),
            latest: periods.last().copied(),
        }
    }

    pub fn from_store(store: &PeriodStore) -> Self {
        Self::from_periods(&store.keys())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ColumnId) -> bool {
        self.entries.iter().any(|e| e.id == *id)
    }

    pub fn group(&self, group: ColumnGroup) -> Vec<&CatalogEntry> {
        self.entries.iter().filter(|e| e.group == group).collect()
    }

    pub fn select_all(&self) -> Vec<ColumnId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// The basic columns plus the latest period's margin.
    pub fn default_selection(&self) -> Vec<ColumnId> {
        let mut selection = BASIC_COLUMNS.to_vec();
        if let Some(latest) = self.latest {
            selection.push(ColumnId::Margin { period: latest });
        }
        selection
    }

    /// Keeps the requested columns that exist in the catalog, in catalog order.
    pub fn resolve(&self, requested: &[ColumnId]) -> Vec<ColumnId> {
        self.entries
            .iter()
            .map(|e| e.id)
            .filter(|id| requested.contains(id))
            .collect()
    }
}
