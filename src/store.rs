use crate::error::{MarginHistoryError, Result};
use crate::schema::MerchantRecord;
use crate::utils::{month_label, parse_month_year};
use chrono::{Datelike, NaiveDate};
use log::info;
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A calendar month. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    year: i32,
    month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self::from_date)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// "March 2024"
    pub fn label(&self) -> String {
        month_label(self.first_day())
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = MarginHistoryError;

    /// Accepts either `"2024-03"` or a month label such as `"March 2024"`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Some((year, month)) = trimmed.split_once('-') {
            if let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) {
                if let Some(key) = PeriodKey::new(year, month) {
                    return Ok(key);
                }
            }
        }

        parse_month_year(trimmed)
            .map(PeriodKey::from_date)
            .ok_or_else(|| MarginHistoryError::UnknownPeriod(s.to_string()))
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeriodKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for PeriodKey {
    fn schema_name() -> String {
        "PeriodKey".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// One uploaded month of merchant records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Period {
    pub key: PeriodKey,
    pub label: String,
    pub source_filename: String,
    pub records: Vec<MerchantRecord>,
}

impl Period {
    pub fn new(key: PeriodKey, source_filename: &str, records: Vec<MerchantRecord>) -> Self {
        Self {
            key,
            label: key.label(),
            source_filename: source_filename.to_string(),
            records,
        }
    }
}

/// Session-scoped collection of uploaded periods, keyed by calendar month.
///
/// Two files naming the same month replace each other even when their label
/// text differs ("Mar 2024" and "March 2024").
#[derive(Debug, Clone, Default)]
pub struct PeriodStore {
    periods: BTreeMap<PeriodKey, Period>,
}

impl PeriodStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the period, replacing any earlier upload of the same month.
    /// Returns the replaced period.
    pub fn upsert(&mut self, period: Period) -> Option<Period> {
        let key = period.key;
        let record_count = period.records.len();
        let replaced = self.periods.insert(key, period);

        if replaced.is_some() {
            info!("Replaced {} with {} merchant records", key.label(), record_count);
        } else {
            info!("Loaded {} with {} merchant records", key.label(), record_count);
        }

        replaced
    }

    pub fn clear(&mut self) {
        info!("Cleared {} stored periods", self.periods.len());
        self.periods.clear();
    }

    pub fn all_periods_chronological(&self) -> Vec<&Period> {
        self.periods.values().collect()
    }

    pub fn keys(&self) -> Vec<PeriodKey> {
        self.periods.keys().copied().collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.periods.values().map(|p| p.label.clone()).collect()
    }

    pub fn latest(&self) -> Option<&Period> {
        self.periods.values().next_back()
    }

    pub fn get(&self, key: PeriodKey) -> Option<&Period> {
        self.periods.get(&key)
    }

    /// Looks a period up by its label or `YYYY-MM` key.
    pub fn find(&self, label: &str) -> Result<&Period> {
        let key: PeriodKey = label.parse()?;
        self.get(key)
            .ok_or_else(|| MarginHistoryError::UnknownPeriod(label.to_string()))
    }

    /// The stored period immediately before `key`.
    pub fn previous(&self, key: PeriodKey) -> Option<&Period> {
        self.periods.range(..key).next_back().map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}
