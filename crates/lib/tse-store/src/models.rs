use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::schema::{
    FIELD_CLOSE,
    FIELD_DATE,
    FIELD_HIGH,
    FIELD_INS_CODE,
    FIELD_LAST,
    FIELD_LOW,
    FIELD_OPEN,
    FIELD_PREVIOUS_CLOSE,
    FIELD_TIME,
    FIELD_TRADE_COUNT,
    FIELD_VALUE,
    FIELD_VOLUME,
    ROOT_HISTORY,
    ROOT_SNAPSHOT,
};

/// Broad instrument class derived from the upstream type code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    Equity,
    Fund,
    Right,
    Bond,
    Option,
    Other,
}

impl InstrumentClass {
    /// Maps a TSETMC `yVal` instrument type code to a class.
    #[must_use]
    pub const fn from_type_code(code: i64) -> Self {
        match code {
            300 | 303 | 309 | 313 => Self::Equity,
            305 | 380 | 381 | 382 => Self::Fund,
            400 | 403 | 404 => Self::Right,
            301 | 306 | 706 | 208 | 701 => Self::Bond,
            311 | 312 | 320 | 321 | 600 | 601 | 602 => Self::Option,
            _ => Self::Other,
        }
    }
}

/// Instrument record owned by the symbol catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instrument {
    pub identifier: String,
    pub symbol: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub class: InstrumentClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    pub active: bool,
}

impl Instrument {
    pub fn new(
        identifier: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            symbol: symbol.into(),
            name: name.into(),
            aliases: Vec::new(),
            class: InstrumentClass::Equity,
            market: None,
            active: true,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub const fn with_class(mut self, class: InstrumentClass) -> Self {
        self.class = class;
        self
    }

    #[must_use]
    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }

    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Which instrument field produced a search match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    Symbol,
    Name,
    Alias,
}

/// Ranking tier of a search match, best first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ExactSymbol,
    ExactName,
    Prefix,
    Substring,
    Fuzzy,
}

/// A ranked search result. Produced per call, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub instrument: Instrument,
    pub score: f64,
    pub matched_field: MatchedField,
    pub tier: MatchTier,
}

/// Latest trading snapshot for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub identifier: String,
    pub timestamp: DateTime<FixedOffset>,
    pub session_date: NaiveDate,
    pub session_jalali: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub last: Option<f64>,
    pub volume: Option<u64>,
    pub value: Option<f64>,
    pub previous_close: Option<f64>,
    pub percent_change: Option<f64>,
    pub trade_count: Option<u64>,
}

impl Snapshot {
    /// Re-encodes the snapshot in the upstream payload shape.
    #[must_use]
    pub fn to_raw(&self) -> Value {
        let mut record = Map::new();
        record.insert(FIELD_INS_CODE.to_string(), json!(self.identifier));
        record.insert(FIELD_DATE.to_string(), json!(date_to_even(self.session_date)));
        let time = self.timestamp.time();
        let h_even = time.hour() * 10_000 + time.minute() * 100 + time.second();
        record.insert(FIELD_TIME.to_string(), json!(h_even));
        record.insert(FIELD_OPEN[0].to_string(), json!(self.open));
        record.insert(FIELD_HIGH.to_string(), json!(self.high));
        record.insert(FIELD_LOW.to_string(), json!(self.low));
        record.insert(FIELD_CLOSE.to_string(), json!(self.close));
        record.insert(FIELD_LAST.to_string(), json!(self.last));
        record.insert(FIELD_PREVIOUS_CLOSE.to_string(), json!(self.previous_close));
        record.insert(FIELD_VOLUME.to_string(), json!(self.volume));
        record.insert(FIELD_VALUE.to_string(), json!(self.value));
        record.insert(FIELD_TRADE_COUNT.to_string(), json!(self.trade_count));

        let mut root = Map::new();
        root.insert(ROOT_SNAPSHOT.to_string(), Value::Object(record));
        Value::Object(root)
    }
}

/// One trading session of daily history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub identifier: String,
    pub date: NaiveDate,
    pub jalali_date: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_count: Option<u64>,
}

impl HistoryPoint {
    /// Re-encodes the point as one upstream daily record.
    #[must_use]
    pub fn to_raw(&self) -> Value {
        let mut record = Map::new();
        record.insert(FIELD_INS_CODE.to_string(), json!(self.identifier));
        record.insert(FIELD_DATE.to_string(), json!(date_to_even(self.date)));
        record.insert(FIELD_OPEN[0].to_string(), json!(self.open));
        record.insert(FIELD_HIGH.to_string(), json!(self.high));
        record.insert(FIELD_LOW.to_string(), json!(self.low));
        record.insert(FIELD_CLOSE.to_string(), json!(self.close));
        record.insert(FIELD_VOLUME.to_string(), json!(self.volume));
        record.insert(FIELD_VALUE.to_string(), json!(self.value));
        record.insert(FIELD_TRADE_COUNT.to_string(), json!(self.trade_count));
        Value::Object(record)
    }
}

/// Daily sessions ordered ascending by date, one point per session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistorySeries {
    pub identifier: String,
    pub points: Vec<HistoryPoint>,
}

impl HistorySeries {
    #[must_use]
    pub const fn new(identifier: String, points: Vec<HistoryPoint>) -> Self {
        Self { identifier, points }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keeps only the sessions inside `range`.
    #[must_use]
    pub fn within(self, range: DateRange) -> Self {
        let points = self
            .points
            .into_iter()
            .filter(|point| range.contains(point.date))
            .collect();
        Self {
            identifier: self.identifier,
            points,
        }
    }

    /// Re-encodes the series in the upstream payload shape.
    #[must_use]
    pub fn to_raw(&self) -> Value {
        let records: Vec<Value> = self.points.iter().map(HistoryPoint::to_raw).collect();
        let mut root = Map::new();
        root.insert(ROOT_HISTORY.to_string(), Value::Array(records));
        Value::Object(root)
    }
}

/// Inclusive range of Gregorian session dates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    /// Number of calendar days covered, counting both ends.
    #[must_use]
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn date_to_even(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}
