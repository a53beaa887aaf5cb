//! Turns raw upstream payloads into canonical typed records.
//!
//! Normalization is pure: no I/O, no clock reads. Locale digits and
//! separators are folded, sentinel values become `None`, and session dates
//! are converted to Gregorian with their Jalali label kept for display.
//! Any record that cannot be interpreted fails the whole payload with a
//! [`MalformedData`] naming the record and field.

mod calendar;
mod fields;
mod numeric;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveTime;
use serde_json::Value;
use tracing::debug;
use tse_store::models::{HistoryPoint, HistorySeries, Instrument, InstrumentClass, Snapshot};
use tse_store::schema::{
    FIELD_ACTIVE,
    FIELD_CLOSE,
    FIELD_DATE,
    FIELD_HIGH,
    FIELD_INS_CODE,
    FIELD_ISIN,
    FIELD_LAST,
    FIELD_LATIN_NAME,
    FIELD_LOW,
    FIELD_MARKET,
    FIELD_NAME,
    FIELD_OPEN,
    FIELD_PREVIOUS_CLOSE,
    FIELD_SYMBOL,
    FIELD_TIME,
    FIELD_TRADE_COUNT,
    FIELD_TYPE_CODE,
    FIELD_VALUE,
    FIELD_VOLUME,
};

pub use calendar::{
    TEHRAN_OFFSET_SECS,
    format_jalali,
    gregorian_to_jalali,
    jalali_to_gregorian,
    parse_date_text,
    parse_session_date,
    tehran_offset,
    tehran_today,
};
pub use numeric::{fold_digit, fold_digits};

use crate::fetcher::{PayloadKind, RawPayload};
use fields::{Presence, Record, parse_code, parse_flag, parse_text};
use numeric::{parse_amount, parse_count, parse_price};

/// A payload the normalizer could not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedData {
    /// Position of the offending record in a list payload.
    pub record: Option<usize>,
    pub field: String,
    pub reason: String,
}

impl fmt::Display for MalformedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record {
            Some(index) => write!(f, "record {index}, field '{}': {}", self.field, self.reason),
            None => write!(f, "field '{}': {}", self.field, self.reason),
        }
    }
}

impl std::error::Error for MalformedData {}

/// Normalizes a closing-price snapshot payload.
///
/// # Errors
/// Returns `MalformedData` when the root record is missing or a required
/// field (session date, closing, last, previous close) is absent or
/// unparseable.
pub fn normalize_snapshot(raw: &RawPayload) -> Result<Snapshot, MalformedData> {
    let root = root_value(raw)?;
    let record = Record::new(root, None)?;

    let identifier = identifier_for(raw, &record)?;
    let session_date = record.required(&[FIELD_DATE], parse_session_date)?;
    let time = record
        .field(&[FIELD_TIME], Presence::Optional, calendar::parse_session_time)?
        .unwrap_or(NaiveTime::MIN);

    let close = record.field(&[FIELD_CLOSE], Presence::Required, parse_price)?;
    let last = record.field(&[FIELD_LAST], Presence::Required, parse_price)?;
    let previous_close = record.field(&[FIELD_PREVIOUS_CLOSE], Presence::Required, parse_price)?;
    let open = record.field(FIELD_OPEN, Presence::Optional, parse_price)?;
    let high = record.field(&[FIELD_HIGH], Presence::Optional, parse_price)?;
    let low = record.field(&[FIELD_LOW], Presence::Optional, parse_price)?;
    let volume = record.field(&[FIELD_VOLUME], Presence::Optional, parse_count)?;
    let value = record.field(&[FIELD_VALUE], Presence::Optional, parse_amount)?;
    let trade_count = record.field(&[FIELD_TRADE_COUNT], Presence::Optional, parse_count)?;

    let timestamp = session_date
        .and_time(time)
        .and_local_timezone(tehran_offset())
        .single()
        .ok_or_else(|| record.malformed(&[FIELD_TIME], String::from("ambiguous local time")))?;

    Ok(Snapshot {
        identifier,
        timestamp,
        session_date,
        session_jalali: format_jalali(session_date),
        open,
        high,
        low,
        close,
        last,
        volume,
        value,
        previous_close,
        percent_change: percent_change(close.or(last), previous_close),
        trade_count,
    })
}

/// Normalizes a daily history payload into an ascending, de-duplicated
/// series.
///
/// Sessions with zero trades, or with no closing price and no reported
/// trades, are dropped as non-trading days. When a date repeats, the record
/// appearing last in the payload wins.
///
/// # Errors
/// Returns `MalformedData` when the root list is missing or any record lacks
/// a parseable session date or closing price.
pub fn normalize_history(raw: &RawPayload) -> Result<HistorySeries, MalformedData> {
    let Value::Array(records) = root_value(raw)? else {
        return Err(root_error(raw, "expected a list of daily records"));
    };

    let mut sessions: BTreeMap<_, HistoryPoint> = BTreeMap::new();
    let mut skipped = 0_usize;
    for (index, item) in records.iter().enumerate() {
        let record = Record::new(item, Some(index))?;
        let date = record.required(&[FIELD_DATE], parse_session_date)?;
        let close = record.field(&[FIELD_CLOSE], Presence::Required, parse_price)?;
        let trade_count = record.field(&[FIELD_TRADE_COUNT], Presence::Optional, parse_count)?;

        let close = match (close, trade_count) {
            (_, Some(0)) | (None, None) => {
                skipped += 1;
                continue;
            }
            (Some(close), _) => close,
            (None, Some(_)) => {
                return Err(record.malformed(
                    &[FIELD_CLOSE],
                    String::from("traded session has no closing price"),
                ));
            }
        };

        let point = HistoryPoint {
            identifier: raw.key.clone(),
            date,
            jalali_date: format_jalali(date),
            open: record.field(FIELD_OPEN, Presence::Optional, parse_price)?,
            high: record.field(&[FIELD_HIGH], Presence::Optional, parse_price)?,
            low: record.field(&[FIELD_LOW], Presence::Optional, parse_price)?,
            close,
            volume: record.field(&[FIELD_VOLUME], Presence::Optional, parse_count)?,
            value: record.field(&[FIELD_VALUE], Presence::Optional, parse_amount)?,
            trade_count,
        };
        sessions.insert(date, point);
    }

    if skipped > 0 {
        debug!(identifier = %raw.key, skipped, "dropped non-trading sessions");
    }
    Ok(HistorySeries::new(raw.key.clone(), sessions.into_values().collect()))
}

/// Normalizes a listing or search payload into instrument records.
///
/// An empty or null search result yields an empty list.
///
/// # Errors
/// Returns `MalformedData` when the payload root is not a list or a record
/// lacks an identifier, symbol, or name.
pub fn normalize_listing(raw: &RawPayload) -> Result<Vec<Instrument>, MalformedData> {
    let records = match raw.body.get(raw.kind.root_key()) {
        None | Some(Value::Null) if raw.kind == PayloadKind::Search => return Ok(Vec::new()),
        Some(Value::Array(records)) => records,
        _ => return Err(root_error(raw, "expected a list of instruments")),
    };

    records
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let record = Record::new(item, Some(index))?;
            instrument_from(&record)
        })
        .collect()
}

fn instrument_from(record: &Record<'_>) -> Result<Instrument, MalformedData> {
    let identifier = record.required(&[FIELD_INS_CODE], required_text)?;
    let symbol = record.required(FIELD_SYMBOL, required_text)?;
    let name = record.required(FIELD_NAME, required_text)?;

    let mut instrument = Instrument::new(identifier, symbol, name);
    for alias in [record.text(&[FIELD_LATIN_NAME])?, record.text(&[FIELD_ISIN])?]
        .into_iter()
        .flatten()
    {
        if alias != instrument.symbol && alias != instrument.name && !instrument.aliases.contains(&alias)
        {
            instrument.aliases.push(alias);
        }
    }
    if let Some(market) = record.text(&[FIELD_MARKET])? {
        instrument = instrument.with_market(market);
    }
    instrument.class = record
        .field(&[FIELD_TYPE_CODE], Presence::Optional, parse_code)?
        .map_or(InstrumentClass::Other, InstrumentClass::from_type_code);
    if record.field(FIELD_ACTIVE, Presence::Optional, parse_flag)? == Some(false) {
        instrument = instrument.inactive();
    }
    Ok(instrument)
}

fn required_text(value: &Value) -> Result<String, String> {
    parse_text(value)?.ok_or_else(|| String::from("must not be blank"))
}

fn identifier_for(raw: &RawPayload, record: &Record<'_>) -> Result<String, MalformedData> {
    if raw.key.is_empty() {
        record.required(&[FIELD_INS_CODE], required_text)
    } else {
        Ok(raw.key.clone())
    }
}

fn root_value(raw: &RawPayload) -> Result<&Value, MalformedData> {
    match raw.body.get(raw.kind.root_key()) {
        None | Some(Value::Null) => Err(root_error(raw, "payload root is missing")),
        Some(value) => Ok(value),
    }
}

fn root_error(raw: &RawPayload, reason: &str) -> MalformedData {
    MalformedData {
        record: None,
        field: raw.kind.root_key().to_string(),
        reason: reason.to_string(),
    }
}

fn percent_change(price: Option<f64>, previous_close: Option<f64>) -> Option<f64> {
    let (price, previous) = (price?, previous_close?);
    if previous <= 0.0 {
        return None;
    }
    Some(((price - previous) / previous * 100.0 * 100.0).round() / 100.0)
}
