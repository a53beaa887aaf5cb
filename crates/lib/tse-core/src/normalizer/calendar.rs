//! Session dates: Gregorian/Jalali conversion and exchange clock.

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde_json::Value;

use super::numeric::{fold_digits, json_type};

/// Tehran is a fixed UTC+03:30 zone for exchange purposes.
pub const TEHRAN_OFFSET_SECS: i32 = 12_600;

/// Years below this are read as Jalali (Solar Hijri).
const JALALI_YEAR_CEILING: i32 = 1700;

const GREGORIAN_DAYS_BEFORE_MONTH: [i64; 12] =
    [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

#[must_use]
pub fn tehran_offset() -> FixedOffset {
    FixedOffset::east_opt(TEHRAN_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current calendar date on the exchange clock.
#[must_use]
pub fn tehran_today() -> NaiveDate {
    Utc::now().with_timezone(&tehran_offset()).date_naive()
}

/// Converts a Gregorian date to a Jalali `(year, month, day)` triple.
#[must_use]
pub fn gregorian_to_jalali(date: NaiveDate) -> (i32, u32, u32) {
    let gy = i64::from(date.year());
    let gm = i64::from(date.month());
    let gd = i64::from(date.day());

    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let month_index = usize::try_from(gm - 1).unwrap_or(0);
    let mut days = 355_666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
        + gd
        + GREGORIAN_DAYS_BEFORE_MONTH[month_index];

    let mut jy = -1595 + 33 * (days / 12_053);
    days %= 12_053;
    jy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        jy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let (jm, jd) = if days < 186 {
        (1 + days / 31, 1 + days % 31)
    } else {
        (7 + (days - 186) / 30, 1 + (days - 186) % 30)
    };

    (
        i32::try_from(jy).unwrap_or_default(),
        u32::try_from(jm).unwrap_or_default(),
        u32::try_from(jd).unwrap_or_default(),
    )
}

/// Converts a Jalali date to Gregorian.
///
/// Returns `None` for impossible dates (month 13, day 31 in autumn, Esfand 30
/// in a common year).
#[must_use]
pub fn jalali_to_gregorian(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || year < 1 {
        return None;
    }

    let jy = i64::from(year) + 1595;
    let jm = i64::from(month);
    let jd = i64::from(day);
    let mut days = -355_668 + 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + jd
        + if jm < 7 { (jm - 1) * 31 } else { (jm - 7) * 30 + 186 };

    let mut gy = 400 * (days / 146_097);
    days %= 146_097;
    if days > 36_524 {
        days -= 1;
        gy += 100 * (days / 36_524);
        days %= 36_524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let leap = (gy % 4 == 0 && gy % 100 != 0) || gy % 400 == 0;
    let month_lengths = [31, if leap { 29 } else { 28 }, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut gd = days + 1;
    let mut gm = 1;
    for length in month_lengths {
        if gd <= length {
            break;
        }
        gd -= length;
        gm += 1;
    }

    let date = NaiveDate::from_ymd_opt(
        i32::try_from(gy).ok()?,
        u32::try_from(gm).ok()?,
        u32::try_from(gd).ok()?,
    )?;
    (gregorian_to_jalali(date) == (year, month, day)).then_some(date)
}

/// Formats the Jalali label of a Gregorian date as `YYYY/MM/DD`.
#[must_use]
pub fn format_jalali(date: NaiveDate) -> String {
    let (year, month, day) = gregorian_to_jalali(date);
    format!("{year:04}/{month:02}/{day:02}")
}

/// Parses a date written as `YYYY-MM-DD`, `YYYY/MM/DD`, or `YYYYMMDD`, in
/// either calendar and with Persian or ASCII digits.
///
/// # Errors
/// Returns a description of the problem when the text is not a real date.
pub fn parse_date_text(text: &str) -> Result<NaiveDate, String> {
    let folded = fold_digits(text.trim());
    let parts: Vec<&str> = folded
        .split(['-', '/', '.'])
        .map(str::trim)
        .collect();

    let (year, month, day) = match parts.as_slice() {
        [year, month, day] => (*year, *month, *day),
        [compact] if compact.len() == 8 && compact.chars().all(|ch| ch.is_ascii_digit()) => {
            (&compact[..4], &compact[4..6], &compact[6..])
        }
        _ => return Err(format!("unrecognised date '{text}'")),
    };

    let year: i32 = year.parse().map_err(|_| format!("bad year in '{text}'"))?;
    let month: u32 = month.parse().map_err(|_| format!("bad month in '{text}'"))?;
    let day: u32 = day.parse().map_err(|_| format!("bad day in '{text}'"))?;

    let date = if year < JALALI_YEAR_CEILING {
        jalali_to_gregorian(year, month, day)
    } else {
        NaiveDate::from_ymd_opt(year, month, day)
    };
    date.ok_or_else(|| format!("'{text}' is not a calendar date"))
}

/// Parses an upstream session date: an integer like `20240101`, or any text
/// form accepted by [`parse_date_text`].
///
/// # Errors
/// Returns a description when the value is absent or not a date.
pub fn parse_session_date(value: &Value) -> Result<NaiveDate, String> {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(compact) => parse_date_text(&compact.to_string()),
            None => Err(format!("unrecognised date {number}")),
        },
        Value::String(text) => parse_date_text(text),
        other => Err(format!("expected a date, found {}", json_type(other))),
    }
}

/// Parses an upstream session time: an integer `hmmss` like `122959`, or
/// `HH:MM[:SS]` text.
pub(crate) fn parse_session_time(value: &Value) -> Result<Option<NaiveTime>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => {
            let compact = number
                .as_u64()
                .ok_or_else(|| format!("unrecognised time {number}"))?;
            compact_time(compact).map(Some)
        }
        Value::String(text) => {
            let folded = fold_digits(text.trim());
            if folded.is_empty() {
                return Ok(None);
            }
            if let Ok(compact) = folded.parse::<u64>() {
                return compact_time(compact).map(Some);
            }
            NaiveTime::parse_from_str(&folded, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(&folded, "%H:%M"))
                .map(Some)
                .map_err(|_| format!("unrecognised time '{text}'"))
        }
        other => Err(format!("expected a time, found {}", json_type(other))),
    }
}

fn compact_time(compact: u64) -> Result<NaiveTime, String> {
    let hour = u32::try_from(compact / 10_000).unwrap_or(u32::MAX);
    let minute = u32::try_from((compact / 100) % 100).unwrap_or(u32::MAX);
    let second = u32::try_from(compact % 100).unwrap_or(u32::MAX);
    NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| format!("unrecognised time {compact}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn converts_known_dates() {
        assert_eq!(gregorian_to_jalali(date(2024, 1, 1)), (1402, 10, 11));
        assert_eq!(gregorian_to_jalali(date(2024, 3, 20)), (1403, 1, 1));
        assert_eq!(gregorian_to_jalali(date(2023, 3, 21)), (1402, 1, 1));
        assert_eq!(jalali_to_gregorian(1403, 12, 30), Some(date(2025, 3, 20)));
        assert_eq!(jalali_to_gregorian(1402, 10, 11), Some(date(2024, 1, 1)));
    }

    #[test]
    fn rejects_impossible_jalali_dates() {
        assert_eq!(jalali_to_gregorian(1402, 12, 30), None);
        assert_eq!(jalali_to_gregorian(1402, 7, 31), None);
        assert_eq!(jalali_to_gregorian(1402, 13, 1), None);
    }

    #[test]
    fn round_trips_every_day_of_a_decade() {
        let mut day = date(2018, 1, 1);
        let end = date(2028, 12, 31);
        while day <= end {
            let (year, month, dom) = gregorian_to_jalali(day);
            assert_eq!(jalali_to_gregorian(year, month, dom), Some(day), "{day}");
            day = day.succ_opt().expect("next day");
        }
    }

    #[test]
    fn parses_every_date_form() {
        let expected = date(2024, 1, 1);
        assert_eq!(parse_date_text("2024-01-01"), Ok(expected));
        assert_eq!(parse_date_text("20240101"), Ok(expected));
        assert_eq!(parse_date_text("1402/10/11"), Ok(expected));
        assert_eq!(parse_date_text("۱۴۰۲/۱۰/۱۱"), Ok(expected));
        assert_eq!(parse_session_date(&json!(20_240_101)), Ok(expected));
        assert_eq!(parse_session_date(&json!("14021011")), Ok(expected));
        assert!(parse_date_text("2024-02-30").is_err());
        assert!(parse_session_date(&json!(null)).is_err());
    }

    #[test]
    fn parses_compact_times() {
        assert_eq!(
            parse_session_time(&json!(122_959)),
            Ok(NaiveTime::from_hms_opt(12, 29, 59))
        );
        assert_eq!(
            parse_session_time(&json!(91_500)),
            Ok(NaiveTime::from_hms_opt(9, 15, 0))
        );
        assert_eq!(parse_session_time(&json!(null)), Ok(None));
        assert!(parse_session_time(&json!(256_000)).is_err());
    }

    #[test]
    fn formats_jalali_labels() {
        assert_eq!(format_jalali(date(2024, 1, 1)), "1402/10/11");
    }
}
