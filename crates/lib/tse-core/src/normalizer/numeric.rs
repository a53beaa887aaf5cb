use serde_json::Value;

const SENTINELS: &[&str] = &["", "-", "--", "\u{2013}", "\u{2014}", "n/a", "na", "null", "none"];

/// Maps Persian (U+06F0..) and Arabic-Indic (U+0660..) digits to ASCII.
#[must_use]
pub const fn fold_digit(ch: char) -> char {
    match ch {
        '\u{06F0}'..='\u{06F9}' => ascii_digit(ch as u32 - 0x06F0),
        '\u{0660}'..='\u{0669}' => ascii_digit(ch as u32 - 0x0660),
        _ => ch,
    }
}

const fn ascii_digit(offset: u32) -> char {
    match char::from_digit(offset, 10) {
        Some(digit) => digit,
        None => '0',
    }
}

/// Folds every locale digit in `text` to ASCII.
#[must_use]
pub fn fold_digits(text: &str) -> String {
    text.chars().map(fold_digit).collect()
}

/// Parses a JSON number or locale-formatted numeric string.
///
/// Returns `Ok(None)` for null and textual sentinels such as `"-"`.
pub(crate) fn parse_number(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_f64()
            .filter(|parsed| parsed.is_finite())
            .map(Some)
            .ok_or_else(|| format!("unrepresentable number {number}")),
        Value::String(text) => parse_numeric_text(text),
        other => Err(format!("expected a number, found {}", json_type(other))),
    }
}

fn parse_numeric_text(text: &str) -> Result<Option<f64>, String> {
    let trimmed = text.trim();
    if SENTINELS.contains(&trimmed.to_lowercase().as_str()) {
        return Ok(None);
    }

    let mut negative = false;
    let mut inner = trimmed;
    if let Some(stripped) = inner.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        negative = true;
        inner = stripped;
    }

    let mut canonical = String::with_capacity(inner.len());
    for ch in inner.chars() {
        match fold_digit(ch) {
            digit @ '0'..='9' => canonical.push(digit),
            '.' | '\u{066B}' => canonical.push('.'),
            '-' | '\u{2212}' => canonical.push('-'),
            '+' | 'e' | 'E' => canonical.push(ch),
            ',' | '\u{066C}' | '\u{060C}' | '\'' | '_' => {}
            '%' | '\u{066A}' => {}
            space if space.is_whitespace() || space == '\u{200C}' => {}
            _ => return Err(format!("not a number: '{text}'")),
        }
    }

    let parsed: f64 = canonical
        .parse()
        .map_err(|_| format!("not a number: '{text}'"))?;
    if !parsed.is_finite() {
        return Err(format!("not a finite number: '{text}'"));
    }
    Ok(Some(if negative { -parsed } else { parsed }))
}

/// Price fields: zero and negative values mean "no trade".
pub(crate) fn parse_price(value: &Value) -> Result<Option<f64>, String> {
    Ok(parse_number(value)?.filter(|price| *price > 0.0))
}

/// Count fields: `-1` and other negatives mean "not reported".
pub(crate) fn parse_count(value: &Value) -> Result<Option<u64>, String> {
    let Some(number) = parse_number(value)? else {
        return Ok(None);
    };
    if number < 0.0 {
        return Ok(None);
    }
    if number.fract() != 0.0 {
        return Err(format!("expected a whole number, found {number}"));
    }
    #[allow(clippy::cast_precision_loss)]
    if number > u64::MAX as f64 {
        return Err(format!("count out of range: {number}"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(Some(number as u64))
}

/// Amount fields: negatives mean "not reported", zero is a real amount.
pub(crate) fn parse_amount(value: &Value) -> Result<Option<f64>, String> {
    Ok(parse_number(value)?.filter(|amount| *amount >= 0.0))
}

pub(crate) const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
