use serde_json::{Map, Value};

use super::MalformedData;
use super::numeric::json_type;

/// Whether a missing field is an error or simply absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Presence {
    Required,
    Optional,
}

/// Field accessor over one upstream record that attaches record position and
/// field name to every failure.
pub(super) struct Record<'a> {
    fields: &'a Map<String, Value>,
    index: Option<usize>,
}

impl<'a> Record<'a> {
    pub(super) fn new(value: &'a Value, index: Option<usize>) -> Result<Self, MalformedData> {
        match value {
            Value::Object(fields) => Ok(Self { fields, index }),
            other => Err(MalformedData {
                record: index,
                field: String::from("<record>"),
                reason: format!("expected an object, found {}", json_type(other)),
            }),
        }
    }

    /// First value present under any of `names`.
    fn lookup(&self, names: &[&str]) -> Option<&'a Value> {
        names.iter().find_map(|name| self.fields.get(*name))
    }

    /// Reads and parses a field.
    ///
    /// A required field must be present as a key; its value may still be a
    /// sentinel, in which case `parse` decides whether that means absent.
    pub(super) fn field<T>(
        &self,
        names: &[&str],
        presence: Presence,
        parse: impl FnOnce(&Value) -> Result<Option<T>, String>,
    ) -> Result<Option<T>, MalformedData> {
        match self.lookup(names) {
            Some(value) => parse(value).map_err(|reason| self.malformed(names, reason)),
            None if presence == Presence::Required => {
                Err(self.malformed(names, String::from("required field is missing")))
            }
            None => Ok(None),
        }
    }

    /// Reads a field that must parse to a value.
    pub(super) fn required<T>(
        &self,
        names: &[&str],
        parse: impl FnOnce(&Value) -> Result<T, String>,
    ) -> Result<T, MalformedData> {
        self.field(names, Presence::Required, |value| parse(value).map(Some))?
            .ok_or_else(|| self.malformed(names, String::from("required field is missing")))
    }

    /// Reads an optional text field, trimmed; blank text is absent.
    pub(super) fn text(&self, names: &[&str]) -> Result<Option<String>, MalformedData> {
        self.field(names, Presence::Optional, parse_text)
    }

    pub(super) fn malformed(&self, names: &[&str], reason: String) -> MalformedData {
        MalformedData {
            record: self.index,
            field: names.first().copied().unwrap_or_default().to_string(),
            reason,
        }
    }
}

/// Text or numeric identifier fields normalized to a trimmed string.
pub(super) fn parse_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => {
            let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
            Ok((!trimmed.is_empty()).then_some(trimmed))
        }
        Value::Number(number) => Ok(Some(number.to_string())),
        other => Err(format!("expected text, found {}", json_type(other))),
    }
}

/// Booleans, `0`/`1`, and `"true"`/`"false"`.
pub(super) fn parse_flag(value: &Value) -> Result<Option<bool>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(format!("expected 0 or 1, found {number}")),
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            "" => Ok(None),
            _ => Err(format!("expected a flag, found '{text}'")),
        },
        other => Err(format!("expected a flag, found {}", json_type(other))),
    }
}

/// Integer type codes, as numbers or numeric strings.
pub(super) fn parse_code(value: &Value) -> Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("expected an integer code, found {number}")),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("expected an integer code, found '{text}'")),
        other => Err(format!("expected an integer code, found {}", json_type(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_names_record_and_field() {
        let value = json!({ "dEven": 20_240_101 });
        let record = Record::new(&value, Some(3)).expect("object");
        let err = record
            .required(&["pClosing"], |value| Ok(value.clone()))
            .expect_err("missing");
        assert_eq!(err.record, Some(3));
        assert_eq!(err.field, "pClosing");
    }

    #[test]
    fn aliases_are_tried_in_order() {
        let value = json!({ "lva": "FOLD" });
        let record = Record::new(&value, None).expect("object");
        assert_eq!(
            record.text(&["lVal18AFC", "lva"]).expect("text"),
            Some("FOLD".to_string())
        );
    }

    #[test]
    fn non_object_records_are_rejected() {
        let value = json!([1, 2]);
        assert!(Record::new(&value, Some(0)).is_err());
    }

    #[test]
    fn flags_accept_numeric_forms() {
        assert_eq!(parse_flag(&json!(1)), Ok(Some(true)));
        assert_eq!(parse_flag(&json!("false")), Ok(Some(false)));
        assert!(parse_flag(&json!(7)).is_err());
    }
}
