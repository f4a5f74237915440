//! JSON helpers for binding posted form values
//!
//! Browsers post every field as a string. This module provides custom
//! deserializers that accept both typed JSON values and their string
//! representations, plus the coercion used by the generic attribute binder.

use serde::de::DeserializeOwned;
use serde::Deserializer;
use serde_json::Value as JsonValue;

/// Custom deserializer for i64 that accepts both numbers and numeric strings
///
/// # Examples
///
/// ```rust
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Line {
///     #[serde(deserialize_with = "tabular::json_helpers::deserialize_form_i64")]
///     quantity: i64,
/// }
///
/// let line: Line = serde_json::from_str(r#"{"quantity": "3"}"#).unwrap();
/// assert_eq!(line.quantity, 3);
/// ```
pub fn deserialize_form_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct I64Visitor;

    impl<'de> Visitor<'de> for I64Visitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or a string containing an integer")
        }

        fn visit_i64<E>(self, value: i64) -> Result<i64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<i64, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Unsigned(value), &self))
        }

        fn visit_str<E>(self, value: &str) -> Result<i64, E>
        where
            E: de::Error,
        {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_any(I64Visitor)
}

/// Custom deserializer for f64 that accepts both numbers and numeric strings
pub fn deserialize_form_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct F64Visitor;

    impl<'de> Visitor<'de> for F64Visitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number or a string containing a number")
        }

        fn visit_f64<E>(self, value: f64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_u64<E>(self, value: u64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_str<E>(self, value: &str) -> Result<f64, E>
        where
            E: de::Error,
        {
            match value.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => Ok(parsed),
                _ => Err(de::Error::invalid_value(de::Unexpected::Str(value), &self)),
            }
        }
    }

    deserializer.deserialize_any(F64Visitor)
}

/// Custom deserializer for bool that accepts checkbox-style strings
///
/// `"1"`, `"true"`, `"on"` and `"yes"` are true; `"0"`, `"false"`, `"off"`,
/// `"no"` and the empty string are false.
pub fn deserialize_form_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct BoolVisitor;

    impl<'de> Visitor<'de> for BoolVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a boolean or a checkbox value")
        }

        fn visit_bool<E>(self, value: bool) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value != 0)
        }

        fn visit_u64<E>(self, value: u64) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value != 0)
        }

        fn visit_str<E>(self, value: &str) -> Result<bool, E>
        where
            E: de::Error,
        {
            parse_checkbox(value)
                .ok_or_else(|| de::Error::invalid_value(de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_any(BoolVisitor)
}

/// Custom deserializer for `Option<i64>` where an empty string means `None`
pub fn deserialize_option_form_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct OptionI64Visitor;

    impl<'de> Visitor<'de> for OptionI64Visitor {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an optional integer or a string containing an integer")
        }

        fn visit_none<E>(self) -> Result<Option<i64>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Option<i64>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Option<i64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Option<i64>, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Option<i64>, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map(Some)
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Unsigned(value), &self))
        }

        fn visit_str<E>(self, value: &str) -> Result<Option<i64>, E>
        where
            E: de::Error,
        {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_option(OptionI64Visitor)
}

fn parse_checkbox(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Coerce a posted value into the JSON kind of the attribute it is bound onto
///
/// Only string values are rewritten: a numeric string posted onto a number
/// attribute becomes a number, a checkbox string posted onto a bool attribute
/// becomes a bool, and an empty string posted onto a null or number attribute
/// becomes null. Anything that cannot be coerced is returned unchanged so the
/// model's deserializer reports it.
pub fn coerce_form_value(current: &JsonValue, posted: &JsonValue) -> JsonValue {
    let JsonValue::String(raw) = posted else {
        return posted.clone();
    };
    let trimmed = raw.trim();

    match current {
        JsonValue::Number(_) => {
            if trimmed.is_empty() {
                return JsonValue::Null;
            }
            if let Ok(int) = trimmed.parse::<i64>() {
                return JsonValue::from(int);
            }
            if let Ok(uint) = trimmed.parse::<u64>() {
                return JsonValue::from(uint);
            }
            match trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Some(number) => JsonValue::Number(number),
                None => posted.clone(),
            }
        }
        JsonValue::Bool(_) => match parse_checkbox(trimmed) {
            Some(flag) => JsonValue::Bool(flag),
            None => posted.clone(),
        },
        JsonValue::Null if trimmed.is_empty() => JsonValue::Null,
        _ => posted.clone(),
    }
}

/// Values to try, in order, for a posted value bound onto a null attribute
///
/// A null attribute carries no kind to coerce towards, so a posted string is
/// offered as-is first, then as an integer, a float and a checkbox bool. The
/// caller keeps the first candidate the model accepts. Non-string values are
/// offered unchanged and an empty string is offered as null first.
pub fn form_value_candidates(posted: &JsonValue) -> Vec<JsonValue> {
    let JsonValue::String(raw) = posted else {
        return vec![posted.clone()];
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return vec![JsonValue::Null, posted.clone()];
    }

    let mut candidates = vec![posted.clone()];
    if let Ok(int) = trimmed.parse::<i64>() {
        candidates.push(JsonValue::from(int));
    } else if let Ok(uint) = trimmed.parse::<u64>() {
        candidates.push(JsonValue::from(uint));
    }
    if let Some(number) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        candidates.push(JsonValue::Number(number));
    }
    if let Some(flag) = parse_checkbox(trimmed) {
        candidates.push(JsonValue::Bool(flag));
    }
    candidates
}

/// Parse a posted primary key value into a typed key
///
/// Accepts the key's natural JSON form as well as a string that contains it
/// (`"5"` for an integer key). Null and empty strings yield `None`.
pub fn parse_key<K: DeserializeOwned>(value: &JsonValue) -> Option<K> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(raw) if raw.trim().is_empty() => None,
        JsonValue::String(raw) => serde_json::from_value::<K>(value.clone())
            .ok()
            .or_else(|| serde_json::from_str::<K>(raw.trim()).ok()),
        other => serde_json::from_value::<K>(other.clone()).ok(),
    }
}
