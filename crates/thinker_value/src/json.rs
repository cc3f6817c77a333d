//! Raw JSON representation.
//!
//! Documents travel as JSON with pseudo-types spelled out as tagged objects,
//! the database's "raw" format:
//!
//! ```text
//! {"$reql_type$": "TIME", "epoch_time": 1483228800, "timezone": "+03:00"}
//! {"$reql_type$": "BINARY", "data": "dGVzdA=="}
//! ```
//!
//! Unknown tags decode to [`Value::Opaque`] and are written back unchanged.

use crate::error::{ValueError, ValueResult};
use crate::value::Value;
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Number};
use std::collections::BTreeMap;

/// Field holding the pseudo-type tag.
pub const REQL_TYPE_FIELD: &str = "$reql_type$";

const TIME: &str = "TIME";
const BINARY: &str = "BINARY";

impl Value {
    /// Decodes a value from its raw JSON form.
    pub fn from_json(json: serde_json::Value) -> ValueResult<Value> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(
                n.as_f64()
                    .ok_or_else(|| ValueError::UnrepresentableNumber(n.to_string()))?,
            ),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<ValueResult<_>>()?,
            ),
            serde_json::Value::Object(mut fields) => match fields.remove(REQL_TYPE_FIELD) {
                None => Value::Object(decode_fields(fields)?),
                Some(serde_json::Value::String(tag)) => decode_pseudo_type(tag, fields)?,
                Some(other) => {
                    // A non-string tag is plain data.
                    fields.insert(REQL_TYPE_FIELD.to_string(), other);
                    Value::Object(decode_fields(fields)?)
                }
            },
        })
    }

    /// Encodes this value in raw JSON form.
    pub fn to_json(&self) -> ValueResult<serde_json::Value> {
        Ok(match self {
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<ValueResult<_>>()?,
            ),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Null => serde_json::Value::Null,
            Value::Number(n) => serde_json::Value::Number(number(*n)?),
            Value::Object(fields) => serde_json::Value::Object(encode_fields(fields)?),
            Value::Binary(bytes) => {
                let mut obj = Map::new();
                obj.insert(REQL_TYPE_FIELD.into(), BINARY.into());
                obj.insert(
                    "data".into(),
                    base64::engine::general_purpose::STANDARD
                        .encode(bytes)
                        .into(),
                );
                serde_json::Value::Object(obj)
            }
            Value::Time(t) => {
                let mut obj = Map::new();
                obj.insert(REQL_TYPE_FIELD.into(), TIME.into());
                #[allow(clippy::cast_precision_loss)]
                let epoch = t.timestamp_millis() as f64 / 1000.0;
                obj.insert("epoch_time".into(), serde_json::Value::Number(number(epoch)?));
                obj.insert("timezone".into(), t.format("%:z").to_string().into());
                serde_json::Value::Object(obj)
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Opaque { reql_type, fields } => {
                let mut obj = encode_fields(fields)?;
                obj.insert(REQL_TYPE_FIELD.into(), reql_type.clone().into());
                serde_json::Value::Object(obj)
            }
        })
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = ValueError;

    fn try_from(json: serde_json::Value) -> ValueResult<Self> {
        Value::from_json(json)
    }
}

/// Largest magnitude below which every integral double is exact.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn number(n: f64) -> ValueResult<Number> {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        #[allow(clippy::cast_possible_truncation)]
        return Ok(Number::from(n as i64));
    }
    Number::from_f64(n).ok_or(ValueError::NonFiniteNumber(n))
}

fn decode_fields(fields: Map<String, serde_json::Value>) -> ValueResult<BTreeMap<String, Value>> {
    fields
        .into_iter()
        .map(|(k, v)| Ok((k, Value::from_json(v)?)))
        .collect()
}

fn encode_fields(fields: &BTreeMap<String, Value>) -> ValueResult<Map<String, serde_json::Value>> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
        .collect()
}

fn decode_pseudo_type(tag: String, mut fields: Map<String, serde_json::Value>) -> ValueResult<Value> {
    match tag.as_str() {
        TIME => {
            let epoch = fields
                .get("epoch_time")
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| missing(&tag, "epoch_time"))?;
            let timezone = fields
                .get("timezone")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| missing(&tag, "timezone"))?;
            Ok(Value::Time(decode_time(epoch, timezone)?))
        }
        BINARY => {
            let data = fields
                .remove("data")
                .ok_or_else(|| missing(&tag, "data"))?;
            let data = data
                .as_str()
                .ok_or_else(|| ValueError::invalid_binary("data is not a string"))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| ValueError::invalid_binary(e.to_string()))?;
            Ok(Value::Binary(bytes))
        }
        _ => Ok(Value::Opaque {
            reql_type: tag,
            fields: decode_fields(fields)?,
        }),
    }
}

fn missing(tag: &str, field: &'static str) -> ValueError {
    ValueError::MissingField {
        reql_type: tag.to_string(),
        field,
    }
}

/// Builds a time from epoch seconds and a `+HH:MM` offset.
///
/// Times carry millisecond precision.
pub fn decode_time(epoch_time: f64, timezone: &str) -> ValueResult<DateTime<FixedOffset>> {
    if !epoch_time.is_finite() {
        return Err(ValueError::invalid_time(format!(
            "epoch_time {epoch_time} is not finite"
        )));
    }
    let offset = parse_timezone(timezone)?;
    #[allow(clippy::cast_possible_truncation)]
    let millis = (epoch_time * 1000.0).round() as i64;
    let utc = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ValueError::invalid_time(format!("epoch_time {epoch_time} out of range")))?;
    Ok(utc.with_timezone(&offset))
}

/// Parses `+HH:MM`, `-HH:MM` or `Z`.
pub fn parse_timezone(timezone: &str) -> ValueResult<FixedOffset> {
    let invalid = || ValueError::InvalidTimezone(timezone.to_string());
    if timezone == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match timezone.as_bytes().first() {
        Some(b'+') => (1, &timezone[1..]),
        Some(b'-') => (-1, &timezone[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_time_with_offset() {
        let v = Value::from_json(json!({
            "$reql_type$": "TIME",
            "epoch_time": 1483218000,
            "timezone": "+03:00"
        }))
        .unwrap();
        let t = v.as_time().unwrap();
        assert_eq!(t.to_rfc3339(), "2017-01-01T00:00:00+03:00");
    }

    #[test]
    fn time_keeps_offset_through_json() {
        let t = DateTime::parse_from_rfc3339("2017-01-01T00:00:00-07:00").unwrap();
        let json = Value::Time(t).to_json().unwrap();
        assert_eq!(json["timezone"], "-07:00");
        assert_eq!(json["epoch_time"].as_f64(), Some(1_483_254_000.0));
        assert_eq!(Value::from_json(json).unwrap(), Value::Time(t));
    }

    #[test]
    fn decodes_binary() {
        let v = Value::from_json(json!({"$reql_type$": "BINARY", "data": "dGVzdA=="})).unwrap();
        assert_eq!(v, Value::binary(b"test".to_vec()));
        assert_eq!(v.to_json().unwrap()["data"], "dGVzdA==");
    }

    #[test]
    fn unknown_pseudo_type_is_opaque() {
        let raw = json!({"$reql_type$": "GEOMETRY", "type": "Point", "coordinates": [1, 2]});
        let v = Value::from_json(raw.clone()).unwrap();
        assert!(matches!(&v, Value::Opaque { reql_type, .. } if reql_type == "GEOMETRY"));
        assert_eq!(v.to_json().unwrap(), raw);
    }

    #[test]
    fn plain_documents() {
        let raw = json!({"id": 1, "name": "Alice", "tags": ["a", null, true]});
        let v = Value::from_json(raw.clone()).unwrap();
        assert_eq!(v.get("name"), Some(&Value::from("Alice")));
        assert_eq!(v.to_json().unwrap()["tags"], raw["tags"]);
    }

    #[test]
    fn rejects_malformed_pseudo_types() {
        let err = Value::from_json(json!({"$reql_type$": "TIME", "epoch_time": 0})).unwrap_err();
        assert!(matches!(err, ValueError::MissingField { field: "timezone", .. }));

        let err = Value::from_json(json!({"$reql_type$": "BINARY", "data": "%%"})).unwrap_err();
        assert!(matches!(err, ValueError::InvalidBinary { .. }));
    }

    #[test]
    fn non_finite_numbers_cannot_be_written() {
        let err = Value::Number(f64::INFINITY).to_json().unwrap_err();
        assert!(matches!(err, ValueError::NonFiniteNumber(_)));
    }

    #[test]
    fn timezone_parsing() {
        assert_eq!(parse_timezone("+00:00").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("-07:00").unwrap().local_minus_utc(), -7 * 3600);
        assert_eq!(parse_timezone("+05:30").unwrap().local_minus_utc(), 5 * 3600 + 1800);
        assert_eq!(parse_timezone("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_timezone("0300").is_err());
        assert!(parse_timezone("+3:00").is_err());
        assert!(parse_timezone("+03:75").is_err());
    }
}
