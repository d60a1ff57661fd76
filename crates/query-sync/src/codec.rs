//! Text codec for form values.
//!
//! Plain JSON cannot carry temporal values, so values owned by a
//! [`TypeAdapter`] are written as `{"$type": tag, "$value": repr}` and
//! rebuilt on the way back. Tags without a registered adapter are left as
//! plain maps.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::error::CodecError;

pub const TYPE_KEY: &str = "$type";
pub const VALUE_KEY: &str = "$value";

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Flat-or-nested form field values.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Timestamp(OffsetDateTime),
    Date(Date),
    List(Vec<FieldValue>),
    Map(FieldMap),
}

pub type FieldMap = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Number(_) => "number",
            FieldValue::Text(_) => "text",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Date(_) => "date",
            FieldValue::List(_) => "list",
            FieldValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Date> for FieldValue {
    fn from(value: Date) -> Self {
        FieldValue::Date(value)
    }
}

impl<V: Into<FieldValue>> From<Vec<V>> for FieldValue {
    fn from(values: Vec<V>) -> Self {
        FieldValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Untyped conversion; tagged objects stay maps.
impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FieldValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Converts one typed value to and from its canonical text.
pub trait TypeAdapter: Send + Sync {
    fn tag(&self) -> &str;

    /// `None` when the value is not one this adapter owns.
    fn encode(&self, value: &FieldValue) -> Option<Result<String, CodecError>>;

    fn decode(&self, repr: &str) -> Result<FieldValue, CodecError>;
}

/// Instants as RFC 3339 text, offset preserved.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampAdapter;

impl TypeAdapter for TimestampAdapter {
    fn tag(&self) -> &str {
        "timestamp"
    }

    fn encode(&self, value: &FieldValue) -> Option<Result<String, CodecError>> {
        let FieldValue::Timestamp(at) = value else {
            return None;
        };
        Some(at.format(&Rfc3339).map_err(|err| CodecError::Encode {
            tag: self.tag().to_string(),
            reason: err.to_string(),
        }))
    }

    fn decode(&self, repr: &str) -> Result<FieldValue, CodecError> {
        OffsetDateTime::parse(repr, &Rfc3339)
            .map(FieldValue::Timestamp)
            .map_err(|_| CodecError::Decode {
                tag: self.tag().to_string(),
                repr: repr.to_string(),
            })
    }
}

/// Calendar dates as `YYYY-MM-DD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateAdapter;

impl TypeAdapter for DateAdapter {
    fn tag(&self) -> &str {
        "date"
    }

    fn encode(&self, value: &FieldValue) -> Option<Result<String, CodecError>> {
        let FieldValue::Date(date) = value else {
            return None;
        };
        Some(date.format(DATE_FORMAT).map_err(|err| CodecError::Encode {
            tag: self.tag().to_string(),
            reason: err.to_string(),
        }))
    }

    fn decode(&self, repr: &str) -> Result<FieldValue, CodecError> {
        Date::parse(repr, DATE_FORMAT)
            .map(FieldValue::Date)
            .map_err(|_| CodecError::Decode {
                tag: self.tag().to_string(),
                repr: repr.to_string(),
            })
    }
}

/// Serialize/deserialize pair used for form persistence.
pub trait ValueCodec: Send + Sync {
    fn parse(&self, text: &str) -> Result<FieldMap, CodecError>;
    fn stringify(&self, values: &FieldMap) -> Result<String, CodecError>;
}

/// JSON codec with a registry of typed adapters.
#[derive(Clone)]
pub struct TaggedCodec {
    adapters: Vec<Arc<dyn TypeAdapter>>,
}

impl TaggedCodec {
    /// Timestamp and date adapters pre-registered.
    pub fn new() -> Self {
        Self::empty()
            .with_adapter(Arc::new(DateAdapter))
            .with_adapter(Arc::new(TimestampAdapter))
    }

    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Later registrations win over earlier ones for the same value or tag.
    pub fn with_adapter(mut self, adapter: Arc<dyn TypeAdapter>) -> Self {
        self.adapters.insert(0, adapter);
        self
    }

    pub fn tags(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.tag()).collect()
    }

    pub fn encode(&self, value: &FieldValue) -> Result<Value, CodecError> {
        Ok(match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.encode(item))
                    .collect::<Result<_, _>>()?,
            ),
            FieldValue::Map(map) => Value::Object(self.encode_map(map)?),
            typed => {
                for adapter in &self.adapters {
                    if let Some(repr) = adapter.encode(typed) {
                        let mut tagged = Map::new();
                        tagged.insert(TYPE_KEY.into(), Value::String(adapter.tag().to_string()));
                        tagged.insert(VALUE_KEY.into(), Value::String(repr?));
                        return Ok(Value::Object(tagged));
                    }
                }
                return Err(CodecError::Unregistered { kind: typed.kind() });
            }
        })
    }

    pub fn decode(&self, value: Value) -> Result<FieldValue, CodecError> {
        Ok(match value {
            Value::Array(items) => FieldValue::List(
                items
                    .into_iter()
                    .map(|item| self.decode(item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                if let Some((tag, repr)) = tagged_parts(&map) {
                    if let Some(adapter) = self.adapters.iter().find(|a| a.tag() == tag) {
                        return adapter.decode(repr);
                    }
                }
                FieldValue::Map(self.decode_map(map)?)
            }
            plain => plain.into(),
        })
    }

    fn encode_map(&self, map: &FieldMap) -> Result<Map<String, Value>, CodecError> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.encode(v)?)))
            .collect()
    }

    fn decode_map(&self, map: Map<String, Value>) -> Result<FieldMap, CodecError> {
        map.into_iter()
            .map(|(k, v)| Ok((k, self.decode(v)?)))
            .collect()
    }
}

impl Default for TaggedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaggedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggedCodec")
            .field("adapters", &self.tags())
            .finish()
    }
}

impl ValueCodec for TaggedCodec {
    fn parse(&self, text: &str) -> Result<FieldMap, CodecError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => self.decode_map(map),
            _ => Err(CodecError::NotAnObject),
        }
    }

    fn stringify(&self, values: &FieldMap) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&Value::Object(self.encode_map(values)?))?)
    }
}

fn tagged_parts(map: &Map<String, Value>) -> Option<(&str, &str)> {
    if map.len() != 2 {
        return None;
    }
    let tag = map.get(TYPE_KEY)?.as_str()?;
    let repr = map.get(VALUE_KEY)?.as_str()?;
    Some((tag, repr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::{date, datetime};

    fn sample() -> FieldMap {
        let mut values = FieldMap::new();
        values.insert("name".into(), "alice".into());
        values.insert("age".into(), 41i64.into());
        values.insert("active".into(), true.into());
        values.insert("created".into(), datetime!(2024-03-01 09:30:15.25 +02:00).into());
        values.insert("birthday".into(), date!(1983-07-14).into());
        values.insert(
            "range".into(),
            vec![
                FieldValue::Timestamp(datetime!(2024-01-01 00:00 UTC)),
                FieldValue::Timestamp(datetime!(2024-01-31 23:59:59 UTC)),
            ]
            .into(),
        );
        values.insert("missing".into(), FieldValue::Null);
        values
    }

    #[test]
    fn temporal_values_survive_the_text_form() {
        let codec = TaggedCodec::new();
        let values = sample();
        let text = codec.stringify(&values).unwrap();
        assert_eq!(codec.parse(&text).unwrap(), values);
    }

    #[test]
    fn tagged_layout_is_stable() {
        let codec = TaggedCodec::new();
        let mut values = FieldMap::new();
        values.insert("day".into(), date!(2024-02-29).into());
        values.insert("at".into(), datetime!(2024-02-29 12:00 UTC).into());
        let text = codec.stringify(&values).unwrap();
        let raw: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            raw,
            json!({
                "at": {"$type": "timestamp", "$value": "2024-02-29T12:00:00Z"},
                "day": {"$type": "date", "$value": "2024-02-29"},
            })
        );
    }

    #[test]
    fn unknown_tags_pass_through_as_maps() {
        let codec = TaggedCodec::new();
        let parsed = codec
            .parse(r#"{"money": {"$type": "decimal", "$value": "12.50"}}"#)
            .unwrap();
        let FieldValue::Map(money) = &parsed["money"] else {
            panic!("expected a plain map, got {:?}", parsed["money"]);
        };
        assert_eq!(money[TYPE_KEY], FieldValue::from("decimal"));
        assert_eq!(money[VALUE_KEY], FieldValue::from("12.50"));
    }

    #[test]
    fn malformed_inputs_are_errors() {
        let codec = TaggedCodec::new();
        assert!(matches!(codec.parse("{not json"), Err(CodecError::Json(_))));
        assert!(matches!(codec.parse("[1, 2]"), Err(CodecError::NotAnObject)));
        assert!(matches!(
            codec.parse(r#"{"at": {"$type": "timestamp", "$value": "yesterday"}}"#),
            Err(CodecError::Decode { .. })
        ));
    }

    #[test]
    fn temporal_values_need_an_adapter() {
        let codec = TaggedCodec::empty();
        let mut values = FieldMap::new();
        values.insert("day".into(), date!(2024-02-29).into());
        assert!(matches!(
            codec.stringify(&values),
            Err(CodecError::Unregistered { kind: "date" })
        ));
    }

    struct UnixSeconds;

    impl TypeAdapter for UnixSeconds {
        fn tag(&self) -> &str {
            "unix"
        }

        fn encode(&self, value: &FieldValue) -> Option<Result<String, CodecError>> {
            match value {
                FieldValue::Timestamp(at) => Some(Ok(at.unix_timestamp().to_string())),
                _ => None,
            }
        }

        fn decode(&self, repr: &str) -> Result<FieldValue, CodecError> {
            repr.parse::<i64>()
                .ok()
                .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                .map(FieldValue::Timestamp)
                .ok_or_else(|| CodecError::Decode {
                    tag: "unix".into(),
                    repr: repr.into(),
                })
        }
    }

    #[test]
    fn custom_adapter_takes_precedence() {
        let codec = TaggedCodec::new().with_adapter(Arc::new(UnixSeconds));
        let at = datetime!(2024-05-01 00:00 UTC);
        let mut values = FieldMap::new();
        values.insert("at".into(), at.into());
        let text = codec.stringify(&values).unwrap();
        assert_eq!(text, r#"{"at":{"$type":"unix","$value":"1714521600"}}"#);
        assert_eq!(codec.parse(&text).unwrap()["at"], FieldValue::Timestamp(at));
        // previously written RFC 3339 values still decode
        let legacy = codec
            .parse(r#"{"at":{"$type":"timestamp","$value":"2024-05-01T00:00:00Z"}}"#)
            .unwrap();
        assert_eq!(legacy["at"], FieldValue::Timestamp(at));
    }
}
