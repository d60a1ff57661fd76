use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::OptionError;

/// Where an option attribute comes from: a key of the serialized source
/// item, or a function of the item.
pub enum FieldRef<T, R> {
    Key(String),
    Computed(Arc<dyn Fn(&T) -> R + Send + Sync>),
}

impl<T, R> FieldRef<T, R> {
    pub fn key(key: impl Into<String>) -> Self {
        FieldRef::Key(key.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        FieldRef::Computed(Arc::new(f))
    }

    fn as_key(&self) -> Option<&str> {
        match self {
            FieldRef::Key(key) => Some(key),
            FieldRef::Computed(_) => None,
        }
    }
}

impl<T, R: FromField> FieldRef<T, R> {
    fn resolve(&self, item: &T, raw: &Map<String, Value>) -> R {
        match self {
            FieldRef::Key(key) => R::from_field(raw.get(key)),
            FieldRef::Computed(f) => f(item),
        }
    }
}

impl<T, R> Clone for FieldRef<T, R> {
    fn clone(&self) -> Self {
        match self {
            FieldRef::Key(key) => FieldRef::Key(key.clone()),
            FieldRef::Computed(f) => FieldRef::Computed(Arc::clone(f)),
        }
    }
}

impl<T, R> From<&str> for FieldRef<T, R> {
    fn from(key: &str) -> Self {
        FieldRef::key(key)
    }
}

impl<T, R> std::fmt::Debug for FieldRef<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRef::Key(key) => f.debug_tuple("Key").field(key).finish(),
            FieldRef::Computed(_) => f.write_str("Computed"),
        }
    }
}

/// Reads an option attribute out of a raw JSON field.
pub trait FromField {
    fn from_field(value: Option<&Value>) -> Self;
}

impl FromField for String {
    fn from_field(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl FromField for bool {
    fn from_field(value: Option<&Value>) -> Self {
        matches!(value, Some(Value::Bool(true)))
    }
}

type ExtraFn<T> = Arc<dyn Fn(&T) -> Map<String, Value> + Send + Sync>;

/// Maps source items onto option attributes.
pub struct FieldNames<T> {
    pub label: FieldRef<T, String>,
    pub value: String,
    pub title: Option<FieldRef<T, String>>,
    /// Source key matched by the default filter; the label when unset.
    pub keyword: Option<String>,
    pub disabled: Option<FieldRef<T, bool>>,
    pub extra: Option<ExtraFn<T>>,
}

impl<T> FieldNames<T> {
    pub fn new(label: impl Into<FieldRef<T, String>>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            title: None,
            keyword: None,
            disabled: None,
            extra: None,
        }
    }

    pub fn title(mut self, title: impl Into<FieldRef<T, String>>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn disabled(mut self, disabled: impl Into<FieldRef<T, bool>>) -> Self {
        self.disabled = Some(disabled.into());
        self
    }

    pub fn extra<F>(mut self, extra: F) -> Self
    where
        F: Fn(&T) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.extra = Some(Arc::new(extra));
        self
    }
}

impl<T: Serialize + Clone> FieldNames<T> {
    pub fn option(&self, item: &T) -> Result<SelectOption<T>, OptionError> {
        let raw = raw_fields(item)?;
        let label = self.label.resolve(item, &raw);
        let keyword = match self.keyword.as_deref().or_else(|| self.label.as_key()) {
            Some(key) => String::from_field(raw.get(key)),
            None => label.clone(),
        };
        Ok(SelectOption {
            value: raw.get(&self.value).cloned().unwrap_or(Value::Null),
            title: self.title.as_ref().map(|title| title.resolve(item, &raw)),
            disabled: self
                .disabled
                .as_ref()
                .is_some_and(|disabled| disabled.resolve(item, &raw)),
            extra: self.extra.as_ref().map(|extra| extra(item)).unwrap_or_default(),
            label,
            keyword,
            source: item.clone(),
        })
    }

    pub fn transform(&self, items: &[T]) -> Result<Vec<SelectOption<T>>, OptionError> {
        items.iter().map(|item| self.option(item)).collect()
    }

    /// The item's value-field, as compared against selected values.
    pub fn value_of(&self, item: &T) -> Result<Value, OptionError> {
        Ok(raw_fields(item)?.remove(&self.value).unwrap_or(Value::Null))
    }
}

impl<T> Default for FieldNames<T> {
    fn default() -> Self {
        Self::new("label", "value")
    }
}

impl<T> Clone for FieldNames<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            value: self.value.clone(),
            title: self.title.clone(),
            keyword: self.keyword.clone(),
            disabled: self.disabled.clone(),
            extra: self.extra.clone(),
        }
    }
}

impl<T> std::fmt::Debug for FieldNames<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldNames")
            .field("label", &self.label)
            .field("value", &self.value)
            .field("title", &self.title)
            .field("keyword", &self.keyword)
            .field("disabled", &self.disabled)
            .finish()
    }
}

fn raw_fields<T: Serialize>(item: &T) -> Result<Map<String, Value>, OptionError> {
    match serde_json::to_value(item)? {
        Value::Object(map) => Ok(map),
        other => Err(OptionError::NotAnObject {
            found: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption<T> {
    pub label: String,
    pub value: Value,
    pub title: Option<String>,
    pub disabled: bool,
    /// Text the default filter matches against.
    pub keyword: String,
    pub extra: Map<String, Value>,
    pub source: T,
}

/// Case-sensitive substring match on the option keyword.
pub fn keyword_filter<T>(input: &str, option: &SelectOption<T>) -> bool {
    option.keyword.contains(input)
}

/// Source payloads arrive either as a bare list or wrapped as `{"data": [...]}`
/// (paged list endpoints reused for search).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionPayload<T> {
    List(Vec<T>),
    Wrapped {
        #[serde(default = "Vec::new")]
        data: Vec<T>,
    },
}

impl<T> OptionPayload<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            OptionPayload::List(items) => items,
            OptionPayload::Wrapped { data } => data,
        }
    }
}

impl<T> From<Vec<T>> for OptionPayload<T> {
    fn from(items: Vec<T>) -> Self {
        OptionPayload::List(items)
    }
}
