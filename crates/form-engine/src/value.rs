use std::any::{TypeId, type_name};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Models bound to a form. Implemented for every thread-safe owned type.
pub trait Model: Send + Sync + 'static {}

impl<M> Model for M where M: Send + Sync + 'static {}

/// Values a typed field can hold.
///
/// The serde bounds drive type erasure to [`Value`], `JsonSchema` lets the
/// engine recover a [`ValueKind`] once at configuration time, and `Default`
/// is the fallback whenever an erased value cannot be converted back.
pub trait FieldValue:
    Serialize + DeserializeOwned + JsonSchema + Default + Clone + Send + Sync + 'static
{
}

impl<T> FieldValue for T where
    T: Serialize + DeserializeOwned + JsonSchema + Default + Clone + Send + Sync + 'static
{
}

/// Coarse classification of a field value used by the render dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Boolean,
    Integer,
    Number,
    Date,
    DateTime,
    Sequence,
    Object,
    Unknown,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Date => "date",
            ValueKind::DateTime => "date_time",
            ValueKind::Sequence => "sequence",
            ValueKind::Object => "object",
            ValueKind::Unknown => "unknown",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Number)
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Unknown,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(number) if number.is_f64() => ValueKind::Number,
            Value::Number(_) => ValueKind::Integer,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Sequence,
            Value::Object(_) => ValueKind::Object,
        }
    }
}

/// Concrete type of a field, recovered from behind the erased contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
    kind: ValueKind,
    nullable: bool,
}

impl ValueType {
    pub fn of<T: FieldValue>() -> Self {
        let schema = schemars::schema_for!(T);
        let (kind, nullable) = kind_from_schema(schema.as_value());
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind,
            nullable,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Narrows an `Unknown` kind (e.g. a field typed as raw JSON) from the current value.
    pub fn refine(&self, current: &Value) -> ValueType {
        if self.kind != ValueKind::Unknown {
            return self.clone();
        }
        ValueType {
            kind: ValueKind::from_json(current),
            ..self.clone()
        }
    }
}

fn kind_from_schema(schema: &Value) -> (ValueKind, bool) {
    if let Some(ty) = schema.get("type") {
        let format = schema.get("format").and_then(Value::as_str);
        return match ty {
            Value::String(name) => (kind_from_type_name(name, format), false),
            Value::Array(names) => {
                let nullable = names.iter().any(|name| name.as_str() == Some("null"));
                let kind = names
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|name| *name != "null")
                    .map(|name| kind_from_type_name(name, format))
                    .unwrap_or(ValueKind::Unknown);
                (kind, nullable)
            }
            _ => (ValueKind::Unknown, false),
        };
    }

    let branches = schema
        .get("anyOf")
        .or_else(|| schema.get("oneOf"))
        .and_then(Value::as_array);
    if let Some(branches) = branches {
        let mut nullable = false;
        let mut kind = ValueKind::Unknown;
        for branch in branches {
            if branch.get("type").and_then(Value::as_str) == Some("null") {
                nullable = true;
            } else if kind == ValueKind::Unknown {
                let (branch_kind, branch_nullable) = kind_from_schema(branch);
                kind = branch_kind;
                nullable |= branch_nullable;
            }
        }
        return (kind, nullable);
    }

    if schema.get("$ref").is_some() || schema.get("properties").is_some() {
        return (ValueKind::Object, false);
    }

    (ValueKind::Unknown, false)
}

fn kind_from_type_name(name: &str, format: Option<&str>) -> ValueKind {
    match (name, format) {
        ("string", Some("date")) => ValueKind::Date,
        ("string", Some("date-time")) => ValueKind::DateTime,
        ("string", _) => ValueKind::String,
        ("boolean", _) => ValueKind::Boolean,
        ("integer", _) => ValueKind::Integer,
        ("number", _) => ValueKind::Number,
        ("array", _) => ValueKind::Sequence,
        ("object", _) => ValueKind::Object,
        _ => ValueKind::Unknown,
    }
}

/// Converts an erased value back to `T`; anything that does not fit becomes `T::default()`.
pub fn from_value_or_default<T: DeserializeOwned + Default>(value: Value) -> T {
    serde_json::from_value(value).unwrap_or_else(|error| {
        tracing::trace!(target_type = type_name::<T>(), %error, "falling back to default value");
        T::default()
    })
}

pub fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Blank in the "required" sense: null, whitespace-only text, `false` or an empty sequence.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Bool(flag) => !flag,
        Value::Array(items) => items.is_empty(),
        Value::Number(_) | Value::Object(_) => false,
    }
}

/// Human-friendly rendition used in messages and text output.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        other => other.to_string(),
    }
}
