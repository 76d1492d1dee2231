use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
    field::ErasedField,
    render::{RenderContext, UiProducer},
    value::{Model, ValueKind, ValueType, display_value},
};

/// Settings stored under the `file_upload` attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileUploadOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    #[serde(default)]
    pub multiple: bool,
}

fn copy_attribute<M: Model>(
    map: &mut Map<String, Value>,
    field: &dyn ErasedField<M>,
    from: &str,
    to: &str,
) {
    if let Some(value) = field.attributes().get(from) {
        map.insert(to.into(), value.clone());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileUploadProducer;

impl<M: Model> UiProducer<M> for FileUploadProducer {
    fn name(&self) -> &str {
        "file_upload"
    }

    fn can_render(&self, _value_type: &ValueType, field: &dyn ErasedField<M>) -> bool {
        field.attribute("file_upload").is_some()
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let options: FileUploadOptions = ctx
            .field
            .attribute("file_upload")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        let mut map = ctx.base("Input.File");
        if !options.accept.is_empty() {
            map.insert("accept".into(), json!(options.accept));
        }
        if let Some(max) = options.max_size_bytes {
            map.insert("maxSizeBytes".into(), json!(max));
        }
        map.insert("isMultiSelect".into(), Value::Bool(options.multiple));
        Value::Object(map)
    }
}

/// Fixed options taken from the `options` attribute.
///
/// Entries are either plain values or `{ "title": .., "value": .. }` objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChoiceSetProducer;

impl<M: Model> UiProducer<M> for ChoiceSetProducer {
    fn name(&self) -> &str {
        "choice_set"
    }

    fn can_render(&self, _value_type: &ValueType, field: &dyn ErasedField<M>) -> bool {
        field.attribute("options").is_some_and(Value::is_array)
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let choices = ctx
            .field
            .attribute("options")
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .map(|option| match option {
                        Value::Object(entry) if entry.contains_key("value") => {
                            let value = entry.get("value").cloned().unwrap_or(Value::Null);
                            let title = entry
                                .get("title")
                                .map(display_value)
                                .unwrap_or_else(|| display_value(&value));
                            json!({ "title": title, "value": value })
                        }
                        other => json!({ "title": display_value(other), "value": other }),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut map = ctx.base("Input.ChoiceSet");
        map.insert("style".into(), Value::String("compact".into()));
        map.insert(
            "isMultiSelect".into(),
            Value::Bool(ctx.value_type.kind() == ValueKind::Sequence),
        );
        map.insert("choices".into(), Value::Array(choices));
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToggleProducer;

impl<M: Model> UiProducer<M> for ToggleProducer {
    fn name(&self) -> &str {
        "toggle"
    }

    fn accepts(&self, value_type: &ValueType) -> bool {
        value_type.kind() == ValueKind::Boolean
    }

    fn can_render(&self, value_type: &ValueType, _field: &dyn ErasedField<M>) -> bool {
        value_type.kind() == ValueKind::Boolean
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let mut map = ctx.base("Input.Toggle");
        map.insert("title".into(), Value::String(ctx.field.label().to_string()));
        map.insert("valueOn".into(), Value::String("true".into()));
        map.insert("valueOff".into(), Value::String("false".into()));
        let on = ctx.value.as_bool() == Some(true);
        map.insert("value".into(), Value::String(on.to_string()));
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateProducer;

impl<M: Model> UiProducer<M> for DateProducer {
    fn name(&self) -> &str {
        "date"
    }

    fn accepts(&self, value_type: &ValueType) -> bool {
        matches!(value_type.kind(), ValueKind::Date | ValueKind::DateTime)
    }

    fn can_render(&self, value_type: &ValueType, _field: &dyn ErasedField<M>) -> bool {
        UiProducer::<M>::accepts(self, value_type)
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let mut map = ctx.base("Input.Date");
        map.insert(
            "includeTime".into(),
            Value::Bool(ctx.value_type.kind() == ValueKind::DateTime),
        );
        copy_attribute(&mut map, ctx.field, "min", "min");
        copy_attribute(&mut map, ctx.field, "max", "max");
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberProducer;

impl<M: Model> UiProducer<M> for NumberProducer {
    fn name(&self) -> &str {
        "number"
    }

    fn accepts(&self, value_type: &ValueType) -> bool {
        value_type.kind().is_numeric()
    }

    fn can_render(&self, value_type: &ValueType, _field: &dyn ErasedField<M>) -> bool {
        value_type.kind().is_numeric()
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let mut map = ctx.base("Input.Number");
        map.insert(
            "integer".into(),
            Value::Bool(ctx.value_type.kind() == ValueKind::Integer),
        );
        copy_attribute(&mut map, ctx.field, "min", "min");
        copy_attribute(&mut map, ctx.field, "max", "max");
        Value::Object(map)
    }
}

/// Repeating editor for sequence fields; item bounds come from collection attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListProducer;

impl<M: Model> UiProducer<M> for ListProducer {
    fn name(&self) -> &str {
        "list"
    }

    fn accepts(&self, value_type: &ValueType) -> bool {
        value_type.kind() == ValueKind::Sequence
    }

    fn can_render(&self, value_type: &ValueType, _field: &dyn ErasedField<M>) -> bool {
        value_type.kind() == ValueKind::Sequence
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let mut map = ctx.base("Input.List");
        let count = ctx.value.as_array().map(Vec::len).unwrap_or(0);
        map.insert("itemCount".into(), json!(count));
        copy_attribute(&mut map, ctx.field, "min_items", "minItems");
        copy_attribute(&mut map, ctx.field, "max_items", "maxItems");
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextProducer;

impl<M: Model> UiProducer<M> for TextProducer {
    fn name(&self) -> &str {
        "text"
    }

    fn accepts(&self, value_type: &ValueType) -> bool {
        value_type.kind() == ValueKind::String
    }

    fn can_render(&self, value_type: &ValueType, _field: &dyn ErasedField<M>) -> bool {
        value_type.kind() == ValueKind::String
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let mut map = ctx.base("Input.Text");
        map.insert("value".into(), Value::String(display_value(&ctx.value)));
        copy_attribute(&mut map, ctx.field, "max_length", "maxLength");
        copy_attribute(&mut map, ctx.field, "multiline", "isMultiline");
        if ctx.field.attribute("secret").and_then(Value::as_bool) == Some(true) {
            map.insert("style".into(), Value::String("password".into()));
        }
        Value::Object(map)
    }
}
