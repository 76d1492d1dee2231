//! List-of-values lookups: paged provider contract, per-field configuration
//! and the controller that drives searching, paging and selection.

pub mod config;
pub mod controller;
pub mod provider;
pub mod query;

use serde_json::{Value, json};

use crate::{
    field::ErasedField,
    render::{RenderContext, UiProducer},
    settings::LovSettings,
    value::{Model, ValueType},
};

pub use config::{
    FieldMapping, LovBinding, LovColumn, LovConfig, LovDependency, LovDisplayOptions,
    SelectionMode,
};
pub use controller::{
    ApplyOutcome, LovController, MappingFailure, PendingQuery, QueryCompletion, SelectionOutcome,
};
pub use provider::{FnProvider, InMemoryProvider, LovDataProvider, LovRegistry, LovSource};
pub use query::{
    FilterDefinition, FilterOperator, LovDataResult, LovQuery, SortDefinition, SortDirection,
};

/// Picker for any field with a LOV binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LovProducer;

impl<M: Model> UiProducer<M> for LovProducer {
    fn name(&self) -> &str {
        "lov"
    }

    fn can_render(&self, _value_type: &ValueType, field: &dyn ErasedField<M>) -> bool {
        field.lov().is_some()
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let mut map = ctx.base("Input.Lov");
        let Some(binding) = ctx.field.lov() else {
            return Value::Object(map);
        };

        let defaults = ctx
            .services
            .get::<LovSettings>()
            .copied()
            .unwrap_or_default();
        let options = binding.options();
        map.insert(
            "selectionMode".into(),
            json!(binding.selection_mode()),
        );
        map.insert(
            "modalTitle".into(),
            Value::String(
                options
                    .modal_title
                    .clone()
                    .unwrap_or_else(|| ctx.field.label().to_string()),
            ),
        );
        map.insert(
            "pageSize".into(),
            json!(options.page_size.unwrap_or(defaults.page_size)),
        );
        map.insert(
            "debounceMs".into(),
            json!(options.debounce_ms.unwrap_or(defaults.debounce_ms)),
        );
        map.insert("searchable".into(), Value::Bool(options.searchable));
        map.insert("minSearchLength".into(), json!(options.min_search_length));
        map.insert("columns".into(), json!(binding.columns()));
        if let Some(provider) = binding.provider_name() {
            map.insert("provider".into(), Value::String(provider.to_string()));
        }
        let depends_on = binding
            .dependencies()
            .iter()
            .map(|dependency| {
                json!({
                    "field": dependency.field,
                    "contextKey": dependency.context_key,
                    "clearOnChange": dependency.clear_on_change,
                })
            })
            .collect::<Vec<_>>();
        if !depends_on.is_empty() {
            map.insert("dependsOn".into(), Value::Array(depends_on));
        }
        let mapped = binding.mapped_targets();
        if !mapped.is_empty() {
            map.insert("mappedFields".into(), json!(mapped));
        }
        Value::Object(map)
    }
}
