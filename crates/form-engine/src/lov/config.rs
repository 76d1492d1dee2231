use std::{any::Any, fmt, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    accessor::Accessor,
    error::BoxError,
    lov::provider::LovSource,
    services::Services,
    value::{FieldValue, Model, from_value_or_default, to_value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Single,
    Multiple,
}

/// Column shown in the picker grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LovColumn {
    pub field: String,
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default = "default_sortable")]
    pub sortable: bool,
}

fn default_sortable() -> bool {
    true
}

impl LovColumn {
    pub fn new(field: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            header: header.into(),
            width: None,
            sortable: true,
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }
}

/// Picker presentation; unset values fall back to [`crate::settings::LovSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LovDisplayOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modal_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(default = "default_searchable")]
    pub searchable: bool,
    #[serde(default)]
    pub min_search_length: usize,
}

fn default_searchable() -> bool {
    true
}

impl Default for LovDisplayOptions {
    fn default() -> Self {
        Self {
            modal_title: None,
            page_size: None,
            debounce_ms: None,
            searchable: true,
            min_search_length: 0,
        }
    }
}

type SyncMap<M, I> = Arc<dyn Fn(&mut M, &I) -> Result<(), BoxError> + Send + Sync>;
type AsyncCompute<I> =
    Arc<dyn for<'a> Fn(&'a I, &'a Services) -> BoxFuture<'a, Result<Value, BoxError>> + Send + Sync>;
type ValueSetter<M> = Arc<dyn Fn(&mut M, Value) + Send + Sync>;
type Reset<M> = Arc<dyn Fn(&mut M) + Send + Sync>;

fn erase_compute<I, F>(compute: F) -> AsyncCompute<I>
where
    F: for<'a> Fn(&'a I, &'a Services) -> BoxFuture<'a, Result<Value, BoxError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(compute)
}

pub(crate) enum MappingKind<M, I> {
    Sync(SyncMap<M, I>),
    Async {
        compute: AsyncCompute<I>,
        apply: ValueSetter<M>,
    },
}

/// Copies data from a selected item into another field of the model.
pub struct FieldMapping<M, I> {
    pub(crate) target: String,
    pub(crate) kind: MappingKind<M, I>,
    pub(crate) reset: Reset<M>,
}

impl<M, I> FieldMapping<M, I> {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, MappingKind::Async { .. })
    }
}

impl<M, I> fmt::Debug for FieldMapping<M, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMapping")
            .field("target", &self.target)
            .field("async", &self.is_async())
            .finish()
    }
}

/// A field whose value scopes the lookup.
pub struct LovDependency<M> {
    pub field: String,
    pub context_key: String,
    pub clear_on_change: bool,
    read: Arc<dyn Fn(&M) -> Value + Send + Sync>,
}

impl<M> LovDependency<M> {
    pub fn read(&self, model: &M) -> Value {
        (self.read)(model)
    }
}

impl<M> fmt::Debug for LovDependency<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LovDependency")
            .field("field", &self.field)
            .field("context_key", &self.context_key)
            .field("clear_on_change", &self.clear_on_change)
            .finish()
    }
}

/// Ties a LOV to the field that holds the selected value. Filled in by the field builder.
pub(crate) struct LovFieldHook<M> {
    pub(crate) name: String,
    pub(crate) set: ValueSetter<M>,
    pub(crate) reset: Reset<M>,
}

/// Declarative "pick one value from a dataset" configuration for one field.
pub struct LovConfig<M: Model, I> {
    value: Arc<dyn Fn(&I) -> Value + Send + Sync>,
    display: Arc<dyn Fn(&I) -> String + Send + Sync>,
    source: LovSource<I>,
    columns: Vec<LovColumn>,
    mappings: Vec<FieldMapping<M, I>>,
    dependencies: Vec<LovDependency<M>>,
    selection_mode: SelectionMode,
    options: LovDisplayOptions,
    pub(crate) field: Option<LovFieldHook<M>>,
}

impl<M: Model, I: Send + Sync + 'static> LovConfig<M, I> {
    pub fn new<V: Serialize>(
        source: LovSource<I>,
        value: impl Fn(&I) -> V + Send + Sync + 'static,
        display: impl Fn(&I) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            value: Arc::new(move |item: &I| to_value(&value(item))),
            display: Arc::new(display),
            source,
            columns: Vec::new(),
            mappings: Vec::new(),
            dependencies: Vec::new(),
            selection_mode: SelectionMode::Single,
            options: LovDisplayOptions::default(),
            field: None,
        }
    }

    pub fn column(mut self, column: LovColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    pub fn multiple(self) -> Self {
        self.with_selection_mode(SelectionMode::Multiple)
    }

    pub fn with_display_options(mut self, options: LovDisplayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn modal_title(mut self, title: impl Into<String>) -> Self {
        self.options.modal_title = Some(title.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.options.page_size = Some(page_size);
        self
    }

    pub fn debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.options.debounce_ms = Some(debounce_ms);
        self
    }

    pub fn min_search_length(mut self, length: usize) -> Self {
        self.options.min_search_length = length;
        self
    }

    /// Writes `extract(item)` into `target` whenever an item is selected.
    pub fn map_field<T: FieldValue>(
        mut self,
        target: &Accessor<M, T>,
        extract: impl Fn(&I) -> T + Send + Sync + 'static,
    ) -> Self {
        let setter = target.clone();
        let reset = target.clone();
        self.mappings.push(FieldMapping {
            target: target.name().to_string(),
            kind: MappingKind::Sync(Arc::new(move |model: &mut M, item: &I| {
                setter.set(model, extract(item));
                Ok(())
            })),
            reset: Arc::new(move |model: &mut M| reset.reset(model)),
        });
        self
    }

    /// Like [`map_field`](Self::map_field) but the extraction may fail.
    pub fn try_map_field<T: FieldValue>(
        mut self,
        target: &Accessor<M, T>,
        extract: impl Fn(&I) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Self {
        let setter = target.clone();
        let reset = target.clone();
        self.mappings.push(FieldMapping {
            target: target.name().to_string(),
            kind: MappingKind::Sync(Arc::new(move |model: &mut M, item: &I| {
                setter.set(model, extract(item)?);
                Ok(())
            })),
            reset: Arc::new(move |model: &mut M| reset.reset(model)),
        });
        self
    }

    /// Computes the mapped value asynchronously, e.g. through a service lookup.
    pub fn map_field_async<T, F>(mut self, target: &Accessor<M, T>, compute: F) -> Self
    where
        T: FieldValue,
        F: for<'a> Fn(&'a I, &'a Services) -> BoxFuture<'a, Result<T, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        let setter = target.clone();
        let reset = target.clone();
        self.mappings.push(FieldMapping {
            target: target.name().to_string(),
            kind: MappingKind::Async {
                compute: erase_compute(move |item, services| {
                    compute(item, services)
                        .map(|result| result.map(|value| to_value(&value)))
                        .boxed()
                }),
                apply: Arc::new(move |model: &mut M, value: Value| {
                    setter.set(model, from_value_or_default(value))
                }),
            },
            reset: Arc::new(move |model: &mut M| reset.reset(model)),
        });
        self
    }

    /// Scopes queries by `source`'s value under `context_key`; optionally clears the selection when it changes.
    pub fn depends_on<T: FieldValue>(
        mut self,
        source: &Accessor<M, T>,
        context_key: impl Into<String>,
        clear_on_change: bool,
    ) -> Self {
        let reader = source.clone();
        self.dependencies.push(LovDependency {
            field: source.name().to_string(),
            context_key: context_key.into(),
            clear_on_change,
            read: Arc::new(move |model: &M| to_value(&reader.get(model))),
        });
        self
    }

    pub fn value_of(&self, item: &I) -> Value {
        (self.value)(item)
    }

    pub fn display_of(&self, item: &I) -> String {
        (self.display)(item)
    }

    pub fn source(&self) -> &LovSource<I> {
        &self.source
    }

    pub fn mappings(&self) -> &[FieldMapping<M, I>] {
        &self.mappings
    }

    pub(crate) fn field_hook(&self) -> Option<&LovFieldHook<M>> {
        self.field.as_ref()
    }
}

/// Item-type-erased view of a [`LovConfig`], stored on the field descriptor.
pub trait LovBinding<M: Model>: Send + Sync {
    fn field_name(&self) -> Option<&str>;
    fn provider_name(&self) -> Option<&str>;
    fn columns(&self) -> &[LovColumn];
    fn selection_mode(&self) -> SelectionMode;
    fn options(&self) -> &LovDisplayOptions;
    fn dependencies(&self) -> &[LovDependency<M>];
    fn mapped_targets(&self) -> Vec<&str>;
    /// Current values of every dependency, keyed by context key.
    fn query_context(&self, model: &M) -> Map<String, Value>;
    /// Resets every mapped target field to its default.
    fn clear_mapped(&self, model: &mut M);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Model, I: Send + Sync + 'static> LovBinding<M> for LovConfig<M, I> {
    fn field_name(&self) -> Option<&str> {
        self.field.as_ref().map(|hook| hook.name.as_str())
    }

    fn provider_name(&self) -> Option<&str> {
        self.source.name()
    }

    fn columns(&self) -> &[LovColumn] {
        &self.columns
    }

    fn selection_mode(&self) -> SelectionMode {
        self.selection_mode
    }

    fn options(&self) -> &LovDisplayOptions {
        &self.options
    }

    fn dependencies(&self) -> &[LovDependency<M>] {
        &self.dependencies
    }

    fn mapped_targets(&self) -> Vec<&str> {
        self.mappings.iter().map(FieldMapping::target).collect()
    }

    fn query_context(&self, model: &M) -> Map<String, Value> {
        self.dependencies
            .iter()
            .map(|dependency| (dependency.context_key.clone(), dependency.read(model)))
            .collect()
    }

    fn clear_mapped(&self, model: &mut M) {
        for mapping in &self.mappings {
            (mapping.reset)(model);
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<M: Model, I> fmt::Debug for LovConfig<M, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LovConfig")
            .field("source", &self.source)
            .field("columns", &self.columns)
            .field("mappings", &self.mappings)
            .field("dependencies", &self.dependencies)
            .field("selection_mode", &self.selection_mode)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
