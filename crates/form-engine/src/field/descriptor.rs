use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    accessor::Accessor,
    dependency::Dependency,
    lov::LovBinding,
    render::RendererOverride,
    validation::Validator,
    value::{FieldValue, Model, ValueType},
};

/// A boolean field flag, either fixed or computed from the model on every read.
pub enum Flag<M> {
    Fixed(bool),
    When(Arc<dyn Fn(&M) -> bool + Send + Sync>),
}

impl<M> Flag<M> {
    pub fn when(predicate: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        Flag::When(Arc::new(predicate))
    }

    pub fn evaluate(&self, model: &M) -> bool {
        match self {
            Flag::Fixed(value) => *value,
            Flag::When(predicate) => predicate(model),
        }
    }
}

impl<M> Clone for Flag<M> {
    fn clone(&self) -> Self {
        match self {
            Flag::Fixed(value) => Flag::Fixed(*value),
            Flag::When(predicate) => Flag::When(Arc::clone(predicate)),
        }
    }
}

impl<M> From<bool> for Flag<M> {
    fn from(value: bool) -> Self {
        Flag::Fixed(value)
    }
}

impl<M> fmt::Debug for Flag<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Fixed(value) => write!(f, "Fixed({value})"),
            Flag::When(_) => f.write_str("When(..)"),
        }
    }
}

/// Strongly typed configuration of one model property.
pub struct FieldDescriptor<M: Model, T: FieldValue> {
    pub(crate) accessor: Accessor<M, T>,
    pub(crate) value_type: ValueType,
    pub(crate) label: String,
    pub(crate) placeholder: Option<String>,
    pub(crate) help_text: Option<String>,
    pub(crate) required: Flag<M>,
    pub(crate) visible: Flag<M>,
    pub(crate) disabled: Flag<M>,
    pub(crate) read_only: Flag<M>,
    pub(crate) order: i32,
    pub(crate) attributes: Map<String, Value>,
    pub(crate) validators: Vec<Arc<dyn Validator<M, T>>>,
    pub(crate) dependencies: Vec<Dependency<M>>,
    pub(crate) renderer: Option<RendererOverride<M>>,
    pub(crate) lov: Option<Arc<dyn LovBinding<M>>>,
}

impl<M: Model, T: FieldValue> FieldDescriptor<M, T> {
    pub fn name(&self) -> &str {
        self.accessor.name()
    }

    pub fn path(&self) -> &str {
        self.accessor.path()
    }

    pub fn accessor(&self) -> &Accessor<M, T> {
        &self.accessor
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help_text.as_deref()
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn validators(&self) -> &[Arc<dyn Validator<M, T>>] {
        &self.validators
    }

    pub fn dependencies(&self) -> &[Dependency<M>] {
        &self.dependencies
    }

    pub fn renderer(&self) -> Option<&RendererOverride<M>> {
        self.renderer.as_ref()
    }

    pub fn lov(&self) -> Option<&Arc<dyn LovBinding<M>>> {
        self.lov.as_ref()
    }

    pub fn is_required(&self, model: &M) -> bool {
        self.required.evaluate(model)
    }

    pub fn is_visible(&self, model: &M) -> bool {
        self.visible.evaluate(model)
    }

    pub fn is_disabled(&self, model: &M) -> bool {
        self.disabled.evaluate(model)
    }

    pub fn is_read_only(&self, model: &M) -> bool {
        self.read_only.evaluate(model)
    }

    pub fn set_visible(&mut self, visible: impl Into<Flag<M>>) {
        self.visible = visible.into();
    }

    pub fn set_disabled(&mut self, disabled: impl Into<Flag<M>>) {
        self.disabled = disabled.into();
    }

    pub fn set_read_only(&mut self, read_only: impl Into<Flag<M>>) {
        self.read_only = read_only.into();
    }

    pub fn get(&self, model: &M) -> T {
        self.accessor.get(model)
    }

    pub fn set(&self, model: &mut M, value: T) {
        self.accessor.set(model, value)
    }
}

impl<M: Model, T: FieldValue> fmt::Debug for FieldDescriptor<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("path", &self.accessor.path())
            .field("value_type", &self.value_type.name())
            .field("label", &self.label)
            .field("order", &self.order)
            .field("validators", &self.validators.len())
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}
