use std::{any::Any, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    dependency::Dependency,
    field::descriptor::{FieldDescriptor, Flag},
    lov::LovBinding,
    render::RendererOverride,
    services::Services,
    validation::{ValidationOutcome, Validator},
    value::{FieldValue, Model, ValueType, from_value_or_default, to_value},
};

/// Uniform view over a typed field, with the value type erased to [`Value`].
///
/// This is what a [`crate::form::FormConfiguration`] stores. Reads and flag
/// writes go to the typed [`FieldDescriptor`] underneath, which stays
/// reachable through [`downcast`](#method.downcast).
pub trait ErasedField<M: Model>: Send + Sync {
    fn name(&self) -> &str;
    fn path(&self) -> &str;
    fn label(&self) -> &str;
    fn placeholder(&self) -> Option<&str>;
    fn help_text(&self) -> Option<&str>;
    fn order(&self) -> i32;
    fn attributes(&self) -> &Map<String, Value>;

    fn is_required(&self, model: &M) -> bool;
    fn is_visible(&self, model: &M) -> bool;
    fn is_disabled(&self, model: &M) -> bool;
    fn is_read_only(&self, model: &M) -> bool;
    fn set_visible(&mut self, visible: Flag<M>);
    fn set_disabled(&mut self, disabled: Flag<M>);
    fn set_read_only(&mut self, read_only: Flag<M>);

    /// Concrete value type of the wrapped descriptor.
    fn value_type(&self) -> &ValueType;
    fn get_value(&self, model: &M) -> Value;
    /// Writes an erased value; values that do not convert become the type's default.
    fn set_value(&self, model: &mut M, value: Value);
    fn reset_value(&self, model: &mut M);

    fn validators(&self) -> &[Arc<dyn Validator<M, Value>>];
    fn dependencies(&self) -> &[Dependency<M>];
    fn renderer(&self) -> Option<&RendererOverride<M>>;
    fn lov(&self) -> Option<&Arc<dyn LovBinding<M>>>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a, M: Model> dyn ErasedField<M> + 'a {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes().get(key)
    }

    /// Declared type refined by the value currently held in the model.
    pub fn runtime_type(&self, model: &M) -> ValueType {
        self.value_type().refine(&self.get_value(model))
    }

    pub fn downcast<T: FieldValue>(&self) -> Option<&FieldDescriptor<M, T>> {
        self.as_any()
            .downcast_ref::<TypedField<M, T>>()
            .map(TypedField::descriptor)
    }

    pub fn downcast_mut<T: FieldValue>(&mut self) -> Option<&mut FieldDescriptor<M, T>> {
        self.as_any_mut()
            .downcast_mut::<TypedField<M, T>>()
            .map(TypedField::descriptor_mut)
    }
}

/// Adapter exposing a [`FieldDescriptor`] through [`ErasedField`].
pub struct TypedField<M: Model, T: FieldValue> {
    descriptor: FieldDescriptor<M, T>,
    validators: Vec<Arc<dyn Validator<M, Value>>>,
}

impl<M: Model, T: FieldValue> TypedField<M, T> {
    pub fn new(descriptor: FieldDescriptor<M, T>) -> Self {
        let validators = descriptor
            .validators
            .iter()
            .map(|inner| {
                Arc::new(ErasingValidator::<M, T> {
                    inner: Arc::clone(inner),
                    _value: PhantomData,
                }) as Arc<dyn Validator<M, Value>>
            })
            .collect();
        Self {
            descriptor,
            validators,
        }
    }

    pub fn descriptor(&self) -> &FieldDescriptor<M, T> {
        &self.descriptor
    }

    pub fn descriptor_mut(&mut self) -> &mut FieldDescriptor<M, T> {
        &mut self.descriptor
    }
}

impl<M: Model, T: FieldValue> ErasedField<M> for TypedField<M, T> {
    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn path(&self) -> &str {
        self.descriptor.path()
    }

    fn label(&self) -> &str {
        self.descriptor.label()
    }

    fn placeholder(&self) -> Option<&str> {
        self.descriptor.placeholder()
    }

    fn help_text(&self) -> Option<&str> {
        self.descriptor.help_text()
    }

    fn order(&self) -> i32 {
        self.descriptor.order()
    }

    fn attributes(&self) -> &Map<String, Value> {
        self.descriptor.attributes()
    }

    fn is_required(&self, model: &M) -> bool {
        self.descriptor.is_required(model)
    }

    fn is_visible(&self, model: &M) -> bool {
        self.descriptor.is_visible(model)
    }

    fn is_disabled(&self, model: &M) -> bool {
        self.descriptor.is_disabled(model)
    }

    fn is_read_only(&self, model: &M) -> bool {
        self.descriptor.is_read_only(model)
    }

    fn set_visible(&mut self, visible: Flag<M>) {
        self.descriptor.set_visible(visible);
    }

    fn set_disabled(&mut self, disabled: Flag<M>) {
        self.descriptor.set_disabled(disabled);
    }

    fn set_read_only(&mut self, read_only: Flag<M>) {
        self.descriptor.set_read_only(read_only);
    }

    fn value_type(&self) -> &ValueType {
        self.descriptor.value_type()
    }

    fn get_value(&self, model: &M) -> Value {
        to_value(&self.descriptor.get(model))
    }

    fn set_value(&self, model: &mut M, value: Value) {
        self.descriptor.set(model, from_value_or_default(value));
    }

    fn reset_value(&self, model: &mut M) {
        self.descriptor.accessor.reset(model);
    }

    fn validators(&self) -> &[Arc<dyn Validator<M, Value>>] {
        &self.validators
    }

    fn dependencies(&self) -> &[Dependency<M>] {
        self.descriptor.dependencies()
    }

    fn renderer(&self) -> Option<&RendererOverride<M>> {
        self.descriptor.renderer()
    }

    fn lov(&self) -> Option<&Arc<dyn LovBinding<M>>> {
        self.descriptor.lov()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Converts the erased value back to `T` before delegating to a typed validator.
struct ErasingValidator<M: Model, T: FieldValue> {
    inner: Arc<dyn Validator<M, T>>,
    _value: PhantomData<fn() -> T>,
}

#[async_trait]
impl<M: Model, T: FieldValue> Validator<M, Value> for ErasingValidator<M, T> {
    async fn validate(&self, model: &M, value: &Value, services: &Services) -> ValidationOutcome {
        let typed: T = from_value_or_default(value.clone());
        self.inner.validate(model, &typed, services).await
    }

    async fn failures(
        &self,
        model: &M,
        value: &Value,
        services: &Services,
    ) -> Vec<ValidationOutcome> {
        let typed: T = from_value_or_default(value.clone());
        self.inner.failures(model, &typed, services).await
    }
}
