pub mod form;
pub mod producers;

use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use serde_json::{Value, json};
use tracing::debug;

use crate::{
    field::ErasedField,
    lov::LovProducer,
    messages::{self, MessageCatalog},
    services::Services,
    value::{Model, ValueType},
};

pub use form::{RenderedField, RenderedForm, render_form, render_text};
pub use producers::{
    ChoiceSetProducer, DateProducer, FileUploadOptions, FileUploadProducer, ListProducer,
    NumberProducer, TextProducer, ToggleProducer,
};

/// Interaction emitted by a rendered widget back to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    /// The user committed an edited value.
    ValueChanged { field: String, value: Value },
    /// Cascading UI (options, lookups) needs a refresh without a value change.
    DependencyChanged { field: String },
}

type ValueChangedFn = Arc<dyn Fn(&str, Value) + Send + Sync>;
type DependencyChangedFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks a producer uses to report interaction.
#[derive(Clone)]
pub struct FieldCallbacks {
    value_changed: ValueChangedFn,
    dependency_changed: DependencyChangedFn,
}

impl FieldCallbacks {
    pub fn new(
        value_changed: impl Fn(&str, Value) + Send + Sync + 'static,
        dependency_changed: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            value_changed: Arc::new(value_changed),
            dependency_changed: Arc::new(dependency_changed),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_, _| {}, |_| {})
    }

    /// Forwards every callback as a [`FieldEvent`] on the channel.
    pub fn channel(sender: tokio::sync::mpsc::UnboundedSender<FieldEvent>) -> Self {
        let dependency_sender = sender.clone();
        Self::new(
            move |field, value| {
                let event = FieldEvent::ValueChanged {
                    field: field.to_string(),
                    value,
                };
                if sender.send(event).is_err() {
                    debug!(field, "value change dropped; session is gone");
                }
            },
            move |field| {
                let event = FieldEvent::DependencyChanged {
                    field: field.to_string(),
                };
                if dependency_sender.send(event).is_err() {
                    debug!(field, "dependency change dropped; session is gone");
                }
            },
        )
    }

    pub fn value_changed(&self, field: &str, value: Value) {
        (self.value_changed)(field, value)
    }

    pub fn dependency_changed(&self, field: &str) {
        (self.dependency_changed)(field)
    }
}

impl fmt::Debug for FieldCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCallbacks")
    }
}

/// Everything a producer sees when it renders one field.
pub struct RenderContext<'a, M: Model> {
    pub model: &'a M,
    pub field: &'a dyn ErasedField<M>,
    pub value_type: ValueType,
    pub value: Value,
    pub errors: &'a [String],
    pub services: &'a Services,
    pub callbacks: FieldCallbacks,
}

impl<M: Model> RenderContext<'_, M> {
    pub fn commit(&self, value: Value) {
        self.callbacks.value_changed(self.field.name(), value);
    }

    pub fn notify_dependency_changed(&self) {
        self.callbacks.dependency_changed(self.field.name());
    }

    /// Common widget properties shared by the built-in producers.
    pub fn base(&self, widget: &str) -> serde_json::Map<String, Value> {
        let field = self.field;
        let mut map = serde_json::Map::new();
        map.insert("type".into(), Value::String(widget.to_string()));
        map.insert("id".into(), Value::String(field.name().to_string()));
        map.insert("path".into(), Value::String(field.path().to_string()));
        map.insert("label".into(), Value::String(field.label().to_string()));
        if let Some(placeholder) = field.placeholder() {
            map.insert("placeholder".into(), Value::String(placeholder.to_string()));
        }
        if let Some(help) = field.help_text() {
            map.insert("helpText".into(), Value::String(help.to_string()));
        }
        map.insert("isRequired".into(), Value::Bool(field.is_required(self.model)));
        map.insert("isDisabled".into(), Value::Bool(field.is_disabled(self.model)));
        map.insert("isReadOnly".into(), Value::Bool(field.is_read_only(self.model)));
        map.insert("value".into(), self.value.clone());
        if !self.errors.is_empty() {
            map.insert("errors".into(), json!(self.errors));
        }
        map
    }
}

/// Produces the UI description of a field.
pub trait UiProducer<M: Model>: Send + Sync {
    fn name(&self) -> &str;

    /// Value types this producer was written for; overrides are used only when this holds.
    fn accepts(&self, _value_type: &ValueType) -> bool {
        true
    }

    fn can_render(&self, value_type: &ValueType, field: &dyn ErasedField<M>) -> bool;

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value;
}

type ProducerFactory<M> = Arc<dyn Fn() -> Arc<dyn UiProducer<M>> + Send + Sync>;

/// Field-level request for a specific producer type.
pub struct RendererOverride<M: Model> {
    type_id: TypeId,
    type_name: &'static str,
    factory: Option<ProducerFactory<M>>,
}

impl<M: Model> Clone for RendererOverride<M> {
    fn clone(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            factory: self.factory.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for RendererOverride<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererOverride")
            .field("type_name", &self.type_name)
            .field("constructible", &self.factory.is_some())
            .finish()
    }
}

impl<M: Model> RendererOverride<M> {
    /// Resolved from [`ProducerInstances`] when registered, otherwise built with `Default`.
    pub fn of<P: UiProducer<M> + Default + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: type_name::<P>(),
            factory: Some(Arc::new(|| Arc::new(P::default()) as Arc<dyn UiProducer<M>>)),
        }
    }

    /// Resolved from [`ProducerInstances`] only.
    pub fn registered<P: UiProducer<M> + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: type_name::<P>(),
            factory: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn instantiate(&self, services: &Services) -> Option<Arc<dyn UiProducer<M>>> {
        services
            .get::<ProducerInstances<M>>()
            .and_then(|instances| instances.get(self.type_id))
            .or_else(|| self.factory.as_ref().map(|factory| factory()))
    }
}

/// Pre-built producer instances keyed by type, registered in [`Services`].
pub struct ProducerInstances<M: Model> {
    by_type: HashMap<TypeId, Arc<dyn UiProducer<M>>>,
}

impl<M: Model> Default for ProducerInstances<M> {
    fn default() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }
}

impl<M: Model> ProducerInstances<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<P: UiProducer<M> + 'static>(mut self, producer: P) -> Self {
        self.by_type.insert(TypeId::of::<P>(), Arc::new(producer));
        self
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<dyn UiProducer<M>>> {
        self.by_type.get(&type_id).cloned()
    }
}

/// Placeholder returned when no producer can render a field.
pub struct DiagnosticProducer {
    messages: Arc<MessageCatalog>,
}

impl DiagnosticProducer {
    pub fn new(messages: Arc<MessageCatalog>) -> Self {
        Self { messages }
    }
}

impl<M: Model> UiProducer<M> for DiagnosticProducer {
    fn name(&self) -> &str {
        "diagnostic"
    }

    fn can_render(&self, _value_type: &ValueType, _field: &dyn ErasedField<M>) -> bool {
        true
    }

    fn render(&self, ctx: &RenderContext<'_, M>) -> Value {
        let message = self.messages.render(
            messages::UNSUPPORTED_TYPE,
            &json!({ "type": ctx.value_type.name(), "field": ctx.field.name() }),
        );
        json!({
            "type": "Diagnostic",
            "id": ctx.field.name(),
            "message": message,
        })
    }
}

/// Picks the producer for a field: override, then first match, then diagnostic.
pub struct RenderDispatcher<M: Model> {
    producers: Vec<Arc<dyn UiProducer<M>>>,
    fallback: Arc<dyn UiProducer<M>>,
}

impl<M: Model> Default for RenderDispatcher<M> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<M: Model> RenderDispatcher<M> {
    /// A dispatcher with no producers; everything renders as a diagnostic.
    pub fn empty() -> Self {
        Self {
            producers: Vec::new(),
            fallback: Arc::new(DiagnosticProducer::new(Arc::new(MessageCatalog::default()))),
        }
    }

    /// The built-in producers, most specific first.
    pub fn with_defaults() -> Self {
        Self::empty()
            .register(LovProducer)
            .register(FileUploadProducer)
            .register(ChoiceSetProducer)
            .register(ToggleProducer)
            .register(DateProducer)
            .register(NumberProducer)
            .register(ListProducer)
            .register(TextProducer)
    }

    pub fn with_messages(mut self, messages: Arc<MessageCatalog>) -> Self {
        self.fallback = Arc::new(DiagnosticProducer::new(messages));
        self
    }

    pub fn register(mut self, producer: impl UiProducer<M> + 'static) -> Self {
        self.producers.push(Arc::new(producer));
        self
    }

    /// Registers ahead of every producer already present.
    pub fn register_first(mut self, producer: impl UiProducer<M> + 'static) -> Self {
        self.producers.insert(0, Arc::new(producer));
        self
    }

    pub fn producer_names(&self) -> Vec<&str> {
        self.producers.iter().map(|producer| producer.name()).collect()
    }

    pub fn resolve(
        &self,
        field: &dyn ErasedField<M>,
        runtime_type: &ValueType,
        services: &Services,
    ) -> Arc<dyn UiProducer<M>> {
        if let Some(request) = field.renderer() {
            match request.instantiate(services) {
                Some(producer) if producer.accepts(runtime_type) => return producer,
                Some(producer) => debug!(
                    field = field.name(),
                    producer = producer.name(),
                    value_type = runtime_type.name(),
                    "renderer override does not accept the value type; using standard resolution"
                ),
                None => debug!(
                    field = field.name(),
                    producer = request.type_name(),
                    "renderer override could not be instantiated; using standard resolution"
                ),
            }
        }

        self.producers
            .iter()
            .find(|producer| producer.can_render(runtime_type, field))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Resolves a producer for `field` and renders it against the current model.
    pub fn render_field(
        &self,
        field: &dyn ErasedField<M>,
        model: &M,
        display_value: Value,
        errors: &[String],
        services: &Services,
        callbacks: FieldCallbacks,
    ) -> RenderedField {
        let value_type = field.value_type().refine(&display_value);
        let producer = self.resolve(field, &value_type, services);
        let ctx = RenderContext {
            model,
            field,
            value_type,
            value: display_value,
            errors,
            services,
            callbacks,
        };
        RenderedField {
            field: field.name().to_string(),
            producer: producer.name().to_string(),
            ui: producer.render(&ctx),
        }
    }
}
