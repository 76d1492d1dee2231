use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{
    accessor::Accessor,
    dependency::Dependency,
    error::{BoxError, ConfigError},
    field::{
        descriptor::{FieldDescriptor, Flag},
        erased::TypedField,
    },
    lov::{LovBinding, LovConfig, config::LovFieldHook},
    messages::{self, MessageCatalog},
    render::{FileUploadOptions, RendererOverride, UiProducer},
    services::Services,
    validation::{
        AsyncPredicateValidator, CollectionRules, CollectionValidator, ConditionalValidator,
        MaxLengthValidator, MinLengthValidator, PatternValidator, PredicateValidator,
        RangeValidator, RequiredValidator, RuleSet, RuleSetValidator, Validator,
    },
    value::{FieldValue, Model, ValueType, from_value_or_default, to_value},
};

/// What a deferred validator sees once the field is finished.
pub(crate) struct FieldContext<'a> {
    label: &'a str,
    messages: &'a Arc<MessageCatalog>,
}

impl FieldContext<'_> {
    fn message(&self, template: &str, mut data: Value) -> String {
        if let Value::Object(map) = &mut data {
            map.insert("label".into(), Value::String(self.label.to_string()));
        }
        self.messages.render(template, &data)
    }
}

/// Whole bounds print without a fractional part in messages.
fn bound(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

type ValidatorFactory<M, T> =
    Box<dyn FnOnce(&FieldContext<'_>) -> Arc<dyn Validator<M, T>> + Send>;

/// Fluent configuration of one field, finished by [`crate::form::FormBuilder`].
///
/// Default messages are rendered when the field is finished, so they pick up
/// the final label no matter the call order.
pub struct FieldBuilder<M: Model, T: FieldValue> {
    accessor: Accessor<M, T>,
    label: Option<String>,
    placeholder: Option<String>,
    help_text: Option<String>,
    required: Flag<M>,
    visible: Flag<M>,
    disabled: Flag<M>,
    read_only: Flag<M>,
    order: i32,
    attributes: Map<String, Value>,
    validators: Vec<ValidatorFactory<M, T>>,
    dependencies: Vec<Dependency<M>>,
    renderer: Option<RendererOverride<M>>,
    lov: Option<Arc<dyn LovBinding<M>>>,
    errors: Vec<ConfigError>,
}

impl<M: Model, T: FieldValue> FieldBuilder<M, T> {
    pub fn new(accessor: Accessor<M, T>) -> Self {
        Self {
            accessor,
            label: None,
            placeholder: None,
            help_text: None,
            required: Flag::Fixed(false),
            visible: Flag::Fixed(true),
            disabled: Flag::Fixed(false),
            read_only: Flag::Fixed(false),
            order: 0,
            attributes: Map::new(),
            validators: Vec::new(),
            dependencies: Vec::new(),
            renderer: None,
            lov: None,
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.accessor.name()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = Some(help_text.into());
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.attributes.insert(key.into(), to_value(&value));
        self
    }

    /// Fixed choices; rendered as a choice set.
    pub fn options<O: Serialize>(self, options: impl IntoIterator<Item = O>) -> Self {
        let options: Vec<Value> = options.into_iter().map(|option| to_value(&option)).collect();
        self.attribute("options", options)
    }

    pub fn file_upload(self, options: FileUploadOptions) -> Self {
        self.attribute("file_upload", options)
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Flag::Fixed(visible);
        self
    }

    pub fn hidden(self) -> Self {
        self.visible(false)
    }

    pub fn visible_when(mut self, predicate: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        self.visible = Flag::when(predicate);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Flag::Fixed(disabled);
        self
    }

    pub fn disabled_when(mut self, predicate: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        self.disabled = Flag::when(predicate);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Flag::Fixed(read_only);
        self
    }

    pub fn read_only_when(
        mut self,
        predicate: impl Fn(&M) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.read_only = Flag::when(predicate);
        self
    }

    fn push_validator(
        mut self,
        factory: impl FnOnce(&FieldContext<'_>) -> Arc<dyn Validator<M, T>> + Send + 'static,
    ) -> Self {
        self.validators.push(Box::new(factory));
        self
    }

    /// Marks the field required with the default message.
    pub fn required(self) -> Self {
        let mut builder = self.push_validator(|ctx| {
            Arc::new(RequiredValidator::new(ctx.message(messages::REQUIRED, json!({}))))
        });
        builder.required = Flag::Fixed(true);
        builder
    }

    pub fn required_with(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.required = Flag::Fixed(true);
        self.push_validator(move |_| Arc::new(RequiredValidator::new(message)))
    }

    /// Required only while `predicate` holds; the flag follows the same predicate.
    pub fn required_when(
        mut self,
        predicate: impl Fn(&M) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        let predicate: Arc<dyn Fn(&M) -> bool + Send + Sync> = Arc::new(predicate);
        let message = message.into();
        self.required = Flag::When(Arc::clone(&predicate));
        self.push_validator(move |_| {
            Arc::new(ConditionalValidator::new(
                predicate,
                Arc::new(RequiredValidator::new(message)),
            ))
        })
    }

    pub fn min_length(self, min: usize) -> Self {
        self.push_validator(move |ctx| {
            let message = ctx.message(messages::MIN_LENGTH, json!({ "min": min }));
            Arc::new(MinLengthValidator::new(min, message))
        })
    }

    pub fn min_length_with(self, min: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        self.push_validator(move |_| Arc::new(MinLengthValidator::new(min, message)))
    }

    pub fn max_length(self, max: usize) -> Self {
        self.attribute("max_length", max).push_validator(move |ctx| {
            let message = ctx.message(messages::MAX_LENGTH, json!({ "max": max }));
            Arc::new(MaxLengthValidator::new(max, message))
        })
    }

    pub fn max_length_with(self, max: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        self.attribute("max_length", max)
            .push_validator(move |_| Arc::new(MaxLengthValidator::new(max, message)))
    }

    fn compile(&mut self, pattern: &str) -> Option<Regex> {
        match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(source) => {
                self.errors.push(ConfigError::InvalidRegex {
                    field: self.accessor.name().to_string(),
                    source,
                });
                None
            }
        }
    }

    /// An invalid pattern fails the form build with [`ConfigError::InvalidRegex`].
    pub fn pattern(mut self, pattern: &str) -> Self {
        let Some(regex) = self.compile(pattern) else {
            return self;
        };
        self.push_validator(move |ctx| {
            let message = ctx.message(messages::PATTERN, json!({}));
            Arc::new(PatternValidator::new(regex, message))
        })
    }

    pub fn pattern_with(mut self, pattern: &str, message: impl Into<String>) -> Self {
        let Some(regex) = self.compile(pattern) else {
            return self;
        };
        let message = message.into();
        self.push_validator(move |_| Arc::new(PatternValidator::new(regex, message)))
    }

    /// Inclusive numeric bounds, also published as `min`/`max` attributes.
    pub fn range(self, min: f64, max: f64) -> Self {
        self.attribute("min", min)
            .attribute("max", max)
            .push_validator(move |ctx| {
                Arc::new(RangeValidator::new(
                    Some(min),
                    Some(max),
                    ctx.message(messages::RANGE_MIN, json!({ "min": bound(min) })),
                    ctx.message(messages::RANGE_MAX, json!({ "max": bound(max) })),
                ))
            })
    }

    pub fn min_value(self, min: f64) -> Self {
        self.attribute("min", min).push_validator(move |ctx| {
            let message = ctx.message(messages::RANGE_MIN, json!({ "min": bound(min) }));
            Arc::new(RangeValidator::new(Some(min), None, message, String::new()))
        })
    }

    pub fn max_value(self, max: f64) -> Self {
        self.attribute("max", max).push_validator(move |ctx| {
            let message = ctx.message(messages::RANGE_MAX, json!({ "max": bound(max) }));
            Arc::new(RangeValidator::new(None, Some(max), String::new(), message))
        })
    }

    pub fn must(
        self,
        message: impl Into<String>,
        predicate: impl Fn(&M, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        let validator = PredicateValidator::<M, T>::new(message, move |model, value| {
            Ok(predicate(model, value))
        });
        self.validator(validator)
    }

    /// A predicate that may fail; errors count as validation failures.
    pub fn must_try(
        self,
        message: impl Into<String>,
        predicate: impl Fn(&M, &T) -> Result<bool, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.validator(PredicateValidator::new(message, predicate))
    }

    pub fn must_async<F>(self, message: impl Into<String>, predicate: F) -> Self
    where
        F: for<'a> Fn(&'a M, &'a T, &'a Services) -> BoxFuture<'a, Result<bool, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.validator(AsyncPredicateValidator::new(message, predicate))
    }

    pub fn validator(self, validator: impl Validator<M, T> + 'static) -> Self {
        let validator: Arc<dyn Validator<M, T>> = Arc::new(validator);
        self.push_validator(move |_| validator)
    }

    /// Surfaces the violations a registered [`RuleSet`] reports for this field's path.
    pub fn rules(self) -> Self {
        let path = self.accessor.path().to_string();
        self.push_validator(move |ctx| {
            let fault = ctx.message(messages::RULES_UNAVAILABLE, json!({}));
            Arc::new(RuleSetValidator::<M>::new(path, fault))
        })
    }

    pub fn rules_with(self, rule_set: Arc<dyn RuleSet<M>>) -> Self {
        let path = self.accessor.path().to_string();
        self.push_validator(move |ctx| {
            let fault = ctx.message(messages::RULES_UNAVAILABLE, json!({}));
            Arc::new(RuleSetValidator::new(path, fault).with_rule_set(rule_set))
        })
    }

    /// Runs `callback` whenever `source` changes.
    pub fn depends_on(
        mut self,
        source: impl Into<String>,
        callback: impl Fn(&mut M) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        let dependency = Dependency::update(source, self.accessor.name(), callback);
        self.dependencies.push(dependency);
        self
    }

    /// Recomputes this field from the model whenever `source` changes.
    pub fn computed_from(
        self,
        source: impl Into<String>,
        compute: impl Fn(&M) -> T + Send + Sync + 'static,
    ) -> Self {
        let accessor = self.accessor.clone();
        self.depends_on(source, move |model| {
            let value = compute(model);
            accessor.set(model, value);
            Ok(())
        })
    }

    /// Resets this field to its default whenever `source` changes.
    pub fn cleared_by(self, source: impl Into<String>) -> Self {
        let accessor = self.accessor.clone();
        self.depends_on(source, move |model| {
            accessor.reset(model);
            Ok(())
        })
    }

    /// Leaves the model alone but asks the UI to refresh this field when `source` changes.
    pub fn refreshed_by(mut self, source: impl Into<String>) -> Self {
        let dependency = Dependency::refresh(source, self.accessor.name());
        self.dependencies.push(dependency);
        self
    }

    /// Renders this field with `P`, built with `Default` unless an instance is registered.
    pub fn renderer<P: UiProducer<M> + Default + 'static>(mut self) -> Self {
        self.renderer = Some(RendererOverride::of::<P>());
        self
    }

    /// Renders this field with the `P` instance registered in [`crate::render::ProducerInstances`].
    pub fn registered_renderer<P: UiProducer<M> + 'static>(mut self) -> Self {
        self.renderer = Some(RendererOverride::registered::<P>());
        self
    }

    /// Binds a list of values to this field.
    ///
    /// Clear-on-change dependencies are also added to the dependency graph so
    /// that committing the parent clears this field and its mapped targets.
    pub fn lov<I: Send + Sync + 'static>(mut self, mut config: LovConfig<M, I>) -> Self {
        let name = self.accessor.name().to_string();
        let setter = self.accessor.clone();
        let resetter = self.accessor.clone();
        config.field = Some(LovFieldHook {
            name: name.clone(),
            set: Arc::new(move |model: &mut M, value: Value| {
                setter.set(model, from_value_or_default(value))
            }),
            reset: Arc::new(move |model: &mut M| resetter.reset(model)),
        });

        let binding: Arc<dyn LovBinding<M>> = Arc::new(config);
        for dependency in binding.dependencies() {
            if dependency.clear_on_change {
                let lov = Arc::clone(&binding);
                let accessor = self.accessor.clone();
                self.dependencies.push(Dependency::update(
                    dependency.field.clone(),
                    name.clone(),
                    move |model| {
                        accessor.reset(model);
                        lov.clear_mapped(model);
                        Ok(())
                    },
                ));
            } else {
                self.dependencies
                    .push(Dependency::refresh(dependency.field.clone(), name.clone()));
            }
        }
        self.lov = Some(binding);
        self
    }

    pub(crate) fn finish(
        self,
        messages: &Arc<MessageCatalog>,
    ) -> Result<TypedField<M, T>, ConfigError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        let label = self
            .label
            .unwrap_or_else(|| self.accessor.name().to_string());
        let ctx = FieldContext {
            label: &label,
            messages,
        };
        let validators = self
            .validators
            .into_iter()
            .map(|factory| factory(&ctx))
            .collect();

        let descriptor = FieldDescriptor {
            value_type: ValueType::of::<T>(),
            accessor: self.accessor,
            label,
            placeholder: self.placeholder,
            help_text: self.help_text,
            required: self.required,
            visible: self.visible,
            disabled: self.disabled,
            read_only: self.read_only,
            order: self.order,
            attributes: self.attributes,
            validators,
            dependencies: self.dependencies,
            renderer: self.renderer,
            lov: self.lov,
        };
        Ok(TypedField::new(descriptor))
    }
}

impl<M: Model, I: FieldValue> FieldBuilder<M, Vec<I>> {
    /// Item-count bounds plus per-item validation against a sub-form.
    pub fn collection(mut self, rules: CollectionRules<I>) -> Self {
        if let Some(min) = rules.min_items {
            self.attributes.insert("min_items".into(), json!(min));
        }
        if let Some(max) = rules.max_items {
            self.attributes.insert("max_items".into(), json!(max));
        }
        self.push_validator(move |ctx| {
            Arc::new(CollectionValidator::new(
                ctx.label,
                rules,
                Arc::clone(ctx.messages),
            ))
        })
    }
}
