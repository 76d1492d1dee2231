use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::{field::ErasedField, form::FormConfiguration, services::Services, value::Model};

/// Per-field validation messages for a whole form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::from_errors(BTreeMap::new())
    }
}

impl ValidationReport {
    pub fn from_errors(errors: BTreeMap<String, Vec<String>>) -> Self {
        let errors: BTreeMap<String, Vec<String>> = errors
            .into_iter()
            .filter(|(_, messages)| !messages.is_empty())
            .collect();
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Replaces the messages of one field; an empty list marks it valid.
    pub fn set_field_errors(&mut self, field: &str, messages: Vec<String>) {
        if messages.is_empty() {
            self.errors.remove(field);
        } else {
            self.errors.insert(field.to_string(), messages);
        }
        self.valid = self.errors.is_empty();
    }

    pub fn field_errors(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Flat `field: message` lines for a validation summary.
    pub fn summary(&self) -> Vec<String> {
        self.errors
            .iter()
            .flat_map(|(field, messages)| {
                messages
                    .iter()
                    .map(move |message| format!("{field}: {message}"))
            })
            .collect()
    }
}

/// Runs every validator of one field in order and collects all failure messages.
pub async fn validate_field<M: Model>(
    field: &dyn ErasedField<M>,
    model: &M,
    services: &Services,
) -> Vec<String> {
    validate_value(field, model, field.get_value(model), services).await
}

/// Like [`validate_field`], against `value` instead of the value held in the model.
pub async fn validate_value<M: Model>(
    field: &dyn ErasedField<M>,
    model: &M,
    value: Value,
    services: &Services,
) -> Vec<String> {
    let mut messages = Vec::new();
    for validator in field.validators() {
        for failure in validator.failures(model, &value, services).await {
            messages.push(
                failure
                    .error_message
                    .unwrap_or_else(|| format!("{} is invalid", field.label())),
            );
        }
    }
    trace!(field = field.name(), failures = messages.len(), "field validated");
    messages
}

/// Validates a field of `form`; encrypted fields are checked in plain text.
pub async fn validate_form_field<M: Model>(
    form: &FormConfiguration<M>,
    field: &dyn ErasedField<M>,
    model: &M,
    services: &Services,
) -> Vec<String> {
    let value = form.security().display_value(field, model, services);
    validate_value(field, model, value, services).await
}

/// Hidden fields are skipped unless the form asks for them.
pub fn should_validate<M: Model>(
    form: &FormConfiguration<M>,
    field: &dyn ErasedField<M>,
    model: &M,
) -> bool {
    form.options().validate_hidden_fields || field.is_visible(model)
}

/// Validates the fields of a form concurrently; each field keeps its own validator order.
pub async fn validate_form<M: Model>(
    form: &FormConfiguration<M>,
    model: &M,
    services: &Services,
) -> ValidationReport {
    let checks = form
        .fields()
        .filter(|field| should_validate(form, *field, model))
        .map(|field| async move {
            (
                field.name().to_string(),
                validate_form_field(form, field, model, services).await,
            )
        });
    let errors = join_all(checks).await.into_iter().collect();
    ValidationReport::from_errors(errors)
}

/// Validates one collection item against its sub-form, field by field in display order.
pub async fn validate_item<I: Model>(
    form: &FormConfiguration<I>,
    item: &I,
    services: &Services,
) -> Vec<String> {
    let mut messages = Vec::new();
    for field in form.fields() {
        if should_validate(form, field, item) {
            messages.extend(validate_form_field(form, field, item, services).await);
        }
    }
    messages
}
