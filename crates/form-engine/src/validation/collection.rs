use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    form::FormConfiguration,
    messages::{self, MessageCatalog},
    services::Services,
    validation::{ValidationOutcome, Validator, pipeline::validate_item},
    value::Model,
};

/// Item-count bounds and the sub-form every item of a list field is validated against.
pub struct CollectionRules<I: Model> {
    pub(crate) item_form: Option<Arc<FormConfiguration<I>>>,
    pub(crate) min_items: Option<usize>,
    pub(crate) max_items: Option<usize>,
}

impl<I: Model> Default for CollectionRules<I> {
    fn default() -> Self {
        Self {
            item_form: None,
            min_items: None,
            max_items: None,
        }
    }
}

impl<I: Model> CollectionRules<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_form(mut self, form: FormConfiguration<I>) -> Self {
        self.item_form = Some(Arc::new(form));
        self
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }
}

/// Validates a list field: item counts first, then every item against the sub-form.
///
/// Item failures are prefixed with the collection label and the 1-based item
/// index, e.g. `Order lines[2]: Quantity must be at least 1`.
pub struct CollectionValidator<I: Model> {
    label: String,
    rules: CollectionRules<I>,
    messages: Arc<MessageCatalog>,
}

impl<I: Model> CollectionValidator<I> {
    pub fn new(
        label: impl Into<String>,
        rules: CollectionRules<I>,
        messages: Arc<MessageCatalog>,
    ) -> Self {
        Self {
            label: label.into(),
            rules,
            messages,
        }
    }
}

#[async_trait]
impl<M: Model, I: Model> Validator<M, Vec<I>> for CollectionValidator<I> {
    async fn validate(&self, model: &M, items: &Vec<I>, services: &Services) -> ValidationOutcome {
        let failures = Validator::<M, Vec<I>>::failures(self, model, items, services).await;
        if failures.is_empty() {
            return ValidationOutcome::valid();
        }
        let message = failures
            .into_iter()
            .filter_map(|failure| failure.error_message)
            .collect::<Vec<_>>()
            .join("\n");
        ValidationOutcome::invalid(message)
    }

    async fn failures(
        &self,
        _model: &M,
        items: &Vec<I>,
        services: &Services,
    ) -> Vec<ValidationOutcome> {
        let mut failures = Vec::new();

        if let Some(min) = self.rules.min_items
            && items.len() < min
        {
            failures.push(ValidationOutcome::invalid(self.messages.render(
                messages::MIN_ITEMS,
                &json!({ "label": self.label, "min": min, "count": items.len() }),
            )));
        }

        if let Some(max) = self.rules.max_items
            && items.len() > max
        {
            failures.push(ValidationOutcome::invalid(self.messages.render(
                messages::MAX_ITEMS,
                &json!({ "label": self.label, "max": max, "count": items.len() }),
            )));
        }

        if let Some(item_form) = &self.rules.item_form {
            for (index, item) in items.iter().enumerate() {
                for message in validate_item(item_form, item, services).await {
                    failures.push(ValidationOutcome::invalid(self.messages.render(
                        messages::COLLECTION_ITEM,
                        &json!({ "label": self.label, "index": index + 1, "message": message }),
                    )));
                }
            }
        }

        failures
    }
}
