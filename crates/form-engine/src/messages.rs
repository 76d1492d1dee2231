use handlebars::Handlebars;
use serde_json::Value;

use crate::error::ConfigError;

pub const REQUIRED: &str = "required";
pub const MIN_LENGTH: &str = "min_length";
pub const MAX_LENGTH: &str = "max_length";
pub const PATTERN: &str = "pattern";
pub const RANGE_MIN: &str = "range_min";
pub const RANGE_MAX: &str = "range_max";
pub const MIN_ITEMS: &str = "min_items";
pub const MAX_ITEMS: &str = "max_items";
pub const COLLECTION_ITEM: &str = "collection_item";
pub const RULES_UNAVAILABLE: &str = "rules_unavailable";
pub const UNSUPPORTED_TYPE: &str = "unsupported_type";

const DEFAULTS: &[(&str, &str)] = &[
    (REQUIRED, "{{label}} is required"),
    (MIN_LENGTH, "{{label}} must be at least {{min}} characters"),
    (MAX_LENGTH, "{{label}} must be at most {{max}} characters"),
    (PATTERN, "{{label}} has an invalid format"),
    (RANGE_MIN, "{{label}} must be at least {{min}}"),
    (RANGE_MAX, "{{label}} must be at most {{max}}"),
    (MIN_ITEMS, "{{label}} must contain at least {{min}} item(s)"),
    (MAX_ITEMS, "{{label}} must contain at most {{max}} item(s)"),
    (COLLECTION_ITEM, "{{label}}[{{index}}]: {{message}}"),
    (RULES_UNAVAILABLE, "{{label}} could not be checked"),
    (
        UNSUPPORTED_TYPE,
        "No renderer available for type '{{type}}' (field '{{field}}')",
    ),
];

/// Default message templates used by built-in validators and the render fallback.
///
/// Templates are plain handlebars strings without HTML escaping; any of them
/// can be replaced through [`MessageCatalog::set_template`].
pub struct MessageCatalog {
    registry: Handlebars<'static>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for &(name, template) in DEFAULTS {
            if let Err(error) = registry.register_template_string(name, template) {
                tracing::error!(template = name, %error, "built-in message template rejected");
            }
        }
        Self { registry }
    }
}

impl MessageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_template(&mut self, name: &str, template: &str) -> Result<(), ConfigError> {
        self.registry
            .register_template_string(name, template)
            .map_err(|source| ConfigError::InvalidTemplate {
                name: name.to_string(),
                source: Box::new(source),
            })
    }

    pub fn with_template(mut self, name: &str, template: &str) -> Result<Self, ConfigError> {
        self.set_template(name, template)?;
        Ok(self)
    }

    /// Renders a template; a missing or failing template yields its name.
    pub fn render(&self, name: &str, data: &Value) -> String {
        self.registry.render(name, data).unwrap_or_else(|error| {
            tracing::warn!(template = name, %error, "message template failed to render");
            name.to_string()
        })
    }
}

impl std::fmt::Debug for MessageCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCatalog")
            .field("templates", &self.registry.get_templates().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_render_without_escaping() {
        let catalog = MessageCatalog::new();
        let text = catalog.render(
            COLLECTION_ITEM,
            &json!({ "label": "Lines <a>", "index": 1, "message": "ProductName required" }),
        );
        assert_eq!(text, "Lines <a>[1]: ProductName required");
    }

    #[test]
    fn templates_can_be_overridden() {
        let catalog = MessageCatalog::new()
            .with_template(MIN_ITEMS, "need {{min}}")
            .expect("template");
        assert_eq!(catalog.render(MIN_ITEMS, &json!({ "min": 2 })), "need 2");
        assert!(MessageCatalog::new().set_template("broken", "{{#if}").is_err());
    }

    #[test]
    fn unknown_templates_render_their_name() {
        assert_eq!(MessageCatalog::new().render("no_such_message", &json!({})), "no_such_message");
    }
}
