use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    form::FormConfiguration,
    render::{FieldCallbacks, RenderDispatcher},
    services::Services,
    validation::ValidationReport,
    value::{Model, display_value},
};

/// UI description of one field together with the producer that built it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub field: String,
    pub producer: String,
    pub ui: Value,
}

/// Form-level render output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedForm {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub columns: u8,
    pub has_required_fields: bool,
    pub has_encrypted_fields: bool,
    pub has_audited_fields: bool,
    pub fields: Vec<RenderedField>,
    pub summary: Vec<String>,
}

impl RenderedForm {
    pub fn to_json(&self) -> Value {
        let fields = self
            .fields
            .iter()
            .map(|field| field.ui.clone())
            .collect::<Vec<_>>();
        json!({
            "type": "Form",
            "name": self.name,
            "title": self.title,
            "description": self.description,
            "columns": self.columns,
            "hasRequiredFields": self.has_required_fields,
            "hasEncryptedFields": self.has_encrypted_fields,
            "hasAuditedFields": self.has_audited_fields,
            "body": fields,
            "validationSummary": self.summary,
        })
    }
}

/// Renders every visible field in display order.
pub fn render_form<M: Model>(
    form: &FormConfiguration<M>,
    model: &M,
    dispatcher: &RenderDispatcher<M>,
    services: &Services,
    report: &ValidationReport,
    callbacks: &FieldCallbacks,
) -> RenderedForm {
    let fields = form
        .visible_fields(model)
        .map(|field| {
            let value = form.security().display_value(field, model, services);
            dispatcher.render_field(
                field,
                model,
                value,
                report.field_errors(field.name()),
                services,
                callbacks.clone(),
            )
        })
        .collect();

    let options = form.options();
    let summary = if options.show_validation_summary {
        report.summary()
    } else {
        Vec::new()
    };

    RenderedForm {
        name: form.name().to_string(),
        title: form.title().to_string(),
        description: options.description.clone(),
        columns: options.columns,
        has_required_fields: form.has_required_fields(model),
        has_encrypted_fields: form.has_encrypted_fields(),
        has_audited_fields: form.has_audited_fields(),
        fields,
        summary,
    }
}

/// Plain-text outline of a form, one line per visible field.
pub fn render_text<M: Model>(
    form: &FormConfiguration<M>,
    model: &M,
    services: &Services,
    report: &ValidationReport,
) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", form.title(), form.name()));
    if let Some(description) = &form.options().description {
        lines.push(description.clone());
    }

    for field in form.visible_fields(model) {
        let mut entry = format!(" - {} ({})", field.name(), field.label());
        if field.is_required(model) {
            entry.push_str(" [required]");
        }
        if field.is_read_only(model) || field.is_disabled(model) {
            entry.push_str(" [locked]");
        }
        let value = form.security().display_value(field, model, services);
        let shown = display_value(&value);
        if !shown.is_empty() {
            entry.push_str(&format!(" = {}", shown));
        }
        lines.push(entry);
        for message in report.field_errors(field.name()) {
            lines.push(format!("     ! {}", message));
        }
    }

    if report.valid {
        lines.push("No validation errors.".to_string());
    } else {
        lines.push(format!("Validation errors: {}", report.error_count()));
    }

    lines.join("\n")
}
