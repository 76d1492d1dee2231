mod common;

use common::{Order, country_lov, order};
use form_engine::{
    ErasedField, FieldCallbacks, FormBuilder, FormConfiguration, ProducerInstances,
    RenderContext, RenderDispatcher, Services, UiProducer, ValidationReport, ValueKind,
    ValueType, accessor, render_form, render_text, render::FileUploadOptions,
};
use serde_json::{Value, json};

fn make_order_form() -> FormConfiguration<Order> {
    FormBuilder::new("order")
        .title("New order")
        .description("Tell us what to ship")
        .field(accessor!(Order, customer), |f| {
            f.label("Customer").placeholder("Full name").required().max_length(40)
        })
        .field(accessor!(Order, express), |f| f.label("Express delivery"))
        .field(accessor!(Order, total), |f| f.label("Total").min_value(0.0))
        .field(accessor!(Order, currency), |f| {
            f.label("Currency").options(["EUR", "GBP", "USD"])
        })
        .field(accessor!(Order, lines), |f| f.label("Lines"))
        .field(accessor!(Order, address), |f| f.label("Address"))
        .build()
        .expect("form")
}

fn render(form: &FormConfiguration<Order>, model: &Order, name: &str) -> Value {
    render_with(&RenderDispatcher::with_defaults(), form, model, name, &Services::new()).ui
}

fn render_with(
    dispatcher: &RenderDispatcher<Order>,
    form: &FormConfiguration<Order>,
    model: &Order,
    name: &str,
    services: &Services,
) -> form_engine::RenderedField {
    let field = form.field(name).expect("field");
    dispatcher.render_field(
        field,
        model,
        field.get_value(model),
        &[],
        services,
        FieldCallbacks::noop(),
    )
}

#[test]
fn built_in_producers_follow_the_value_type() {
    let form = make_order_form();
    let model = order("Ada");

    let customer = render(&form, &model, "customer");
    assert_eq!(customer["type"], "Input.Text");
    assert_eq!(customer["value"], "Ada");
    assert_eq!(customer["placeholder"], "Full name");
    assert_eq!(customer["maxLength"], 40);
    assert_eq!(customer["isRequired"], true);

    let express = render(&form, &model, "express");
    assert_eq!(express["type"], "Input.Toggle");
    assert_eq!(express["value"], "false");

    let total = render(&form, &model, "total");
    assert_eq!(total["type"], "Input.Number");
    assert_eq!(total["integer"], false);
    assert_eq!(total["min"], json!(0.0));

    let lines = render(&form, &model, "lines");
    assert_eq!(lines["type"], "Input.List");
    assert_eq!(lines["itemCount"], 0);
}

#[test]
fn options_render_as_a_choice_set() {
    let form = make_order_form();
    let currency = render(&form, &order("Ada"), "currency");
    assert_eq!(currency["type"], "Input.ChoiceSet");
    assert_eq!(currency["isMultiSelect"], false);
    assert_eq!(
        currency["choices"],
        json!([
            { "title": "EUR", "value": "EUR" },
            { "title": "GBP", "value": "GBP" },
            { "title": "USD", "value": "USD" },
        ])
    );
}

#[test]
fn file_upload_attribute_selects_the_file_widget() {
    let form = FormBuilder::new("upload")
        .field(accessor!(Order, customer), |f| {
            f.file_upload(FileUploadOptions {
                accept: vec![".pdf".into()],
                max_size_bytes: Some(1024),
                multiple: false,
            })
        })
        .build()
        .expect("form");
    let ui = render(&form, &Order::default(), "customer");
    assert_eq!(ui["type"], "Input.File");
    assert_eq!(ui["accept"], json!([".pdf"]));
    assert_eq!(ui["maxSizeBytes"], 1024);
}

#[test]
fn unsupported_types_render_a_diagnostic() {
    let form = make_order_form();
    let rendered = render_with(
        &RenderDispatcher::with_defaults(),
        &form,
        &Order::default(),
        "address",
        &Services::new(),
    );
    assert_eq!(rendered.producer, "diagnostic");
    assert_eq!(rendered.ui["type"], "Diagnostic");
    let message = rendered.ui["message"].as_str().expect("message");
    assert!(message.contains("Address"), "{message}");
    assert!(message.contains("'address'"), "{message}");
}

#[test]
fn empty_dispatcher_renders_everything_as_diagnostic() {
    let form = make_order_form();
    let rendered = render_with(
        &RenderDispatcher::empty(),
        &form,
        &Order::default(),
        "customer",
        &Services::new(),
    );
    assert_eq!(rendered.producer, "diagnostic");
}

#[derive(Default)]
struct StarRating;

impl UiProducer<Order> for StarRating {
    fn name(&self) -> &str {
        "star_rating"
    }

    fn accepts(&self, value_type: &ValueType) -> bool {
        value_type.kind().is_numeric()
    }

    fn can_render(&self, _value_type: &ValueType, _field: &dyn ErasedField<Order>) -> bool {
        false
    }

    fn render(&self, ctx: &RenderContext<'_, Order>) -> Value {
        let mut map = ctx.base("Input.Rating");
        map.insert("stars".into(), json!(5));
        Value::Object(map)
    }
}

#[test]
fn compatible_override_wins_over_standard_resolution() {
    let form = FormBuilder::new("rating")
        .field(accessor!(Order, total), |f| f.renderer::<StarRating>())
        .build()
        .expect("form");
    let rendered = render_with(
        &RenderDispatcher::with_defaults(),
        &form,
        &Order::default(),
        "total",
        &Services::new(),
    );
    assert_eq!(rendered.producer, "star_rating");
    assert_eq!(rendered.ui["stars"], 5);
}

#[test]
fn incompatible_override_falls_through_to_standard_resolution() {
    let form = FormBuilder::new("rating")
        .field(accessor!(Order, customer), |f| f.renderer::<StarRating>())
        .build()
        .expect("form");
    let rendered = render_with(
        &RenderDispatcher::with_defaults(),
        &form,
        &order("Ada"),
        "customer",
        &Services::new(),
    );
    assert_eq!(rendered.producer, "text");
    assert_eq!(rendered.ui["type"], "Input.Text");
}

struct BrandedToggle {
    brand: &'static str,
}

impl UiProducer<Order> for BrandedToggle {
    fn name(&self) -> &str {
        "branded_toggle"
    }

    fn accepts(&self, value_type: &ValueType) -> bool {
        value_type.kind() == ValueKind::Boolean
    }

    fn can_render(&self, _value_type: &ValueType, _field: &dyn ErasedField<Order>) -> bool {
        false
    }

    fn render(&self, ctx: &RenderContext<'_, Order>) -> Value {
        let mut map = ctx.base("Input.Toggle");
        map.insert("brand".into(), json!(self.brand));
        Value::Object(map)
    }
}

#[test]
fn registered_overrides_come_from_services() {
    let form = FormBuilder::new("branded")
        .field(accessor!(Order, express), |f| f.registered_renderer::<BrandedToggle>())
        .build()
        .expect("form");
    let dispatcher = RenderDispatcher::with_defaults();

    let unregistered = render_with(&dispatcher, &form, &Order::default(), "express", &Services::new());
    assert_eq!(unregistered.producer, "toggle");

    let services = Services::new()
        .with(ProducerInstances::<Order>::new().with(BrandedToggle { brand: "acme" }));
    let registered = render_with(&dispatcher, &form, &Order::default(), "express", &services);
    assert_eq!(registered.producer, "branded_toggle");
    assert_eq!(registered.ui["brand"], "acme");
}

#[test]
fn custom_producers_can_take_precedence() {
    let dispatcher = RenderDispatcher::<Order>::with_defaults().register_first(ShoutingText);
    assert_eq!(dispatcher.producer_names()[0], "shouting_text");
    let form = make_order_form();
    let rendered = render_with(&dispatcher, &form, &order("ada"), "customer", &Services::new());
    assert_eq!(rendered.ui["value"], "ADA");
}

struct ShoutingText;

impl UiProducer<Order> for ShoutingText {
    fn name(&self) -> &str {
        "shouting_text"
    }

    fn can_render(&self, value_type: &ValueType, _field: &dyn ErasedField<Order>) -> bool {
        value_type.kind() == ValueKind::String
    }

    fn render(&self, ctx: &RenderContext<'_, Order>) -> Value {
        let mut map = ctx.base("Input.Text");
        let text = ctx.value.as_str().unwrap_or_default().to_uppercase();
        map.insert("value".into(), json!(text));
        Value::Object(map)
    }
}

#[test]
fn lov_fields_render_as_pickers() {
    let form = FormBuilder::new("lov")
        .field(accessor!(Order, country), |f| {
            f.label("Country").lov(country_lov().modal_title("Pick a country"))
        })
        .field(accessor!(Order, currency), |f| f.label("Currency"))
        .build()
        .expect("form");
    let ui = render(&form, &Order::default(), "country");
    assert_eq!(ui["type"], "Input.Lov");
    assert_eq!(ui["modalTitle"], "Pick a country");
    assert_eq!(ui["selectionMode"], "single");
    assert_eq!(ui["pageSize"], 20);
    assert_eq!(ui["columns"][0]["field"], "code");
    assert_eq!(ui["mappedFields"], json!(["currency"]));
}

#[test]
fn render_form_lists_visible_fields_and_summary() {
    let form = FormBuilder::new("order")
        .title("New order")
        .field(accessor!(Order, customer), |f| f.label("Customer").required())
        .field(accessor!(Order, email), |f| {
            f.label("Email").visible_when(|order: &Order| order.express)
        })
        .build()
        .expect("form");
    let report = ValidationReport::from_errors(
        [("customer".to_string(), vec!["Customer is required".to_string()])]
            .into_iter()
            .collect(),
    );

    let rendered = render_form(
        &form,
        &Order::default(),
        &RenderDispatcher::with_defaults(),
        &Services::new(),
        &report,
        &FieldCallbacks::noop(),
    );
    assert_eq!(rendered.fields.len(), 1);
    assert!(rendered.has_required_fields);

    let json = rendered.to_json();
    assert_eq!(json["type"], "Form");
    assert_eq!(json["title"], "New order");
    assert_eq!(json["body"][0]["errors"], json!(["Customer is required"]));
    assert_eq!(
        json["validationSummary"],
        json!(["customer: Customer is required"])
    );
}

#[test]
fn render_text_outlines_the_form() {
    let form = make_order_form();
    let model = Order {
        express: true,
        ..order("Ada")
    };
    let report = ValidationReport::default();
    let text = render_text(&form, &model, &Services::new(), &report);

    assert!(text.starts_with("Form: New order (order)"));
    assert!(text.contains("Tell us what to ship"));
    assert!(text.contains(" - customer (Customer) [required] = Ada"));
    assert!(text.contains(" - express (Express delivery) = true"));
    assert!(text.ends_with("No validation errors."));
}

#[test]
fn producers_report_changes_through_callbacks() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let form = make_order_form();
    let model = order("Ada");
    let field = form.field("customer").expect("customer");
    let ctx = RenderContext {
        model: &model,
        field,
        value_type: field.value_type().clone(),
        value: field.get_value(&model),
        errors: &[],
        services: &Services::new(),
        callbacks: FieldCallbacks::channel(tx),
    };

    ctx.commit(json!("Grace"));
    ctx.notify_dependency_changed();

    let first = rx.try_recv().expect("value event");
    assert!(matches!(
        first,
        form_engine::FieldEvent::ValueChanged { ref field, ref value }
            if field == "customer" && value == "Grace"
    ));
    let second = rx.try_recv().expect("dependency event");
    assert!(matches!(
        second,
        form_engine::FieldEvent::DependencyChanged { ref field } if field == "customer"
    ));
}
