mod common;

use std::sync::Arc;

use common::{Order, order};
use form_engine::{
    AuditEventType, AuditLogService, EncryptionService, EngineSettings, FormBuilder,
    FormConfiguration, FormSession, InMemoryRateLimiter, MemoryAuditLog, RateLimitService,
    Services, SessionError, SubmitLimit, SubmitOutcome, accessor,
};
use serde_json::json;

fn make_checkout_form() -> FormConfiguration<Order> {
    FormBuilder::new("checkout")
        .title("Checkout")
        .field(accessor!(Order, customer), |f| {
            f.label("Customer").required().min_length(2)
        })
        .field(accessor!(Order, email), |f| f.label("Email").required())
        .field(accessor!(Order, country), |f| f.label("Country"))
        .field(accessor!(Order, currency), |f| {
            f.label("Currency")
                .computed_from("country", |order: &Order| match order.country.as_str() {
                    "" => String::new(),
                    "GB" => "GBP".to_string(),
                    _ => "EUR".to_string(),
                })
                .required()
        })
        .field(accessor!(Order, card_number), |f| {
            f.label("Card number").attribute("secret", true)
        })
        .field(accessor!(Order, state), |f| f.label("State").read_only(true))
        .encrypt_fields(["card_*"])
        .audit_fields(["email", "card_number"])
        .build()
        .expect("checkout form")
}

/// Reversible stand-in for a real cipher.
struct Rot13;

impl Rot13 {
    fn rotate(text: &str) -> String {
        text.chars()
            .map(|ch| match ch {
                'a'..='m' | 'A'..='M' => (ch as u8 + 13) as char,
                'n'..='z' | 'N'..='Z' => (ch as u8 - 13) as char,
                other => other,
            })
            .collect()
    }
}

impl EncryptionService for Rot13 {
    fn encrypt(&self, plain_text: &str) -> Option<String> {
        Some(format!("enc:{}", Self::rotate(plain_text)))
    }

    fn decrypt(&self, cipher_text: &str) -> Option<String> {
        cipher_text.strip_prefix("enc:").map(Self::rotate)
    }
}

struct Harness {
    session: FormSession<Order>,
    audit: Arc<MemoryAuditLog>,
}

fn harness(settings: EngineSettings) -> Harness {
    let audit = Arc::new(MemoryAuditLog::new());
    let audit_service: Arc<dyn AuditLogService> = audit.clone();
    let encryption: Arc<dyn EncryptionService> = Arc::new(Rot13);
    let limiter: Arc<dyn RateLimitService> = Arc::new(InMemoryRateLimiter::new());
    let services = Services::new()
        .with(audit_service)
        .with(encryption)
        .with(limiter);
    let session = FormSession::new(make_checkout_form(), order("Ada"))
        .with_settings(settings)
        .with_services(services);
    Harness { session, audit }
}

fn valid_order() -> Order {
    Order {
        email: "ada@example.com".into(),
        country: "GB".into(),
        currency: "GBP".into(),
        ..order("Ada")
    }
}

#[tokio::test]
async fn commit_writes_the_model_and_propagates() {
    let Harness { mut session, .. } = harness(EngineSettings::default());
    let outcome = session
        .commit("country", json!("GB"))
        .await
        .expect("commit");

    assert_eq!(session.model().country, "GB");
    assert_eq!(session.model().currency, "GBP");
    assert_eq!(outcome.propagation.updated_fields(), vec!["currency"]);
    assert_eq!(outcome.revalidated, vec!["country", "currency"]);
}

#[tokio::test]
async fn unknown_and_locked_fields_are_rejected() {
    let Harness { mut session, .. } = harness(EngineSettings::default());

    let unknown = session.commit("nickname", json!("x")).await;
    assert!(matches!(unknown, Err(SessionError::UnknownField(name)) if name == "nickname"));

    let locked = session.commit("state", json!("BY")).await;
    assert!(matches!(locked, Err(SessionError::FieldLocked(name)) if name == "state"));
    assert_eq!(session.model().state, "");
}

#[tokio::test]
async fn validate_on_change_refreshes_only_touched_fields() {
    let Harness { mut session, .. } = harness(EngineSettings::default());
    session.validate().await;
    assert_eq!(
        session.report().field_errors("email"),
        ["Email is required".to_string()]
    );
    assert!(!session.report().field_errors("currency").is_empty());

    session
        .commit("customer", json!("A"))
        .await
        .expect("commit");
    assert_eq!(
        session.report().field_errors("customer"),
        ["Customer must be at least 2 characters".to_string()]
    );
    assert_eq!(
        session.report().field_errors("email"),
        ["Email is required".to_string()]
    );

    session
        .commit("country", json!("FR"))
        .await
        .expect("commit");
    assert!(session.report().field_errors("currency").is_empty());
    assert!(!session.report().valid);
}

#[tokio::test]
async fn validation_can_wait_for_submit() {
    let Harness { mut session, .. } = harness(EngineSettings {
        validate_on_change: false,
        ..EngineSettings::default()
    });
    let outcome = session
        .commit("customer", json!("A"))
        .await
        .expect("commit");
    assert!(outcome.revalidated.is_empty());
    assert!(session.report().valid);

    let messages = session.validate_field("customer").await.expect("field");
    assert_eq!(messages, vec!["Customer must be at least 2 characters"]);
}

#[tokio::test]
async fn encrypted_fields_are_stored_encrypted_and_shown_decrypted() {
    let Harness { mut session, .. } = harness(EngineSettings::default());
    session
        .commit("card_number", json!("4111 abc"))
        .await
        .expect("commit");

    assert_eq!(session.model().card_number, "enc:4111 nop");
    let rendered = session.render_field("card_number").expect("render");
    assert_eq!(rendered.ui["value"], "4111 abc");
    assert_eq!(rendered.ui["style"], "password");
    assert!(session.render_text().contains("card_number (Card number) = 4111 abc"));
    assert!(session.render().has_encrypted_fields);
}

#[tokio::test]
async fn encrypted_fields_are_validated_in_plain_text() {
    let form = FormBuilder::new("payment")
        .field(accessor!(Order, card_number), |f| {
            f.label("Card number").pattern(r"^\d{4}$").max_length(4)
        })
        .encrypt_fields(["card_number"])
        .build()
        .expect("payment form");
    let encryption: Arc<dyn EncryptionService> = Arc::new(Rot13);
    let mut session = FormSession::new(form, Order::default())
        .with_services(Services::new().with(encryption));

    let outcome = session
        .commit("card_number", json!("1234"))
        .await
        .expect("commit");
    assert_eq!(outcome.revalidated, vec!["card_number"]);
    assert_eq!(session.model().card_number, "enc:1234");
    assert!(session.report().field_errors("card_number").is_empty());
    assert!(session.validate().await.valid);

    session
        .commit("card_number", json!("12345"))
        .await
        .expect("commit");
    assert_eq!(
        session.report().field_errors("card_number"),
        [
            "Card number has an invalid format".to_string(),
            "Card number must be at most 4 characters".to_string(),
        ]
    );
}

#[tokio::test]
async fn encryption_without_a_service_keeps_the_value() {
    let mut session = FormSession::new(make_checkout_form(), Order::default());
    session
        .commit("card_number", json!("4111"))
        .await
        .expect("commit");
    assert_eq!(session.model().card_number, "4111");
}

#[tokio::test]
async fn audited_field_changes_are_logged() {
    let Harness { mut session, audit } = harness(EngineSettings::default());
    session
        .commit("customer", json!("Grace"))
        .await
        .expect("commit");
    assert!(audit.entries().is_empty());

    session
        .commit("email", json!("grace@example.com"))
        .await
        .expect("commit");
    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, AuditEventType::FieldChanged);
    assert_eq!(entries[0].field_name.as_deref(), Some("email"));
    assert_eq!(entries[0].old_value, Some(json!("")));
    assert_eq!(entries[0].new_value, Some(json!("grace@example.com")));
}

#[tokio::test]
async fn widget_events_are_applied_in_order() {
    let Harness { mut session, .. } = harness(EngineSettings::default());
    let callbacks = session.callbacks();
    callbacks.value_changed("country", json!("FR"));
    callbacks.value_changed("customer", json!("Grace"));
    callbacks.dependency_changed("customer");

    let touched = session.process_events().await.expect("events");
    assert_eq!(touched, vec!["country", "currency", "customer"]);
    assert_eq!(session.model().currency, "EUR");
    assert_eq!(session.model().customer, "Grace");

    callbacks.value_changed("state", json!("IDF"));
    let locked = session.process_events().await;
    assert!(matches!(locked, Err(SessionError::FieldLocked(_))));
}

#[tokio::test]
async fn invalid_submissions_return_the_report() {
    let Harness { mut session, audit } = harness(EngineSettings::default());
    match session.submit("user-1").await {
        SubmitOutcome::Invalid(report) => {
            assert!(!report.valid);
            assert_eq!(report.field_errors("email"), ["Email is required".to_string()]);
        }
        other => panic!("expected invalid submission, got {other:?}"),
    }
    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, AuditEventType::ValidationFailed);
    assert_eq!(entries[0].data["identifier"], "user-1");
}

#[tokio::test(start_paused = true)]
async fn submissions_are_rate_limited_per_identifier() {
    let Harness { mut session, audit } = harness(EngineSettings {
        submit_limit: Some(SubmitLimit {
            max_attempts: 2,
            window_secs: 60,
        }),
        ..EngineSettings::default()
    });
    *session.model_mut() = valid_order();

    assert_eq!(session.submit("user-1").await, SubmitOutcome::Accepted);
    assert_eq!(session.submit("user-1").await, SubmitOutcome::Accepted);
    match session.submit("user-1").await {
        SubmitOutcome::RateLimited { retry_after } => {
            let retry_after = retry_after.expect("retry hint");
            assert!(retry_after.as_secs() <= 60);
        }
        other => panic!("expected rate limiting, got {other:?}"),
    }
    assert_eq!(session.submit("user-2").await, SubmitOutcome::Accepted);

    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    assert_eq!(session.submit("user-1").await, SubmitOutcome::Accepted);

    let kinds: Vec<AuditEventType> = audit.entries().iter().map(|entry| entry.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            AuditEventType::FormSubmitted,
            AuditEventType::FormSubmitted,
            AuditEventType::SubmitRejected,
            AuditEventType::FormSubmitted,
            AuditEventType::FormSubmitted,
        ]
    );
}

#[tokio::test]
async fn runtime_flag_changes_affect_rendering_and_commits() {
    let Harness { mut session, .. } = harness(EngineSettings::default());
    let before = session.render().fields.len();

    session
        .config_mut()
        .field_mut("card_number")
        .expect("card")
        .set_visible(form_engine::Flag::Fixed(false));
    assert_eq!(session.render().fields.len(), before - 1);

    session
        .config_mut()
        .field_mut("customer")
        .expect("customer")
        .set_read_only(form_engine::Flag::Fixed(true));
    let result = session.commit("customer", json!("Eve")).await;
    assert!(matches!(result, Err(SessionError::FieldLocked(_))));
    assert_eq!(session.into_model().customer, "Ada");
}
