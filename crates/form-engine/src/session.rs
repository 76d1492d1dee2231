use std::{sync::Arc, time::Duration};

use serde_json::{Value, json};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use crate::{
    dependency::Propagation,
    error::SessionError,
    form::FormConfiguration,
    lov::{LovBinding, LovController, SelectionOutcome},
    render::{
        FieldCallbacks, FieldEvent, RenderDispatcher, RenderedField, RenderedForm, render_form,
        render_text,
    },
    security::{AuditEntry, AuditEventType, AuditLogService, RateLimitService},
    services::Services,
    settings::{DependencyFaultPolicy, EngineSettings},
    validation::{
        ValidationReport, pipeline::should_validate, validate_form, validate_form_field,
    },
    value::Model,
};

/// What a committed value change touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub propagation: Propagation,
    /// Fields re-validated because of this change (validate-on-change only).
    pub revalidated: Vec<String>,
}

/// Result of a LOV selection change made through a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LovChange {
    pub selection: SelectionOutcome,
    pub propagation: Propagation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Invalid(ValidationReport),
    RateLimited { retry_after: Option<Duration> },
}

/// Owns one model being edited against a form configuration.
///
/// Every change goes through [`commit`](Self::commit): lock check, encryption,
/// audit, dependency propagation and, when enabled, re-validation of the
/// touched fields.
pub struct FormSession<M: Model> {
    config: FormConfiguration<M>,
    model: M,
    services: Services,
    dispatcher: RenderDispatcher<M>,
    settings: EngineSettings,
    report: ValidationReport,
    events_tx: UnboundedSender<FieldEvent>,
    events_rx: UnboundedReceiver<FieldEvent>,
}

impl<M: Model> FormSession<M> {
    pub fn new(config: FormConfiguration<M>, model: M) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let dispatcher = RenderDispatcher::with_defaults().with_messages(Arc::clone(config.messages()));
        let settings = EngineSettings::default();
        let mut services = Services::new();
        services.insert(settings.lov);
        Self {
            config,
            model,
            services,
            dispatcher,
            settings,
            report: ValidationReport::default(),
            events_tx,
            events_rx,
        }
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self.services.insert(self.settings.lov);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: RenderDispatcher<M>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Replaces the engine settings; the dependency depth limit applies to this session's form.
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.services.insert(settings.lov);
        self.config
            .set_max_dependency_depth(settings.max_dependency_depth);
        self.settings = settings;
        self
    }

    pub fn config(&self) -> &FormConfiguration<M> {
        &self.config
    }

    /// Runtime flag changes (visibility, disabled, read-only) go through here.
    pub fn config_mut(&mut self) -> &mut FormConfiguration<M> {
        &mut self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Direct model access; dependencies do not fire for changes made here.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Writes `value` to field `name` and propagates the change.
    ///
    /// Under [`DependencyFaultPolicy::Propagate`] a failing dependency is
    /// returned as an error; the committed value itself stays in the model.
    pub async fn commit(&mut self, name: &str, value: Value) -> Result<CommitOutcome, SessionError> {
        let field = self
            .config
            .field(name)
            .ok_or_else(|| SessionError::UnknownField(name.to_string()))?;
        if field.is_read_only(&self.model) || field.is_disabled(&self.model) {
            return Err(SessionError::FieldLocked(name.to_string()));
        }

        let security = self.config.security();
        let old_value = field.get_value(&self.model);
        let stored = security.protect(field.path(), value, &self.services);
        field.set_value(&mut self.model, stored);

        if security.audits(field.path())
            && let Some(audit) = self.services.get::<Arc<dyn AuditLogService>>()
        {
            let new_value = field.get_value(&self.model);
            audit
                .log(AuditEntry::field_change(name, old_value, new_value))
                .await;
        }

        let propagation = self.propagate(name)?;
        let mut outcome = CommitOutcome {
            propagation,
            revalidated: Vec::new(),
        };
        if self.settings.validate_on_change {
            let mut touched = vec![name.to_string()];
            for updated in outcome.propagation.updated_fields() {
                if !touched.iter().any(|field| field == updated) {
                    touched.push(updated.to_string());
                }
            }
            for field in &touched {
                self.revalidate(field).await;
            }
            outcome.revalidated = touched;
        }
        Ok(outcome)
    }

    /// Fires the dependents of `name` without changing its value.
    pub fn notify_dependency_changed(&mut self, name: &str) -> Result<Propagation, SessionError> {
        if self.config.field(name).is_none() {
            return Err(SessionError::UnknownField(name.to_string()));
        }
        self.propagate(name)
    }

    fn propagate(&mut self, name: &str) -> Result<Propagation, SessionError> {
        match self.config.dependencies().fire(name, &mut self.model) {
            Ok(propagation) => Ok(propagation),
            Err(error) => match self.settings.dependency_faults {
                DependencyFaultPolicy::Propagate => Err(error.into()),
                DependencyFaultPolicy::Log => {
                    warn!(field = name, %error, "dependency propagation failed");
                    Ok(Propagation::default())
                }
            },
        }
    }

    async fn revalidate(&mut self, name: &str) {
        let Some(field) = self.config.field(name) else {
            return;
        };
        let messages = if should_validate(&self.config, field, &self.model) {
            validate_form_field(&self.config, field, &self.model, &self.services).await
        } else {
            Vec::new()
        };
        self.report.set_field_errors(name, messages);
    }

    /// Callbacks for producers; events queue up until [`process_events`](Self::process_events).
    pub fn callbacks(&self) -> FieldCallbacks {
        FieldCallbacks::channel(self.events_tx.clone())
    }

    /// Applies queued widget events in order and returns the fields they touched.
    pub async fn process_events(&mut self) -> Result<Vec<String>, SessionError> {
        let mut touched = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                FieldEvent::ValueChanged { field, value } => {
                    let outcome = self.commit(&field, value).await?;
                    touched.push(field);
                    touched.extend(
                        outcome
                            .propagation
                            .updated_fields()
                            .into_iter()
                            .map(str::to_string),
                    );
                }
                FieldEvent::DependencyChanged { field } => {
                    let propagation = self.notify_dependency_changed(&field)?;
                    touched.extend(propagation.refreshed);
                }
            }
        }
        debug!(touched = touched.len(), "processed field events");
        Ok(touched)
    }

    pub fn render(&self) -> RenderedForm {
        render_form(
            &self.config,
            &self.model,
            &self.dispatcher,
            &self.services,
            &self.report,
            &self.callbacks(),
        )
    }

    pub fn render_field(&self, name: &str) -> Result<RenderedField, SessionError> {
        let field = self
            .config
            .field(name)
            .ok_or_else(|| SessionError::UnknownField(name.to_string()))?;
        let value = self
            .config
            .security()
            .display_value(field, &self.model, &self.services);
        Ok(self.dispatcher.render_field(
            field,
            &self.model,
            value,
            self.report.field_errors(name),
            &self.services,
            self.callbacks(),
        ))
    }

    pub fn render_text(&self) -> String {
        render_text(&self.config, &self.model, &self.services, &self.report)
    }

    pub async fn validate(&mut self) -> ValidationReport {
        self.report = validate_form(&self.config, &self.model, &self.services).await;
        self.report.clone()
    }

    pub async fn validate_field(&mut self, name: &str) -> Result<Vec<String>, SessionError> {
        if self.config.field(name).is_none() {
            return Err(SessionError::UnknownField(name.to_string()));
        }
        self.revalidate(name).await;
        Ok(self.report.field_errors(name).to_vec())
    }

    /// Rate-limit check, full validation and audit, in that order.
    pub async fn submit(&mut self, identifier: &str) -> SubmitOutcome {
        if let Some(limit) = self.settings.submit_limit
            && let Some(limiter) = self.services.get::<Arc<dyn RateLimitService>>()
        {
            let status = limiter.check_limit(identifier, limit.max_attempts, limit.window());
            if !status.allowed {
                self.audit(
                    AuditEntry::new(AuditEventType::SubmitRejected)
                        .with_data(json!({ "identifier": identifier })),
                )
                .await;
                return SubmitOutcome::RateLimited {
                    retry_after: status.retry_after,
                };
            }
            limiter.record_attempt(identifier);
        }

        let report = self.validate().await;
        if !report.valid {
            self.audit(
                AuditEntry::new(AuditEventType::ValidationFailed)
                    .with_data(json!({ "identifier": identifier, "errors": report.errors })),
            )
            .await;
            return SubmitOutcome::Invalid(report);
        }

        self.audit(
            AuditEntry::new(AuditEventType::FormSubmitted)
                .with_data(json!({ "identifier": identifier, "form": self.config.name() })),
        )
        .await;
        SubmitOutcome::Accepted
    }

    async fn audit(&self, entry: AuditEntry) {
        if !self.config.has_audited_fields() {
            return;
        }
        if let Some(audit) = self.services.get::<Arc<dyn AuditLogService>>() {
            audit.log(entry).await;
        }
    }

    /// Selects a LOV item, then propagates every field the selection changed.
    pub async fn select_lov<I: Clone + Send + Sync + 'static>(
        &mut self,
        controller: &mut LovController<M, I>,
        item: I,
    ) -> Result<LovChange, SessionError> {
        self.ensure_unlocked(controller.config().field_name())?;
        let selection = controller
            .select(&mut self.model, item, &self.services)
            .await;
        let propagation = self.propagate_all(&selection.changed).await?;
        Ok(LovChange {
            selection,
            propagation,
        })
    }

    /// Clears a LOV selection and its mapped fields, then propagates.
    pub async fn clear_lov<I: Clone + Send + Sync + 'static>(
        &mut self,
        controller: &mut LovController<M, I>,
    ) -> Result<Propagation, SessionError> {
        self.ensure_unlocked(controller.config().field_name())?;
        let changed = controller.clear(&mut self.model);
        self.propagate_all(&changed).await
    }

    fn ensure_unlocked(&self, name: Option<&str>) -> Result<(), SessionError> {
        let Some(name) = name else {
            return Ok(());
        };
        match self.config.field(name) {
            Some(field) if field.is_read_only(&self.model) || field.is_disabled(&self.model) => {
                Err(SessionError::FieldLocked(name.to_string()))
            }
            Some(_) => Ok(()),
            None => Err(SessionError::UnknownField(name.to_string())),
        }
    }

    async fn propagate_all(&mut self, changed: &[String]) -> Result<Propagation, SessionError> {
        let mut propagation = Propagation::default();
        for name in changed {
            propagation.merge(self.propagate(name)?);
        }
        if self.settings.validate_on_change {
            let mut touched: Vec<String> = changed.to_vec();
            for updated in propagation.updated_fields() {
                if !touched.iter().any(|field| field == updated) {
                    touched.push(updated.to_string());
                }
            }
            for name in &touched {
                self.revalidate(name).await;
            }
        }
        Ok(propagation)
    }
}
