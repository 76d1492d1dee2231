use std::{collections::BTreeSet, fmt, sync::Arc};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    accessor::Accessor,
    dependency::DependencyGraph,
    error::ConfigError,
    field::{ErasedField, FieldBuilder, FieldDescriptor},
    lov::LovConfig,
    messages::MessageCatalog,
    security::SecurityPolicy,
    settings::EngineSettings,
    value::{FieldValue, Model},
};

/// Layout and display flags of a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FormOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub show_validation_summary: bool,
    #[serde(default)]
    pub validate_hidden_fields: bool,
    #[serde(default = "default_columns")]
    pub columns: u8,
}

fn default_true() -> bool {
    true
}

fn default_columns() -> u8 {
    1
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            show_validation_summary: true,
            validate_hidden_fields: false,
            columns: default_columns(),
        }
    }
}

type PendingField<M> =
    Box<dyn FnOnce(&Arc<MessageCatalog>) -> Result<Box<dyn ErasedField<M>>, ConfigError> + Send>;

/// Collects field definitions and validates them into a [`FormConfiguration`].
pub struct FormBuilder<M: Model> {
    name: String,
    options: FormOptions,
    messages: Option<Arc<MessageCatalog>>,
    max_dependency_depth: Option<usize>,
    encrypt_patterns: Vec<String>,
    audit_patterns: Vec<String>,
    fields: Vec<PendingField<M>>,
}

impl<M: Model> FormBuilder<M> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: FormOptions::default(),
            messages: None,
            max_dependency_depth: None,
            encrypt_patterns: Vec::new(),
            audit_patterns: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.options.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.options.description = Some(description.into());
        self
    }

    pub fn options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    pub fn messages(mut self, messages: MessageCatalog) -> Self {
        self.messages = Some(Arc::new(messages));
        self
    }

    pub fn max_dependency_depth(mut self, depth: usize) -> Self {
        self.max_dependency_depth = Some(depth);
        self
    }

    /// Applies the engine-wide settings that shape a configuration.
    pub fn settings(self, settings: &EngineSettings) -> Self {
        self.max_dependency_depth(settings.max_dependency_depth)
    }

    pub fn encrypt_fields<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.encrypt_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn audit_fields<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.audit_patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Adds a field for `accessor`, configured by `configure`.
    pub fn field<T: FieldValue>(
        self,
        accessor: Accessor<M, T>,
        configure: impl FnOnce(FieldBuilder<M, T>) -> FieldBuilder<M, T>,
    ) -> Self {
        self.add(configure(FieldBuilder::new(accessor)))
    }

    pub fn add<T: FieldValue>(mut self, field: FieldBuilder<M, T>) -> Self {
        self.fields.push(Box::new(move |messages: &Arc<MessageCatalog>| {
            field
                .finish(messages)
                .map(|typed| Box::new(typed) as Box<dyn ErasedField<M>>)
        }));
        self
    }

    /// Fails on the first configuration mistake: invalid field settings,
    /// duplicate names, dependencies on unknown fields, or bad security globs.
    pub fn build(self) -> Result<FormConfiguration<M>, ConfigError> {
        let messages = self.messages.unwrap_or_default();
        let security = SecurityPolicy::new(self.encrypt_patterns, self.audit_patterns)?;

        let mut fields = Vec::with_capacity(self.fields.len());
        let mut names = BTreeSet::new();
        for pending in self.fields {
            let field = pending(&messages)?;
            if !names.insert(field.name().to_string()) {
                return Err(ConfigError::DuplicateField(field.name().to_string()));
            }
            fields.push(field);
        }

        let mut dependencies =
            DependencyGraph::new(self.max_dependency_depth.unwrap_or(DEFAULT_MAX_DEPTH));
        for field in &fields {
            for dependency in field.dependencies() {
                if !names.contains(dependency.source()) {
                    return Err(ConfigError::UnknownDependencySource {
                        field: field.name().to_string(),
                        depends_on: dependency.source().to_string(),
                    });
                }
                dependencies.add(dependency.clone());
            }
        }

        // stable: equal orders keep declaration order
        fields.sort_by_key(|field| field.order());

        Ok(FormConfiguration {
            name: self.name,
            options: self.options,
            fields,
            dependencies,
            security,
            messages,
        })
    }
}

const DEFAULT_MAX_DEPTH: usize = 16;

/// A validated form: ordered fields, dependency graph and security policy.
pub struct FormConfiguration<M: Model> {
    name: String,
    options: FormOptions,
    fields: Vec<Box<dyn ErasedField<M>>>,
    dependencies: DependencyGraph<M>,
    security: SecurityPolicy,
    messages: Arc<MessageCatalog>,
}

impl<M: Model> FormConfiguration<M> {
    pub fn builder(name: impl Into<String>) -> FormBuilder<M> {
        FormBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured title, or the form name.
    pub fn title(&self) -> &str {
        self.options.title.as_deref().unwrap_or(&self.name)
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    /// Fields in display order.
    pub fn fields(&self) -> impl Iterator<Item = &dyn ErasedField<M>> {
        self.fields.iter().map(|field| field.as_ref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&dyn ErasedField<M>> {
        self.fields().find(|field| field.name() == name)
    }

    /// Mutable access for runtime visibility, disabled and read-only changes.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut (dyn ErasedField<M> + 'static)> {
        self.fields
            .iter_mut()
            .find(|field| field.name() == name)
            .map(|field| field.as_mut())
    }

    /// The strongly typed descriptor behind field `name`, if it holds a `T`.
    pub fn typed<T: FieldValue>(&self, name: &str) -> Option<&FieldDescriptor<M, T>> {
        self.field(name)?.downcast::<T>()
    }

    pub fn visible_fields<'a>(&'a self, model: &'a M) -> impl Iterator<Item = &'a dyn ErasedField<M>> {
        self.fields().filter(move |field| field.is_visible(model))
    }

    pub fn dependencies(&self) -> &DependencyGraph<M> {
        &self.dependencies
    }

    /// Caps dependency cascades of the built configuration.
    pub fn set_max_dependency_depth(&mut self, depth: usize) {
        self.dependencies.set_max_depth(depth);
    }

    pub fn security(&self) -> &SecurityPolicy {
        &self.security
    }

    pub fn messages(&self) -> &Arc<MessageCatalog> {
        &self.messages
    }

    /// The LOV configuration of field `name` with item type `I`.
    pub fn lov<I: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<LovConfig<M, I>>, ConfigError> {
        let field = self
            .field(name)
            .ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
        let binding = field
            .lov()
            .ok_or_else(|| ConfigError::LovTypeMismatch(name.to_string()))?;
        Arc::clone(binding)
            .into_any()
            .downcast::<LovConfig<M, I>>()
            .map_err(|_| ConfigError::LovTypeMismatch(name.to_string()))
    }

    pub fn lov_fields(&self) -> impl Iterator<Item = &dyn ErasedField<M>> {
        self.fields().filter(|field| field.lov().is_some())
    }

    pub fn has_required_fields(&self, model: &M) -> bool {
        self.fields().any(|field| field.is_required(model))
    }

    pub fn has_encrypted_fields(&self) -> bool {
        self.fields()
            .any(|field| self.security.encrypts(field.path()))
    }

    pub fn has_audited_fields(&self) -> bool {
        self.fields().any(|field| self.security.audits(field.path()))
    }
}

impl<M: Model> fmt::Debug for FormConfiguration<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().map(|field| field.name()).collect();
        f.debug_struct("FormConfiguration")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("fields", &fields)
            .field("dependencies", &self.dependencies)
            .field("security", &self.security)
            .finish()
    }
}
