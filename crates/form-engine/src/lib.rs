#![allow(missing_docs)]

pub mod accessor;
pub mod dependency;
pub mod error;
pub mod field;
pub mod form;
pub mod lov;
pub mod messages;
pub mod render;
pub mod security;
pub mod services;
pub mod session;
pub mod settings;
pub mod validation;
pub mod value;

pub use accessor::Accessor;
pub use dependency::{Dependency, DependencyGraph, DependencyKind, Propagation};
pub use error::{BoxError, ConfigError, DependencyError, LovError, SessionError};
pub use field::{ErasedField, FieldBuilder, FieldDescriptor, Flag, TypedField};
pub use form::{FormBuilder, FormConfiguration, FormOptions};
pub use lov::{
    ApplyOutcome, FilterDefinition, FilterOperator, FnProvider, InMemoryProvider, LovBinding,
    LovColumn, LovConfig, LovController, LovDataProvider, LovDataResult, LovQuery, LovRegistry,
    LovSource, SelectionMode, SortDefinition, SortDirection,
};
pub use messages::MessageCatalog;
pub use render::{
    FieldCallbacks, FieldEvent, ProducerInstances, RenderContext, RenderDispatcher,
    RenderedField, RenderedForm, RendererOverride, UiProducer, render_form, render_text,
};
pub use security::{
    AuditEntry, AuditEventType, AuditLogService, EncryptionService, InMemoryRateLimiter,
    MemoryAuditLog, RateLimitService, RateLimitStatus, SecurityPolicy,
};
pub use services::Services;
pub use session::{CommitOutcome, FormSession, LovChange, SubmitOutcome};
pub use settings::{DependencyFaultPolicy, EngineSettings, LovSettings, SubmitLimit};
pub use validation::{
    CollectionRules, RuleSet, RuleViolation, ValidationOutcome, ValidationReport, Validator,
    validate_form,
};
pub use value::{FieldValue, Model, ValueKind, ValueType};
