use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use crate::{error::ConfigError, field::ErasedField, services::Services, value::Model};

/// Field-level encryption. Register as `Arc<dyn EncryptionService>` in [`Services`].
pub trait EncryptionService: Send + Sync {
    fn encrypt(&self, plain_text: &str) -> Option<String>;
    fn decrypt(&self, cipher_text: &str) -> Option<String>;
}

/// Decrypts for display; input that does not decrypt is returned unchanged.
pub fn decrypt_or_original(service: &dyn EncryptionService, text: &str) -> String {
    service
        .decrypt(text)
        .unwrap_or_else(|| text.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Option<Duration>,
}

/// Attempt counter keyed by caller identifier. Register as `Arc<dyn RateLimitService>`.
pub trait RateLimitService: Send + Sync {
    fn check_limit(&self, identifier: &str, max_attempts: u32, window: Duration)
    -> RateLimitStatus;
    fn record_attempt(&self, identifier: &str);
}

/// Sliding-window limiter keeping attempt instants in memory.
#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops attempts older than `window` and forgets identifiers with none left.
    pub fn cleanup(&self, window: Duration) {
        let now = Instant::now();
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.retain(|_, instants| {
            instants.retain(|at| now.duration_since(*at) < window);
            !instants.is_empty()
        });
    }
}

impl RateLimitService for InMemoryRateLimiter {
    fn check_limit(
        &self,
        identifier: &str,
        max_attempts: u32,
        window: Duration,
    ) -> RateLimitStatus {
        let now = Instant::now();
        let attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let recent: Vec<Instant> = attempts
            .get(identifier)
            .map(|instants| {
                instants
                    .iter()
                    .copied()
                    .filter(|at| now.duration_since(*at) < window)
                    .collect()
            })
            .unwrap_or_default();

        let used = u32::try_from(recent.len()).unwrap_or(u32::MAX);
        if used < max_attempts {
            return RateLimitStatus {
                allowed: true,
                remaining: max_attempts - used,
                retry_after: None,
            };
        }
        let retry_after = recent
            .iter()
            .min()
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)));
        RateLimitStatus {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }

    fn record_attempt(&self, identifier: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(identifier.to_string())
            .or_default()
            .push(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    FieldChanged,
    FormSubmitted,
    SubmitRejected,
    ValidationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: AuditEventType,
    pub timestamp: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now(),
            field_name: None,
            old_value: None,
            new_value: None,
            data: Value::Null,
        }
    }

    pub fn field_change(field: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            field_name: Some(field.into()),
            old_value: Some(old_value),
            new_value: Some(new_value),
            ..Self::new(AuditEventType::FieldChanged)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Audit trail sink. Register as `Arc<dyn AuditLogService>` in [`Services`].
#[async_trait]
pub trait AuditLogService: Send + Sync {
    async fn log(&self, entry: AuditEntry);
}

/// Keeps entries in memory; useful for hosts without an audit backend and for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditLogService for MemoryAuditLog {
    async fn log(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

fn build_globs(patterns: &[String]) -> Result<Option<GlobSet>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ConfigError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|source| ConfigError::InvalidGlob {
            pattern: patterns.join(","),
            source,
        })
}

/// Which fields are encrypted at rest and which changes are audited.
///
/// Patterns are globs matched against a field's dotted path and its name,
/// e.g. `payment.*` or `ssn`.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    encrypt_patterns: Vec<String>,
    audit_patterns: Vec<String>,
    encrypted: Option<GlobSet>,
    audited: Option<GlobSet>,
}

impl SecurityPolicy {
    pub fn new(
        encrypt_patterns: Vec<String>,
        audit_patterns: Vec<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            encrypted: build_globs(&encrypt_patterns)?,
            audited: build_globs(&audit_patterns)?,
            encrypt_patterns,
            audit_patterns,
        })
    }

    pub fn encrypt_patterns(&self) -> &[String] {
        &self.encrypt_patterns
    }

    pub fn audit_patterns(&self) -> &[String] {
        &self.audit_patterns
    }

    pub fn encrypts(&self, path: &str) -> bool {
        matches_field(self.encrypted.as_ref(), path)
    }

    pub fn audits(&self, path: &str) -> bool {
        matches_field(self.audited.as_ref(), path)
    }

    /// Encrypts text values of encrypted fields when an [`EncryptionService`] is registered.
    pub fn protect(&self, path: &str, value: Value, services: &Services) -> Value {
        if !self.encrypts(path) {
            return value;
        }
        let Some(service) = services.get::<Arc<dyn EncryptionService>>() else {
            warn!(field = path, "field is marked encrypted but no encryption service is registered");
            return value;
        };
        match value {
            Value::String(plain) => match service.encrypt(&plain) {
                Some(cipher) => Value::String(cipher),
                None => {
                    warn!(field = path, "encryption failed; storing value unchanged");
                    Value::String(plain)
                }
            },
            other => other,
        }
    }

    /// Current value of a field as shown to the user, decrypted if needed.
    pub fn display_value<M: Model>(
        &self,
        field: &dyn ErasedField<M>,
        model: &M,
        services: &Services,
    ) -> Value {
        let value = field.get_value(model);
        if !self.encrypts(field.path()) {
            return value;
        }
        match (value, services.get::<Arc<dyn EncryptionService>>()) {
            (Value::String(cipher), Some(service)) => {
                Value::String(decrypt_or_original(service.as_ref(), &cipher))
            }
            (value, _) => value,
        }
    }
}

fn matches_field(globs: Option<&GlobSet>, path: &str) -> bool {
    let Some(globs) = globs else {
        return false;
    };
    let name = path.rsplit('.').next().unwrap_or(path);
    globs.is_match(path) || globs.is_match(name)
}
