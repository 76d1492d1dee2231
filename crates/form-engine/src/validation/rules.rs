use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    error::BoxError,
    services::Services,
    validation::{ValidationOutcome, Validator},
    value::Model,
};

/// One message produced by an external rule set, addressed by property path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub property_path: String,
    pub message: String,
}

impl RuleViolation {
    pub fn new(property_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property_path: property_path.into(),
            message: message.into(),
        }
    }
}

/// Whole-model rule engine. Register as `Arc<dyn RuleSet<M>>` in [`Services`].
#[async_trait]
pub trait RuleSet<M: Model>: Send + Sync {
    async fn evaluate(&self, model: &M, services: &Services)
    -> Result<Vec<RuleViolation>, BoxError>;
}

/// Compares dotted property paths segment by segment, ignoring ASCII case and underscores.
pub fn paths_match(left: &str, right: &str) -> bool {
    fn normalized(segment: &str) -> impl Iterator<Item = char> + '_ {
        segment
            .chars()
            .filter(|ch| *ch != '_')
            .map(|ch| ch.to_ascii_lowercase())
    }

    let mut left_segments = left.split('.');
    let mut right_segments = right.split('.');
    loop {
        match (left_segments.next(), right_segments.next()) {
            (None, None) => return true,
            (Some(l), Some(r)) if normalized(l).eq(normalized(r)) => continue,
            _ => return false,
        }
    }
}

/// Adapter surfacing the messages a rule set reports for one property path.
pub struct RuleSetValidator<M: Model> {
    property_path: String,
    rule_set: Option<Arc<dyn RuleSet<M>>>,
    fault_message: String,
}

impl<M: Model> RuleSetValidator<M> {
    pub fn new(property_path: impl Into<String>, fault_message: impl Into<String>) -> Self {
        Self {
            property_path: property_path.into(),
            rule_set: None,
            fault_message: fault_message.into(),
        }
    }

    /// Uses this rule set instead of resolving one from [`Services`].
    pub fn with_rule_set(mut self, rule_set: Arc<dyn RuleSet<M>>) -> Self {
        self.rule_set = Some(rule_set);
        self
    }

    pub fn property_path(&self) -> &str {
        &self.property_path
    }

    fn resolve(&self, services: &Services) -> Option<Arc<dyn RuleSet<M>>> {
        self.rule_set
            .clone()
            .or_else(|| services.get::<Arc<dyn RuleSet<M>>>().cloned())
    }
}

#[async_trait]
impl<M: Model, T: Send + Sync + 'static> Validator<M, T> for RuleSetValidator<M> {
    async fn validate(&self, model: &M, value: &T, services: &Services) -> ValidationOutcome {
        let failures = Validator::<M, T>::failures(self, model, value, services).await;
        if failures.is_empty() {
            return ValidationOutcome::valid();
        }
        let message = failures
            .into_iter()
            .filter_map(|failure| failure.error_message)
            .collect::<Vec<_>>()
            .join("; ");
        ValidationOutcome::invalid(message)
    }

    async fn failures(&self, model: &M, _value: &T, services: &Services) -> Vec<ValidationOutcome> {
        let Some(rule_set) = self.resolve(services) else {
            trace!(path = %self.property_path, "no rule set registered; treating as valid");
            return Vec::new();
        };

        match rule_set.evaluate(model, services).await {
            Ok(violations) => violations
                .into_iter()
                .filter(|violation| paths_match(&violation.property_path, &self.property_path))
                .map(|violation| ValidationOutcome::invalid(violation.message))
                .collect(),
            Err(error) => {
                warn!(path = %self.property_path, %error, "rule set evaluation failed");
                vec![ValidationOutcome::invalid(self.fault_message.clone())]
            }
        }
    }
}
