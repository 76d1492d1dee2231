pub mod builtin;
pub mod collection;
pub mod pipeline;
pub mod rules;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{services::Services, value::Model};

pub use builtin::{
    AsyncPredicate, AsyncPredicateValidator, ConditionalValidator, MaxLengthValidator,
    MinLengthValidator, PatternValidator, PredicateValidator, RangeValidator, RequiredValidator,
};
pub use collection::{CollectionRules, CollectionValidator};
pub use pipeline::{
    ValidationReport, validate_field, validate_form, validate_form_field, validate_item,
    validate_value,
};
pub use rules::{RuleSet, RuleSetValidator, RuleViolation, paths_match};

/// Result of running one validator. A failure may come without a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error_message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
        }
    }

    pub fn invalid_without_message() -> Self {
        Self {
            is_valid: false,
            error_message: None,
        }
    }
}

/// Checks one field value, with the whole model available for cross-field rules.
#[async_trait]
pub trait Validator<M: Model, T: Send + Sync + 'static>: Send + Sync {
    async fn validate(&self, model: &M, value: &T, services: &Services) -> ValidationOutcome;

    /// Every failing outcome; validators that report several violations override this.
    async fn failures(&self, model: &M, value: &T, services: &Services) -> Vec<ValidationOutcome> {
        let outcome = self.validate(model, value, services).await;
        if outcome.is_valid {
            Vec::new()
        } else {
            vec![outcome]
        }
    }
}
