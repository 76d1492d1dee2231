use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use async_trait::async_trait;
use futures::{FutureExt, future::BoxFuture};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    error::BoxError,
    services::Services,
    validation::{ValidationOutcome, Validator},
    value::{Model, is_blank, to_value},
};

/// Fails on null, blank text, `false` and empty sequences.
#[derive(Debug, Clone)]
pub struct RequiredValidator {
    message: String,
}

impl RequiredValidator {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl<M: Model, T: Serialize + Send + Sync + 'static> Validator<M, T> for RequiredValidator {
    async fn validate(&self, _model: &M, value: &T, _services: &Services) -> ValidationOutcome {
        if is_blank(&to_value(value)) {
            ValidationOutcome::invalid(self.message.clone())
        } else {
            ValidationOutcome::valid()
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Minimum character count for text, item count for sequences. Null passes.
#[derive(Debug, Clone)]
pub struct MinLengthValidator {
    min: usize,
    message: String,
}

impl MinLengthValidator {
    pub fn new(min: usize, message: impl Into<String>) -> Self {
        Self {
            min,
            message: message.into(),
        }
    }
}

#[async_trait]
impl<M: Model, T: Serialize + Send + Sync + 'static> Validator<M, T> for MinLengthValidator {
    async fn validate(&self, _model: &M, value: &T, _services: &Services) -> ValidationOutcome {
        match length_of(&to_value(value)) {
            Some(len) if len < self.min => ValidationOutcome::invalid(self.message.clone()),
            _ => ValidationOutcome::valid(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaxLengthValidator {
    max: usize,
    message: String,
}

impl MaxLengthValidator {
    pub fn new(max: usize, message: impl Into<String>) -> Self {
        Self {
            max,
            message: message.into(),
        }
    }
}

#[async_trait]
impl<M: Model, T: Serialize + Send + Sync + 'static> Validator<M, T> for MaxLengthValidator {
    async fn validate(&self, _model: &M, value: &T, _services: &Services) -> ValidationOutcome {
        match length_of(&to_value(value)) {
            Some(len) if len > self.max => ValidationOutcome::invalid(self.message.clone()),
            _ => ValidationOutcome::valid(),
        }
    }
}

/// Regex match for text values. Empty text is left to [`RequiredValidator`].
#[derive(Debug, Clone)]
pub struct PatternValidator {
    regex: Regex,
    message: String,
}

impl PatternValidator {
    pub fn new(regex: Regex, message: impl Into<String>) -> Self {
        Self {
            regex,
            message: message.into(),
        }
    }
}

#[async_trait]
impl<M: Model, T: Serialize + Send + Sync + 'static> Validator<M, T> for PatternValidator {
    async fn validate(&self, _model: &M, value: &T, _services: &Services) -> ValidationOutcome {
        match to_value(value) {
            Value::String(text) if !text.is_empty() && !self.regex.is_match(&text) => {
                ValidationOutcome::invalid(self.message.clone())
            }
            _ => ValidationOutcome::valid(),
        }
    }
}

/// Inclusive numeric bounds.
#[derive(Debug, Clone)]
pub struct RangeValidator {
    min: Option<f64>,
    max: Option<f64>,
    below_message: String,
    above_message: String,
}

impl RangeValidator {
    pub fn new(
        min: Option<f64>,
        max: Option<f64>,
        below_message: impl Into<String>,
        above_message: impl Into<String>,
    ) -> Self {
        Self {
            min,
            max,
            below_message: below_message.into(),
            above_message: above_message.into(),
        }
    }
}

#[async_trait]
impl<M: Model, T: Serialize + Send + Sync + 'static> Validator<M, T> for RangeValidator {
    async fn validate(&self, _model: &M, value: &T, _services: &Services) -> ValidationOutcome {
        let Some(number) = to_value(value).as_f64() else {
            return ValidationOutcome::valid();
        };
        if self.min.is_some_and(|min| number < min) {
            return ValidationOutcome::invalid(self.below_message.clone());
        }
        if self.max.is_some_and(|max| number > max) {
            return ValidationOutcome::invalid(self.above_message.clone());
        }
        ValidationOutcome::valid()
    }
}

type Predicate<M, T> = Arc<dyn Fn(&M, &T) -> Result<bool, BoxError> + Send + Sync>;

/// Caller-supplied synchronous check. Errors and panics count as failures.
pub struct PredicateValidator<M, T> {
    predicate: Predicate<M, T>,
    message: String,
}

impl<M, T> PredicateValidator<M, T> {
    pub fn new(
        message: impl Into<String>,
        predicate: impl Fn(&M, &T) -> Result<bool, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            message: message.into(),
        }
    }
}

#[async_trait]
impl<M: Model, T: Send + Sync + 'static> Validator<M, T> for PredicateValidator<M, T> {
    async fn validate(&self, model: &M, value: &T, _services: &Services) -> ValidationOutcome {
        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(model, value))) {
            Ok(Ok(true)) => ValidationOutcome::valid(),
            Ok(Ok(false)) => ValidationOutcome::invalid(self.message.clone()),
            Ok(Err(error)) => {
                warn!(%error, "validator predicate failed");
                ValidationOutcome::invalid(self.message.clone())
            }
            Err(panic) => {
                warn!(panic = %panic_message(panic.as_ref()), "validator predicate panicked");
                ValidationOutcome::invalid(self.message.clone())
            }
        }
    }
}

pub type AsyncPredicate<M, T> = Arc<
    dyn for<'a> Fn(&'a M, &'a T, &'a Services) -> BoxFuture<'a, Result<bool, BoxError>>
        + Send
        + Sync,
>;

/// Caller-supplied asynchronous check. Errors and panics count as failures.
pub struct AsyncPredicateValidator<M, T> {
    predicate: AsyncPredicate<M, T>,
    message: String,
}

impl<M, T> AsyncPredicateValidator<M, T> {
    pub fn new<F>(message: impl Into<String>, predicate: F) -> Self
    where
        F: for<'a> Fn(&'a M, &'a T, &'a Services) -> BoxFuture<'a, Result<bool, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            message: message.into(),
        }
    }
}

#[async_trait]
impl<M: Model, T: Send + Sync + 'static> Validator<M, T> for AsyncPredicateValidator<M, T> {
    async fn validate(&self, model: &M, value: &T, services: &Services) -> ValidationOutcome {
        let started = catch_unwind(AssertUnwindSafe(|| {
            (self.predicate)(model, value, services)
        }));
        let result = match started {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };
        match result {
            Ok(Ok(true)) => ValidationOutcome::valid(),
            Ok(Ok(false)) => ValidationOutcome::invalid(self.message.clone()),
            Ok(Err(error)) => {
                warn!(%error, "async validator failed");
                ValidationOutcome::invalid(self.message.clone())
            }
            Err(panic) => {
                warn!(panic = %panic_message(panic.as_ref()), "async validator panicked");
                ValidationOutcome::invalid(self.message.clone())
            }
        }
    }
}

/// Runs the inner validator only while the condition holds.
pub struct ConditionalValidator<M: Model, T: Send + Sync + 'static> {
    condition: Arc<dyn Fn(&M) -> bool + Send + Sync>,
    inner: Arc<dyn Validator<M, T>>,
}

impl<M: Model, T: Send + Sync + 'static> ConditionalValidator<M, T> {
    pub fn new(
        condition: Arc<dyn Fn(&M) -> bool + Send + Sync>,
        inner: Arc<dyn Validator<M, T>>,
    ) -> Self {
        Self { condition, inner }
    }
}

#[async_trait]
impl<M: Model, T: Send + Sync + 'static> Validator<M, T> for ConditionalValidator<M, T> {
    async fn validate(&self, model: &M, value: &T, services: &Services) -> ValidationOutcome {
        if (self.condition)(model) {
            self.inner.validate(model, value, services).await
        } else {
            ValidationOutcome::valid()
        }
    }

    async fn failures(&self, model: &M, value: &T, services: &Services) -> Vec<ValidationOutcome> {
        if (self.condition)(model) {
            self.inner.failures(model, value, services).await
        } else {
            Vec::new()
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|text| text.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
