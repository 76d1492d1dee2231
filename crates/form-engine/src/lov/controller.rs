use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{ConfigError, LovError},
    form::FormConfiguration,
    lov::{
        config::{LovBinding, LovConfig, MappingKind, SelectionMode},
        query::{FilterDefinition, LovDataResult, LovQuery, SortDefinition, SortDirection},
    },
    services::Services,
    settings::LovSettings,
    validation::builtin::panic_message,
    value::Model,
};

/// A query issued by a [`LovController`] but not yet executed.
///
/// Run it (possibly on another task) and hand the completion back to
/// [`LovController::apply`]; completions of superseded queries are discarded.
#[derive(Debug)]
pub struct PendingQuery<M: Model, I> {
    generation: u64,
    query: LovQuery,
    debounce: Duration,
    cancel: CancellationToken,
    config: Arc<LovConfig<M, I>>,
}

/// Result of running a [`PendingQuery`].
#[derive(Debug)]
pub struct QueryCompletion<I> {
    pub generation: u64,
    pub query: LovQuery,
    pub result: Result<LovDataResult<I>, LovError>,
}

impl<M: Model, I: Send + Sync + 'static> PendingQuery<M, I> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query(&self) -> &LovQuery {
        &self.query
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Waits out the debounce delay, then asks the provider for the page.
    pub async fn run(self, services: &Services) -> QueryCompletion<I> {
        let result = self.fetch(services).await;
        QueryCompletion {
            generation: self.generation,
            query: self.query,
            result,
        }
    }

    async fn fetch(&self, services: &Services) -> Result<LovDataResult<I>, LovError> {
        if !self.debounce.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(LovError::Cancelled),
                _ = tokio::time::sleep(self.debounce) => {}
            }
        }
        if self.cancel.is_cancelled() {
            return Err(LovError::Cancelled);
        }

        let provider = self.config.source().resolve(services)?;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LovError::Cancelled),
            result = provider.query(&self.query, self.cancel.clone()) => result?,
        };

        if !result.is_consistent(&self.query) {
            warn!(
                items = result.items.len(),
                count = self.query.count,
                total = result.total_count,
                "LOV provider returned an inconsistent page"
            );
            return Err(LovError::InconsistentPage {
                items: result.items.len(),
                count: self.query.count,
                total: result.total_count,
            });
        }
        Ok(result)
    }
}

/// What [`LovController::apply`] did with a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer query was issued after this one; nothing changed.
    Superseded,
    /// The query failed; the item list is now empty and the message is in `last_error`.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFailure {
    pub target: String,
    pub message: String,
}

/// Fields touched by a selection change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    /// The LOV field itself first, then every mapped target that was written.
    pub changed: Vec<String>,
    pub failures: Vec<MappingFailure>,
}

/// Per-field LOV state: current page, search, sort, filters and selection.
pub struct LovController<M: Model, I> {
    config: Arc<LovConfig<M, I>>,
    settings: LovSettings,
    items: Vec<I>,
    total_count: usize,
    selected: Vec<I>,
    search_text: Option<String>,
    start_index: usize,
    sort: Vec<SortDefinition>,
    filters: Vec<FilterDefinition>,
    generation: u64,
    cancel: CancellationToken,
    loading: bool,
    last_error: Option<String>,
}

impl<M: Model, I: Clone + Send + Sync + 'static> LovController<M, I> {
    pub fn new(config: Arc<LovConfig<M, I>>, settings: LovSettings) -> Self {
        Self {
            config,
            settings,
            items: Vec::new(),
            total_count: 0,
            selected: Vec::new(),
            search_text: None,
            start_index: 0,
            sort: Vec::new(),
            filters: Vec::new(),
            generation: 0,
            cancel: CancellationToken::new(),
            loading: false,
            last_error: None,
        }
    }

    /// Controller for the LOV configured on field `name`.
    pub fn for_field(
        form: &FormConfiguration<M>,
        name: &str,
        settings: LovSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(form.lov::<I>(name)?, settings))
    }

    pub fn config(&self) -> &Arc<LovConfig<M, I>> {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.config
            .options()
            .page_size
            .unwrap_or(self.settings.page_size)
            .max(1)
    }

    pub fn debounce(&self) -> Duration {
        self.config
            .options()
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.settings.debounce())
    }

    pub fn items(&self) -> &[I] {
        &self.items
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn selected(&self) -> &[I] {
        &self.selected
    }

    pub fn search_text(&self) -> Option<&str> {
        self.search_text.as_deref()
    }

    pub fn page_index(&self) -> usize {
        self.start_index / self.page_size()
    }

    pub fn page_count(&self) -> usize {
        self.total_count.div_ceil(self.page_size())
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// First page with the current search, sort and filters.
    pub fn open(&mut self, model: &M) -> PendingQuery<M, I> {
        self.start_index = 0;
        self.issue(model, Duration::ZERO)
    }

    /// Debounced; text shorter than the minimum search length searches nothing.
    pub fn search(&mut self, text: impl Into<String>, model: &M) -> PendingQuery<M, I> {
        let text = text.into();
        let min = self.config.options().min_search_length;
        self.search_text = (text.trim().chars().count() >= min.max(1)).then_some(text);
        self.start_index = 0;
        let debounce = self.debounce();
        self.issue(model, debounce)
    }

    pub fn page(&mut self, page_index: usize, model: &M) -> PendingQuery<M, I> {
        self.start_index = page_index.saturating_mul(self.page_size());
        self.issue(model, Duration::ZERO)
    }

    pub fn sort(
        &mut self,
        field: impl Into<String>,
        direction: SortDirection,
        model: &M,
    ) -> PendingQuery<M, I> {
        self.sort = vec![SortDefinition {
            field: field.into(),
            direction,
        }];
        self.start_index = 0;
        self.issue(model, Duration::ZERO)
    }

    pub fn filter(&mut self, filters: Vec<FilterDefinition>, model: &M) -> PendingQuery<M, I> {
        self.filters = filters;
        self.start_index = 0;
        self.issue(model, Duration::ZERO)
    }

    fn issue(&mut self, model: &M, debounce: Duration) -> PendingQuery<M, I> {
        self.supersede();
        self.loading = true;

        let query = LovQuery {
            search_text: self.search_text.clone(),
            start_index: self.start_index,
            count: self.page_size(),
            sort: self.sort.clone(),
            filters: self.filters.clone(),
            context: self.config.query_context(model),
        };
        PendingQuery {
            generation: self.generation,
            query,
            debounce,
            cancel: self.cancel.clone(),
            config: Arc::clone(&self.config),
        }
    }

    pub fn apply(&mut self, completion: QueryCompletion<I>) -> ApplyOutcome {
        if completion.generation != self.generation {
            debug!(
                generation = completion.generation,
                current = self.generation,
                "discarding superseded LOV result"
            );
            return ApplyOutcome::Superseded;
        }

        match completion.result {
            Ok(page) => {
                self.loading = false;
                self.items = page.items;
                self.total_count = page.total_count;
                self.last_error = None;
                ApplyOutcome::Applied
            }
            Err(LovError::Cancelled) => {
                debug!(generation = completion.generation, "LOV query cancelled");
                ApplyOutcome::Superseded
            }
            Err(error) => {
                warn!(%error, "LOV query failed");
                let message = error.to_string();
                self.loading = false;
                self.items.clear();
                self.total_count = 0;
                self.last_error = Some(message.clone());
                ApplyOutcome::Failed(message)
            }
        }
    }

    /// Issues, runs and applies a query for the current state without debounce.
    pub async fn refresh(&mut self, model: &M, services: &Services) -> ApplyOutcome {
        let pending = self.issue(model, Duration::ZERO);
        let completion = pending.run(services).await;
        self.apply(completion)
    }

    /// Selects `item`: writes the field and then every mapping, in declaration order.
    pub async fn select(&mut self, model: &mut M, item: I, services: &Services) -> SelectionOutcome {
        let value = self.config.value_of(&item);
        match self.config.selection_mode() {
            SelectionMode::Single => self.selected = vec![item.clone()],
            SelectionMode::Multiple => {
                if !self
                    .selected
                    .iter()
                    .any(|selected| self.config.value_of(selected) == value)
                {
                    self.selected.push(item.clone());
                }
            }
        }

        let mut outcome = SelectionOutcome::default();
        if let Some(name) = self.write_field(model) {
            outcome.changed.push(name);
        }

        for mapping in self.config.mappings() {
            let result = match &mapping.kind {
                MappingKind::Sync(apply) => {
                    std::panic::catch_unwind(AssertUnwindSafe(|| apply(model, &item)))
                        .unwrap_or_else(|panic| Err(panic_message(panic.as_ref()).into()))
                }
                MappingKind::Async { compute, apply } => {
                    match AssertUnwindSafe(compute(&item, services)).catch_unwind().await {
                        Ok(Ok(mapped)) => {
                            apply(model, mapped);
                            Ok(())
                        }
                        Ok(Err(error)) => Err(error),
                        Err(panic) => Err(panic_message(panic.as_ref()).into()),
                    }
                }
            };
            match result {
                Ok(()) => outcome.changed.push(mapping.target().to_string()),
                Err(error) => {
                    warn!(target_field = mapping.target(), %error, "LOV field mapping failed");
                    outcome.failures.push(MappingFailure {
                        target: mapping.target().to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Removes one item (by value) from a multiple selection.
    pub fn deselect(&mut self, model: &mut M, value: &Value) -> Vec<String> {
        let before = self.selected.len();
        let config = Arc::clone(&self.config);
        self.selected.retain(|item| &config.value_of(item) != value);
        if self.selected.len() == before {
            return Vec::new();
        }
        self.write_field(model).into_iter().collect()
    }

    /// Empties the selection and resets the field and every mapped target.
    pub fn clear(&mut self, model: &mut M) -> Vec<String> {
        self.selected.clear();
        let mut changed = Vec::new();
        if let Some(hook) = self.config.field_hook() {
            (hook.reset)(model);
            changed.push(hook.name.clone());
        }
        self.config.clear_mapped(model);
        changed.extend(
            self.config
                .mapped_targets()
                .into_iter()
                .map(str::to_string),
        );
        changed
    }

    /// Clears when `parent` is a clear-on-change dependency; any in-flight query is cancelled.
    pub fn on_dependency_changed(&mut self, parent: &str, model: &mut M) -> Vec<String> {
        let clears = self
            .config
            .dependencies()
            .iter()
            .any(|dependency| dependency.field == parent && dependency.clear_on_change);
        if !clears {
            return Vec::new();
        }
        self.supersede();
        self.loading = false;
        self.items.clear();
        self.total_count = 0;
        self.start_index = 0;
        self.clear(model)
    }

    /// Cancels the in-flight query; completions issued before this point no longer apply.
    fn supersede(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
    }

    fn write_field(&self, model: &mut M) -> Option<String> {
        let hook = self.config.field_hook()?;
        let value = match self.config.selection_mode() {
            SelectionMode::Single => self
                .selected
                .first()
                .map(|item| self.config.value_of(item))
                .unwrap_or(Value::Null),
            SelectionMode::Multiple => Value::Array(
                self.selected
                    .iter()
                    .map(|item| self.config.value_of(item))
                    .collect(),
            ),
        };
        (hook.set)(model, value);
        Some(hook.name.clone())
    }
}
