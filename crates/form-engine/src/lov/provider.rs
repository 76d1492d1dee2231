use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    error::LovError,
    lov::query::{FilterDefinition, FilterOperator, LovDataResult, LovQuery, SortDirection},
    services::Services,
    value::{display_value, to_value},
};

/// Source of LOV items. Implementations should stop early once `cancel` fires.
#[async_trait]
pub trait LovDataProvider<I>: Send + Sync {
    async fn query(
        &self,
        query: &LovQuery,
        cancel: CancellationToken,
    ) -> Result<LovDataResult<I>, LovError>;
}

type QueryFn<I> = Arc<
    dyn Fn(LovQuery, CancellationToken) -> BoxFuture<'static, Result<LovDataResult<I>, LovError>>
        + Send
        + Sync,
>;

/// Adapts a closure returning a boxed future into a provider.
pub struct FnProvider<I> {
    query: QueryFn<I>,
}

impl<I> FnProvider<I> {
    pub fn new<F>(query: F) -> Self
    where
        F: Fn(LovQuery, CancellationToken) -> BoxFuture<'static, Result<LovDataResult<I>, LovError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            query: Arc::new(query),
        }
    }
}

#[async_trait]
impl<I: Send + Sync + 'static> LovDataProvider<I> for FnProvider<I> {
    async fn query(
        &self,
        query: &LovQuery,
        cancel: CancellationToken,
    ) -> Result<LovDataResult<I>, LovError> {
        (self.query)(query.clone(), cancel).await
    }
}

/// Serves a fixed item list, searching, filtering and sorting on each item's JSON form.
pub struct InMemoryProvider<I> {
    items: Vec<I>,
    search_fields: Vec<String>,
    match_context: bool,
}

impl<I: Serialize + Clone + Send + Sync + 'static> InMemoryProvider<I> {
    pub fn new(items: Vec<I>) -> Self {
        Self {
            items,
            search_fields: Vec::new(),
            match_context: false,
        }
    }

    /// Restricts free-text search to these properties; by default every text property is searched.
    pub fn search_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Treats each query context entry as an equality filter on the property of the same name.
    pub fn match_context(mut self) -> Self {
        self.match_context = true;
        self
    }

    fn matches_search(&self, projection: &Value, text: &str) -> bool {
        let needle = text.to_lowercase();
        let Value::Object(map) = projection else {
            return display_value(projection).to_lowercase().contains(&needle);
        };
        map.iter()
            .filter(|(key, _)| self.search_fields.is_empty() || self.search_fields.contains(key))
            .filter_map(|(_, value)| value.as_str())
            .any(|value| value.to_lowercase().contains(&needle))
    }

    fn matches_context(&self, projection: &Value, query: &LovQuery) -> bool {
        !self.match_context
            || query
                .context
                .iter()
                .all(|(key, expected)| match projection.get(key) {
                    Some(actual) => actual == expected,
                    None => true,
                })
    }
}

#[async_trait]
impl<I: Serialize + Clone + Send + Sync + 'static> LovDataProvider<I> for InMemoryProvider<I> {
    async fn query(
        &self,
        query: &LovQuery,
        cancel: CancellationToken,
    ) -> Result<LovDataResult<I>, LovError> {
        if cancel.is_cancelled() {
            return Err(LovError::Cancelled);
        }

        let search = query
            .search_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());

        let mut matching: Vec<(Value, &I)> = self
            .items
            .iter()
            .map(|item| (to_value(item), item))
            .filter(|(projection, _)| search.is_none_or(|text| self.matches_search(projection, text)))
            .filter(|(projection, _)| {
                query
                    .filters
                    .iter()
                    .all(|filter| filter_matches(projection, filter))
            })
            .filter(|(projection, _)| self.matches_context(projection, query))
            .collect();

        if !query.sort.is_empty() {
            matching.sort_by(|(left, _), (right, _)| {
                query
                    .sort
                    .iter()
                    .map(|sort| {
                        let ordering = compare_values(
                            left.get(&sort.field).unwrap_or(&Value::Null),
                            right.get(&sort.field).unwrap_or(&Value::Null),
                        );
                        match sort.direction {
                            SortDirection::Ascending => ordering,
                            SortDirection::Descending => ordering.reverse(),
                        }
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let total_count = matching.len();
        let items = matching
            .into_iter()
            .skip(query.start_index)
            .take(query.count)
            .map(|(_, item)| item.clone())
            .collect();
        Ok(LovDataResult::new(items, total_count))
    }
}

fn filter_matches(projection: &Value, filter: &FilterDefinition) -> bool {
    let actual = projection.get(&filter.field).unwrap_or(&Value::Null);
    match filter.operator {
        FilterOperator::Equals => actual == &filter.value,
        FilterOperator::NotEquals => actual != &filter.value,
        FilterOperator::Contains => display_value(actual)
            .to_lowercase()
            .contains(&display_value(&filter.value).to_lowercase()),
        FilterOperator::StartsWith => display_value(actual)
            .to_lowercase()
            .starts_with(&display_value(&filter.value).to_lowercase()),
        FilterOperator::GreaterThan => compare_values(actual, &filter.value) == Ordering::Greater,
        FilterOperator::LessThan => compare_values(actual, &filter.value) == Ordering::Less,
    }
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .zip(r.as_f64())
            .and_then(|(l, r)| l.partial_cmp(&r))
            .unwrap_or(Ordering::Equal),
        (Value::String(l), Value::String(r)) => l.to_lowercase().cmp(&r.to_lowercase()),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (l, r) => display_value(l).cmp(&display_value(r)),
    }
}

/// Named providers for one item type, registered in [`Services`].
pub struct LovRegistry<I> {
    providers: HashMap<String, Arc<dyn LovDataProvider<I>>>,
}

impl<I> Default for LovRegistry<I> {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }
}

impl<I> fmt::Debug for LovRegistry<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("LovRegistry").field("providers", &names).finish()
    }
}

impl<I> LovRegistry<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        name: impl Into<String>,
        provider: impl LovDataProvider<I> + 'static,
    ) -> Self {
        self.providers.insert(name.into(), Arc::new(provider));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LovDataProvider<I>>> {
        self.providers.get(name).cloned()
    }
}

/// Where a LOV gets its data: a provider instance or a provider registered by name.
pub enum LovSource<I> {
    Provider(Arc<dyn LovDataProvider<I>>),
    Named(String),
}

impl<I> Clone for LovSource<I> {
    fn clone(&self) -> Self {
        match self {
            LovSource::Provider(provider) => LovSource::Provider(Arc::clone(provider)),
            LovSource::Named(name) => LovSource::Named(name.clone()),
        }
    }
}

impl<I> fmt::Debug for LovSource<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LovSource::Provider(_) => f.write_str("Provider(..)"),
            LovSource::Named(name) => write!(f, "Named({name})"),
        }
    }
}

impl<I: 'static> LovSource<I> {
    pub fn provider(provider: impl LovDataProvider<I> + 'static) -> Self {
        LovSource::Provider(Arc::new(provider))
    }

    pub fn named(name: impl Into<String>) -> Self {
        LovSource::Named(name.into())
    }

    pub fn resolve(&self, services: &Services) -> Result<Arc<dyn LovDataProvider<I>>, LovError>
    where
        I: Send + Sync,
    {
        match self {
            LovSource::Provider(provider) => Ok(Arc::clone(provider)),
            LovSource::Named(name) => services
                .get::<LovRegistry<I>>()
                .and_then(|registry| registry.get(name))
                .ok_or_else(|| LovError::UnknownProvider(name.clone())),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            LovSource::Provider(_) => None,
            LovSource::Named(name) => Some(name),
        }
    }
}
