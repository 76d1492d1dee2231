use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDefinition {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortDefinition {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl FilterDefinition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Equals, value)
    }
}

/// One page request against a LOV data provider.
///
/// `context` carries the current values of the fields the lookup depends on,
/// keyed by each dependency's context key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LovQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    pub start_index: usize,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterDefinition>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl LovQuery {
    pub fn new(start_index: usize, count: usize) -> Self {
        Self {
            search_text: None,
            start_index,
            count,
            sort: Vec::new(),
            filters: Vec::new(),
            context: Map::new(),
        }
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    pub fn with_sort(mut self, sort: SortDefinition) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// One page of items plus the size of the whole filtered dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct LovDataResult<I> {
    pub items: Vec<I>,
    pub total_count: usize,
}

impl<I> Default for LovDataResult<I> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<I> LovDataResult<I> {
    pub fn new(items: Vec<I>, total_count: usize) -> Self {
        Self { items, total_count }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
        }
    }

    /// A page never exceeds the requested count nor the reported total.
    pub fn is_consistent(&self, query: &LovQuery) -> bool {
        self.items.len() <= query.count && self.total_count >= self.items.len()
    }
}
