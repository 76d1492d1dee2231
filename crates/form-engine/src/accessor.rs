use std::{fmt, sync::Arc};

use crate::error::ConfigError;

type Getter<M, T> = Arc<dyn Fn(&M) -> T + Send + Sync>;
type Setter<M, T> = Arc<dyn Fn(&mut M, T) + Send + Sync>;

/// Compiled reference to one (possibly nested) model property.
///
/// The dotted path is parsed once when the accessor is created; reads and
/// writes go straight through the stored closures.
pub struct Accessor<M, T> {
    path: String,
    name: String,
    get: Getter<M, T>,
    set: Setter<M, T>,
}

impl<M, T> Clone for Accessor<M, T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            name: self.name.clone(),
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<M, T> fmt::Debug for Accessor<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("path", &self.path)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<M, T> Accessor<M, T> {
    /// Builds an accessor from a runtime path. Fails unless every segment is an identifier.
    pub fn new(
        path: impl Into<String>,
        get: impl Fn(&M) -> T + Send + Sync + 'static,
        set: impl Fn(&mut M, T) + Send + Sync + 'static,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let name = last_segment(&path)?;
        Ok(Self {
            path,
            name,
            get: Arc::new(get),
            set: Arc::new(set),
        })
    }

    /// Used by [`accessor!`](crate::accessor), whose path the compiler already checked.
    #[doc(hidden)]
    pub fn compiled(
        path: &'static str,
        get: impl Fn(&M) -> T + Send + Sync + 'static,
        set: impl Fn(&mut M, T) + Send + Sync + 'static,
    ) -> Self {
        let name = path.rsplit('.').next().unwrap_or(path).to_string();
        Self {
            path: path.to_string(),
            name,
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    /// Full dotted path, e.g. `address.street`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment; this is the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, model: &M) -> T {
        (self.get)(model)
    }

    pub fn set(&self, model: &mut M, value: T) {
        (self.set)(model, value)
    }
}

impl<M, T: Default> Accessor<M, T> {
    pub fn reset(&self, model: &mut M) {
        (self.set)(model, T::default())
    }
}

fn last_segment(path: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAccessorPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }

    let mut last = None;
    for segment in path.split('.') {
        let mut chars = segment.chars();
        let valid_start = chars
            .next()
            .is_some_and(|ch| ch.is_alphabetic() || ch == '_');
        if !valid_start || !chars.all(|ch| ch.is_alphanumeric() || ch == '_') {
            return Err(invalid(&format!("'{segment}' is not a property name")));
        }
        last = Some(segment);
    }

    last.map(str::to_string)
        .ok_or_else(|| invalid("path has no segments"))
}

/// Creates an [`Accessor`] for a (nested) property of a model type.
///
/// ```ignore
/// let street = accessor!(Customer, address.street);
/// assert_eq!(street.name(), "street");
/// ```
#[macro_export]
macro_rules! accessor {
    ($model:ty, $first:ident $(. $rest:ident)*) => {
        $crate::accessor::Accessor::<$model, _>::compiled(
            concat!(stringify!($first) $(, ".", stringify!($rest))*),
            |model: &$model| model.$first $(.$rest)* .clone(),
            |model: &mut $model, value| model.$first $(.$rest)* = value,
        )
    };
}
