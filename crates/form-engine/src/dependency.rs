use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::error::{BoxError, DependencyError};

pub type DependencyCallback<M> = Arc<dyn Fn(&mut M) -> Result<(), BoxError> + Send + Sync>;

/// What happens to the target field when its source changes.
pub enum DependencyKind<M> {
    /// Recompute or clear the target by mutating the model.
    Update(DependencyCallback<M>),
    /// The model is untouched; the target only needs to refresh its UI state.
    Refresh,
}

impl<M> Clone for DependencyKind<M> {
    fn clone(&self) -> Self {
        match self {
            DependencyKind::Update(callback) => DependencyKind::Update(Arc::clone(callback)),
            DependencyKind::Refresh => DependencyKind::Refresh,
        }
    }
}

/// Reactive link from a source field to the field that depends on it.
pub struct Dependency<M> {
    source: String,
    target: String,
    kind: DependencyKind<M>,
}

impl<M> Clone for Dependency<M> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            target: self.target.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<M> fmt::Debug for Dependency<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DependencyKind::Update(_) => "update",
            DependencyKind::Refresh => "refresh",
        };
        f.debug_struct("Dependency")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("kind", &kind)
            .finish()
    }
}

impl<M> Dependency<M> {
    pub fn update(
        source: impl Into<String>,
        target: impl Into<String>,
        callback: impl Fn(&mut M) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: DependencyKind::Update(Arc::new(callback)),
        }
    }

    pub fn refresh(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: DependencyKind::Refresh,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> &DependencyKind<M> {
        &self.kind
    }
}

/// Record of one propagation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    /// `(source, target)` for every update callback, in invocation order.
    pub invoked: Vec<(String, String)>,
    /// Targets that asked for a UI refresh.
    pub refreshed: Vec<String>,
}

impl Propagation {
    pub fn is_empty(&self) -> bool {
        self.invoked.is_empty() && self.refreshed.is_empty()
    }

    /// Fields whose value may have changed, without duplicates.
    pub fn updated_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for (_, target) in &self.invoked {
            if !fields.contains(&target.as_str()) {
                fields.push(target.as_str());
            }
        }
        fields
    }

    pub fn merge(&mut self, other: Propagation) {
        self.invoked.extend(other.invoked);
        self.refreshed.extend(other.refreshed);
    }
}

/// Multi-map from a source field name to its dependents, in registration order.
///
/// Updates cascade: once a target is updated its own dependents fire. Cycles
/// are not rejected; the cascade stops with [`DependencyError::DepthExceeded`]
/// once it is `max_depth` levels deep.
pub struct DependencyGraph<M> {
    edges: BTreeMap<String, Vec<Dependency<M>>>,
    max_depth: usize,
}

impl<M> Default for DependencyGraph<M> {
    fn default() -> Self {
        Self::new(16)
    }
}

impl<M> fmt::Debug for DependencyGraph<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("edges", &self.edges)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl<M> DependencyGraph<M> {
    pub fn new(max_depth: usize) -> Self {
        Self {
            edges: BTreeMap::new(),
            max_depth,
        }
    }

    pub fn add(&mut self, dependency: Dependency<M>) {
        self.edges
            .entry(dependency.source.clone())
            .or_default()
            .push(dependency);
    }

    pub fn dependents(&self, source: &str) -> &[Dependency<M>] {
        self.edges.get(source).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Runs every dependency registered under `source` once, in order.
    ///
    /// Callback errors are returned as-is; whether they abort the surrounding
    /// operation is the caller's call.
    pub fn fire(&self, source: &str, model: &mut M) -> Result<Propagation, DependencyError> {
        let mut propagation = Propagation::default();
        self.fire_at(source, model, 0, &mut propagation)?;
        Ok(propagation)
    }

    fn fire_at(
        &self,
        source: &str,
        model: &mut M,
        depth: usize,
        propagation: &mut Propagation,
    ) -> Result<(), DependencyError> {
        let dependents = self.dependents(source);
        if dependents.is_empty() {
            return Ok(());
        }
        if depth >= self.max_depth {
            return Err(DependencyError::DepthExceeded {
                field: source.to_string(),
                depth,
            });
        }

        for dependency in dependents {
            match &dependency.kind {
                DependencyKind::Refresh => {
                    propagation.refreshed.push(dependency.target.clone());
                }
                DependencyKind::Update(callback) => {
                    callback(model).map_err(|cause| DependencyError::Callback {
                        source_field: dependency.source.clone(),
                        target: dependency.target.clone(),
                        cause,
                    })?;
                    propagation
                        .invoked
                        .push((dependency.source.clone(), dependency.target.clone()));
                    self.fire_at(&dependency.target, model, depth + 1, propagation)?;
                }
            }
        }
        Ok(())
    }
}
