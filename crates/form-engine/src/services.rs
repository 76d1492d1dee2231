use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

/// Type-keyed registry handed to validators, producers and LOV providers.
///
/// Trait objects are registered by their `Arc<dyn Trait>` type, e.g.
/// `services.insert::<Arc<dyn RuleSet<Order>>>(rules)`.
#[derive(Clone, Default)]
pub struct Services {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: Vec<&'static str>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Any + Send + Sync>(mut self, service: S) -> Self {
        self.insert(service);
        self
    }

    pub fn insert<S: Any + Send + Sync>(&mut self, service: S) {
        if self
            .entries
            .insert(TypeId::of::<S>(), Arc::new(service))
            .is_none()
        {
            self.names.push(type_name::<S>());
        }
    }

    pub fn get<S: Any + Send + Sync>(&self) -> Option<&S> {
        self.entries
            .get(&TypeId::of::<S>())
            .and_then(|entry| entry.downcast_ref::<S>())
    }

    pub fn contains<S: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<S>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("registered", &self.names)
            .finish()
    }
}
