use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DependencyGraph, Service};
use crate::domain::ports::ServiceShim;

/// Binds every service of a graph to the shim that executes it.
#[derive(Default, Clone)]
pub struct ShimRegistry {
    shims: BTreeMap<Service, Arc<dyn ServiceShim>>,
}

impl ShimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `service` to `shim`, replacing any earlier binding.
    pub fn register(&mut self, service: Service, shim: Arc<dyn ServiceShim>) -> &mut Self {
        self.shims.insert(service, shim);
        self
    }

    #[must_use]
    pub fn with(mut self, service: impl Into<Service>, shim: Arc<dyn ServiceShim>) -> Self {
        self.shims.insert(service.into(), shim);
        self
    }

    pub fn get(&self, service: &Service) -> Option<&dyn ServiceShim> {
        self.shims.get(service).map(AsRef::as_ref)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.shims.keys()
    }

    /// Every service in `graph` must have a shim.
    pub fn validate(&self, graph: &DependencyGraph) -> DomainResult<()> {
        match graph.services().find(|s| !self.shims.contains_key(*s)) {
            Some(missing) => Err(DomainError::MissingShim(missing.clone())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ShimRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.shims.iter().map(|(s, shim)| (s.as_str(), shim.name())))
            .finish()
    }
}
