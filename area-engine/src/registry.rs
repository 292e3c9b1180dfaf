//! Service registry: one lookup point from capability name to handler.
//!
//! Adapters are registered explicitly at startup. Capability names are global
//! across adapters, so the engine can resolve an Area's Action or Reaction by
//! name without knowing which adapter owns it.

use crate::adapter::{ActionPoller, ReactionInvoker, ServiceAdapter};
use area::store::{ActionDescriptor, CatalogStore, ReactionDescriptor, ServiceDescriptor};
use area::AreaError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// An Action handler with the metadata it was registered with.
#[derive(Clone)]
pub struct RegisteredAction {
    pub service: String,
    pub descriptor: ActionDescriptor,
    pub handler: Arc<dyn ActionPoller>,
}

#[derive(Clone)]
pub struct RegisteredReaction {
    pub service: String,
    pub descriptor: ReactionDescriptor,
    pub handler: Arc<dyn ReactionInvoker>,
}

#[derive(Default)]
pub struct ServiceRegistry {
    adapters: HashMap<String, Arc<dyn ServiceAdapter>>,
    actions: HashMap<String, RegisteredAction>,
    reactions: HashMap<String, RegisteredReaction>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every adapter, stopping at the first failure.
    pub fn with_adapters(
        adapters: impl IntoIterator<Item = Arc<dyn ServiceAdapter>>,
    ) -> Result<Self, AreaError> {
        let mut registry = Self::new();
        for adapter in adapters {
            registry.register(adapter)?;
        }
        Ok(registry)
    }

    /// Adds an adapter's capabilities to the name tables.
    ///
    /// A duplicate service or capability name is a programming error and is
    /// reported as `AlreadyExists`; the registry is left unchanged. Callers
    /// at startup treat it as fatal.
    pub fn register(&mut self, adapter: Arc<dyn ServiceAdapter>) -> Result<(), AreaError> {
        let service = adapter.service().name;
        if self.adapters.contains_key(&service) {
            return Err(AreaError::AlreadyExists(format!("service {}", service)));
        }

        let mut actions = Vec::new();
        let mut seen = HashSet::new();
        for descriptor in adapter.actions() {
            if self.actions.contains_key(&descriptor.name) || !seen.insert(descriptor.name.clone())
            {
                return Err(AreaError::AlreadyExists(format!("action {}", descriptor.name)));
            }
            let handler = adapter.action_handler(&descriptor.name).ok_or_else(|| {
                AreaError::Configuration(format!(
                    "{} declares action {} without a handler",
                    service, descriptor.name
                ))
            })?;
            actions.push(RegisteredAction {
                service: service.clone(),
                descriptor,
                handler,
            });
        }

        let mut reactions = Vec::new();
        let mut seen = HashSet::new();
        for descriptor in adapter.reactions() {
            if self.reactions.contains_key(&descriptor.name)
                || !seen.insert(descriptor.name.clone())
            {
                return Err(AreaError::AlreadyExists(format!("reaction {}", descriptor.name)));
            }
            let handler = adapter.reaction_handler(&descriptor.name).ok_or_else(|| {
                AreaError::Configuration(format!(
                    "{} declares reaction {} without a handler",
                    service, descriptor.name
                ))
            })?;
            reactions.push(RegisteredReaction {
                service: service.clone(),
                descriptor,
                handler,
            });
        }

        info!(
            service = %service,
            actions = actions.len(),
            reactions = reactions.len(),
            "Registered service adapter"
        );

        for action in actions {
            self.actions.insert(action.descriptor.name.clone(), action);
        }
        for reaction in reactions {
            self.reactions.insert(reaction.descriptor.name.clone(), reaction);
        }
        self.adapters.insert(service, adapter);
        Ok(())
    }

    pub fn resolve_action(&self, name: &str) -> Result<&RegisteredAction, AreaError> {
        self.actions
            .get(name)
            .ok_or_else(|| AreaError::NotFound(format!("action {}", name)))
    }

    pub fn resolve_reaction(&self, name: &str) -> Result<&RegisteredReaction, AreaError> {
        self.reactions
            .get(name)
            .ok_or_else(|| AreaError::NotFound(format!("reaction {}", name)))
    }

    pub fn adapter(&self, service: &str) -> Result<Arc<dyn ServiceAdapter>, AreaError> {
        self.adapters
            .get(service)
            .cloned()
            .ok_or_else(|| AreaError::NotFound(format!("service {}", service)))
    }

    /// Whether calls to `service` need a user credential.
    pub fn requires_oauth(&self, service: &str) -> Result<bool, AreaError> {
        Ok(self.adapter(service)?.oauth_config().is_some())
    }

    /// All registered services, sorted by name.
    pub fn list_services(&self) -> Vec<ServiceDescriptor> {
        let mut services: Vec<ServiceDescriptor> =
            self.adapters.values().map(|a| a.service()).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Writes Service/Action/Reaction reference rows (insert-if-absent).
    pub fn seed(&self, catalog: &CatalogStore) -> Result<(), AreaError> {
        for descriptor in self.list_services() {
            let service = catalog.save_service_if_absent(&descriptor)?;
            let adapter = self.adapter(&descriptor.name)?;
            for action in adapter.actions() {
                catalog.save_action_if_absent(service.id, &action)?;
            }
            for reaction in adapter.reactions() {
                catalog.save_reaction_if_absent(service.id, &reaction)?;
            }
        }
        info!(services = self.adapters.len(), "Catalog seeded");
        Ok(())
    }
}
