//! In-process agent registry: O(1) registration, lookup, and listing over a
//! `DashMap` keyed by agent name.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain_types::AgentName;
use crate::orchestrator::traits::{
    AgentDescriptor, AgentRegistry, CapabilityFilter, RegistryError, ServiceLocator,
};

/// Default in-process implementation of [`AgentRegistry`].
#[derive(Default)]
pub struct InProcessAgentRegistry {
    agents: DashMap<AgentName, AgentDescriptor>,
}

impl InProcessAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRegistry for InProcessAgentRegistry {
    async fn register(&self, descriptor: AgentDescriptor) -> Result<(), RegistryError> {
        if self.agents.contains_key(&descriptor.name) {
            return Err(RegistryError::AlreadyRegistered {
                name: descriptor.name.to_string(),
            });
        }
        debug!(agent = %descriptor.name, "registering agent");
        self.agents.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    async fn unregister(&self, name: &AgentName) -> Result<(), RegistryError> {
        if self.agents.remove(name).is_none() {
            warn!(agent = %name, "attempted to unregister unknown agent");
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, name: &AgentName) -> Option<AgentDescriptor> {
        self.agents.get(name).map(|entry| entry.value().clone())
    }

    async fn list(&self) -> Vec<AgentDescriptor> {
        self.agents.iter().map(|entry| entry.value().clone()).collect()
    }

    async fn find_by_capability(&self, filter: CapabilityFilter) -> Vec<AgentDescriptor> {
        self.agents
            .iter()
            .filter(|entry| filter.matches(entry.value().capabilities))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Default [`ServiceLocator`]: resolves a keyed transport's key directly
/// against the registry's own name index.
pub struct RegistryServiceLocator {
    registry: Arc<dyn AgentRegistry>,
}

impl RegistryServiceLocator {
    pub fn new(registry: Arc<dyn AgentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ServiceLocator for RegistryServiceLocator {
    async fn resolve(&self, key: &str) -> Option<AgentName> {
        let name = AgentName::try_new(key.to_string()).ok()?;
        self.registry.get(&name).await.map(|descriptor| descriptor.name)
    }
}
