//! Provisioner registry
//!
//! Dispatches each node to the provisioner registered for the longest
//! matching kind prefix (`"kubernetes:"` handles `"kubernetes:namespace"`).

use crate::error::ProvisionError;
use crate::output::Outputs;
use crate::provisioner::{DestroyRequest, ProvisionRequest, Provisioner};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Default, Clone)]
pub struct ProvisionerRegistry {
    entries: Vec<(String, Arc<dyn Provisioner>)>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provisioner for a kind prefix (replaces an existing entry)
    pub fn register(&mut self, prefix: impl Into<String>, provisioner: Arc<dyn Provisioner>) {
        let prefix = prefix.into();
        self.entries.retain(|(p, _)| *p != prefix);
        self.entries.push((prefix, provisioner));
    }

    pub fn with(mut self, prefix: impl Into<String>, provisioner: Arc<dyn Provisioner>) -> Self {
        self.register(prefix, provisioner);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered prefixes
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    /// Provisioner for a kind
    pub fn resolve(&self, kind: &str) -> Option<&Arc<dyn Provisioner>> {
        self.entries
            .iter()
            .filter(|(prefix, _)| kind.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, provisioner)| provisioner)
    }

    fn dispatch(&self, kind: &str) -> Result<&Arc<dyn Provisioner>, ProvisionError> {
        let provisioner = self
            .resolve(kind)
            .ok_or_else(|| ProvisionError::Provisioning(format!("no provisioner for kind '{kind}'")))?;
        debug!(kind = %kind, provisioner = %provisioner.name(), "Dispatching");
        Ok(provisioner)
    }
}

#[async_trait]
impl Provisioner for ProvisionerRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    async fn provision(&self, request: ProvisionRequest) -> Result<Outputs, ProvisionError> {
        self.dispatch(&request.kind)?.provision(request).await
    }

    async fn destroy(&self, request: DestroyRequest) -> Result<(), ProvisionError> {
        self.dispatch(&request.kind)?.destroy(request).await
    }
}
