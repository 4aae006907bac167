//! Provisioner capability
//!
//! The seam to external systems. The scheduler never talks to a cloud API
//! directly; it hands each node to a [`Provisioner`] together with the
//! resolved outputs of everything the node depends on.

use crate::error::ProvisionError;
use crate::output::Outputs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Realizes (and tears down) resource nodes
///
/// Implementations own their retry policy; the scheduler never retries.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the provisioner name (e.g., "exec", "registry")
    fn name(&self) -> &str;

    /// Create the resource and report its outputs
    async fn provision(&self, request: ProvisionRequest) -> Result<Outputs, ProvisionError>;

    /// Remove a previously provisioned resource
    async fn destroy(&self, request: DestroyRequest) -> Result<(), ProvisionError> {
        tracing::debug!(node = %request.name, "Provisioner has no destroy step");
        Ok(())
    }
}

/// Everything a provisioner needs to realize one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Resource name
    pub name: String,

    /// Resource kind (e.g., "digitalocean:domain")
    pub kind: String,

    /// Desired state, passed through untouched
    pub payload: Value,

    /// Parent node name
    pub parent: Option<String>,

    /// Provider node name; its outputs are in `dependencies`
    pub provider: Option<String>,

    /// Bound input values (projections already applied)
    pub inputs: BTreeMap<String, Value>,

    /// Resolved outputs of every direct dependency, by node name
    pub dependencies: BTreeMap<String, Outputs>,

    /// Fires when the run is cancelled
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl ProvisionRequest {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            payload,
            parent: None,
            provider: None,
            inputs: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Identity key (kind:name)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }

    /// Outputs of the provider node, if any
    pub fn provider_outputs(&self) -> Option<&Outputs> {
        self.provider
            .as_ref()
            .and_then(|p| self.dependencies.get(p))
    }
}

/// Request to tear down one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyRequest {
    pub name: String,
    pub kind: String,
    pub payload: Value,

    /// Outputs recorded when the node was provisioned
    pub outputs: Outputs,

    /// Recorded outputs of the provider node, if any
    pub provider_outputs: Option<Outputs>,

    #[serde(skip)]
    pub cancel: CancellationToken,
}
