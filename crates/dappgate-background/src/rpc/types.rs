//! Dispatcher types.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use dappgate_core::protocol::RpcError;

use crate::TabId;

/// Who is calling: the page origin and the tab it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub origin: String,
    pub tab_id: TabId,
}

impl CallContext {
    pub fn new(origin: impl Into<String>, tab_id: TabId) -> Self {
        Self {
            origin: origin.into(),
            tab_id,
        }
    }
}

/// Implementation of one RPC method.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, params: Value, ctx: &CallContext) -> Result<Value, RpcError>;
}

/// A registered method: name, required capability tags and handler.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub required_permissions: Vec<String>,
    pub handler: Arc<dyn MethodHandler>,
}

impl MethodDescriptor {
    /// Descriptor with no required permissions.
    pub fn new(name: impl Into<String>, handler: Arc<dyn MethodHandler>) -> Self {
        Self {
            name: name.into(),
            required_permissions: Vec::new(),
            handler,
        }
    }

    /// Require capability `tag` before the handler runs.
    #[must_use]
    pub fn requires(mut self, tag: impl Into<String>) -> Self {
        self.required_permissions.push(tag.into());
        self
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("required_permissions", &self.required_permissions)
            .finish_non_exhaustive()
    }
}

/// Method registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Method already registered: {0}")]
    DuplicateMethod(String),
}
