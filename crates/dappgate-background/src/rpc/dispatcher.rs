//! RPC dispatcher: method table lookup, permission gate, handler call.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use dappgate_core::protocol::{CONNECTED_PERMISSION, ErrorKind, RpcError, methods};

use super::handlers::{Builtin, BuiltinHandler, Services};
use super::types::{CallContext, MethodDescriptor, RegistryError};
use crate::approval::ApprovalBroker;
use crate::broadcast::NotificationBroadcaster;
use crate::network::NetworkManager;
use crate::permission::PermissionStore;
use crate::signer::Signer;

/// Routes page requests to method handlers under the origin's permissions.
pub struct RpcDispatcher {
    methods: RwLock<HashMap<String, Arc<MethodDescriptor>>>,
    store: Arc<PermissionStore>,
}

impl RpcDispatcher {
    /// Create a dispatcher with the built-in method table registered.
    pub fn new(
        store: Arc<PermissionStore>,
        broker: Arc<ApprovalBroker>,
        networks: Arc<NetworkManager>,
        broadcaster: Arc<NotificationBroadcaster>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        let services = Arc::new(Services {
            store: Arc::clone(&store),
            broker,
            networks,
            broadcaster,
            signer,
        });

        let table = Builtin::ALL
            .into_iter()
            .map(|builtin| {
                let handler = Arc::new(BuiltinHandler::new(builtin, Arc::clone(&services)));
                let mut descriptor = MethodDescriptor::new(builtin.name(), handler);
                if builtin.requires_connection() {
                    descriptor = descriptor.requires(CONNECTED_PERMISSION);
                }
                (builtin.name().to_string(), Arc::new(descriptor))
            })
            .collect();

        Self {
            methods: RwLock::new(table),
            store,
        }
    }

    /// Add a method. Names are unique; the first registration stays.
    pub async fn register(&self, descriptor: MethodDescriptor) -> Result<(), RegistryError> {
        let mut methods = self.methods.write().await;
        if methods.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateMethod(descriptor.name));
        }
        debug!(method = %descriptor.name, "Method registered");
        methods.insert(descriptor.name.clone(), Arc::new(descriptor));
        drop(methods);
        Ok(())
    }

    /// Whether `method` is registered.
    pub async fn has_method(&self, method: &str) -> bool {
        self.methods.read().await.contains_key(method)
    }

    /// Registered method names, sorted.
    pub async fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Execute `method` on behalf of `ctx.origin`.
    pub async fn execute(
        &self,
        method: &str,
        params: Value,
        ctx: &CallContext,
    ) -> Result<Value, RpcError> {
        let descriptor = self
            .methods
            .read()
            .await
            .get(method)
            .cloned()
            .ok_or_else(|| RpcError::method_not_found(method))?;

        let authorized = self.authorize(&descriptor, ctx).await?;
        if authorized {
            // Bookkeeping only; a failed refresh never fails the call.
            if let Err(e) = self.store.touch(&ctx.origin).await {
                warn!(origin = %ctx.origin, error = %e, "Failed to refresh lastUsed");
            }
        }

        debug!(method, origin = %ctx.origin, tab_id = ctx.tab_id, "Dispatching");
        let result = descriptor.handler.call(params, ctx).await;

        if let Err(e) = &result {
            if e.kind() == ErrorKind::Internal {
                warn!(method, origin = %ctx.origin, error = %e, "Handler failed");
            } else {
                debug!(method, origin = %ctx.origin, code = e.code, "Request refused");
            }
        }
        result
    }

    /// Check required permissions. Returns whether the origin is connected.
    ///
    /// The account request is let through unconnected: its handler either
    /// returns the existing account or runs the approval flow.
    async fn authorize(
        &self,
        descriptor: &MethodDescriptor,
        ctx: &CallContext,
    ) -> Result<bool, RpcError> {
        let Some(site) = self.store.get(&ctx.origin).await else {
            if descriptor.required_permissions.is_empty()
                || descriptor.name == methods::REQUEST_ACCOUNTS
            {
                return Ok(false);
            }
            return Err(RpcError::unauthorized(format!(
                "Origin has not been authorized for {}",
                descriptor.name
            )));
        };

        if let Some(missing) = descriptor
            .required_permissions
            .iter()
            .find(|tag| !site.has_permission(tag))
        {
            return Err(RpcError::unauthorized(format!(
                "Origin lacks permission '{missing}'"
            )));
        }
        Ok(true)
    }
}
