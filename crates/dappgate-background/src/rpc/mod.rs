//! RPC dispatch: method registry, permission gate and built-in handlers.

mod dispatcher;
mod handlers;
mod types;

pub use dispatcher::RpcDispatcher;
pub(crate) use handlers::apply_chain_switch;
pub use types::{CallContext, MethodDescriptor, MethodHandler, RegistryError};
