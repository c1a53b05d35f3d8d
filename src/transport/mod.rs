//! Transport capability set.
//!
//! The ring core is transport-agnostic: every remote interaction goes
//! through the [Transport] trait, and every inbound RPC lands on a
//! [VnodeHandler] installed via [Transport::register]. Wire transports
//! (TCP framing, RPC frameworks) live outside this crate; they are
//! expected to bound every call with a per-call timeout and surface
//! timeouts as errors, dispatch inbound requests through
//! [local::LocalTransport::handler_for], and reap outbound connections
//! idle for longer than [crate::Config::conn_idle_timeout].

pub mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::dht::Vnode;
use crate::error::Result;

/// The RPC surface consumed by the ring core.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// All vnodes registered at `host`.
    async fn list_vnodes(&self, host: &str) -> Result<Vec<Vnode>>;

    /// Liveness probe. `Ok(false)` means the target is definitively
    /// not alive; an error means its state is unknown.
    async fn ping(&self, target: &Vnode) -> Result<bool>;

    /// The target vnode's predecessor, which may be unset.
    async fn get_predecessor(&self, target: &Vnode) -> Result<Option<Vnode>>;

    /// Tell `target` that `claimant` believes it is its predecessor.
    /// Returns the target's successor list after the notification.
    async fn notify(&self, target: &Vnode, claimant: &Vnode) -> Result<Vec<Vnode>>;

    /// Up to `n` successors of `key` as seen from `target`.
    async fn find_successors(&self, target: &Vnode, n: usize, key: &[u8]) -> Result<Vec<Vnode>>;

    /// `target` clears its predecessor iff it equals `leaving`.
    async fn clear_predecessor(&self, target: &Vnode, leaving: &Vnode) -> Result<()>;

    /// `target` advances past its first successor iff it equals
    /// `leaving`.
    async fn skip_successor(&self, target: &Vnode, leaving: &Vnode) -> Result<()>;

    /// Install a local RPC handler.
    fn register(&self, handler: Arc<dyn VnodeHandler>);

    /// Remove a previously registered handler.
    fn deregister(&self, target: &Vnode);
}

/// Inbound RPC surface of a single registered vnode.
#[async_trait]
pub trait VnodeHandler: Send + Sync + 'static {
    /// The descriptor of the vnode served by this handler.
    fn vnode(&self) -> &Vnode;

    /// Current predecessor, which may be unset.
    async fn get_predecessor(&self) -> Result<Option<Vnode>>;

    /// Possibly adopt `claimant` as predecessor; always returns the
    /// current successor list.
    async fn notify(&self, claimant: Vnode) -> Result<Vec<Vnode>>;

    /// Up to `n` successors of `key`.
    async fn find_successors(&self, n: usize, key: &[u8]) -> Result<Vec<Vnode>>;

    /// Clear the predecessor iff it equals `leaving`.
    async fn clear_predecessor(&self, leaving: Vnode) -> Result<()>;

    /// Advance past the first successor iff it equals `leaving`.
    async fn skip_successor(&self, leaving: Vnode) -> Result<()>;
}

impl std::fmt::Debug for dyn VnodeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VnodeHandler").field("vnode", self.vnode()).finish()
    }
}
