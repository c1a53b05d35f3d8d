//! Ring lifecycle: the process-level Chord participant.

use std::sync::Arc;

use futures::channel::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::delegate::Dispatcher;
use crate::delegate::EventSender;
use crate::delegate::RingEvent;
use crate::dht::stabilization::spawn_maintenance;
use crate::dht::LocalVnode;
use crate::dht::Vnode;
use crate::error::Error;
use crate::error::Result;
use crate::transport::local::LocalTransport;
use crate::transport::Transport;
use crate::transport::VnodeHandler;

/// Shared context handed to every local vnode at construction:
/// configuration, the transport shim, the event queue and the
/// ring-wide shutdown signal. The ring owns its vnodes; vnodes only
/// hold this lightweight handle back.
pub(crate) struct RingContext {
    pub(crate) config: Config,
    pub(crate) transport: Arc<LocalTransport>,
    events: Option<EventSender>,
    shutdown: watch::Sender<bool>,
}

impl RingContext {
    fn new(
        config: Config,
        transport: Arc<LocalTransport>,
        events: Option<EventSender>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            transport,
            events,
            shutdown,
        })
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Enqueue a delegate event without waiting for its completion.
    /// A ring without a delegate drops events on the floor.
    pub(crate) async fn emit(&self, event: RingEvent) {
        let Some(events) = &self.events else {
            return;
        };
        let (done, _) = oneshot::channel();
        if events.send((event, done)).await.is_err() {
            tracing::debug!("[delegate] event queue closed, dropping event");
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(config: Config) -> Arc<Self> {
        Self::new(config, Arc::new(LocalTransport::new(None)), None)
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests_with_transport(
        config: Config,
        remote: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Self::new(config, Arc::new(LocalTransport::new(Some(remote))), None)
    }
}

/// Among identifiers sorted ascending, the index of the largest one
/// strictly less than `key`, or the last index when the key wraps
/// below every identifier.
fn nearest_idx(ids: &[&[u8]], key: &[u8]) -> Option<usize> {
    if ids.is_empty() {
        return None;
    }
    ids.iter()
        .rposition(|id| *id < key)
        .or(Some(ids.len() - 1))
}

/// The process-level Chord participant: configuration, the ordered
/// set of local vnodes, the transport shim and the delegate queue.
pub struct Ring {
    ctx: Arc<RingContext>,
    vnodes: Vec<Arc<LocalVnode>>,
    tasks: Vec<JoinHandle<()>>,
    dispatcher: Option<Dispatcher>,
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("vnodes", &self.vnodes.len())
            .finish_non_exhaustive()
    }
}

impl Ring {
    /// Create a new ring from scratch. Local vnodes get deterministic
    /// ids, are sorted along the identifier space and wired to their
    /// clockwise neighbors, then registered and scheduled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(config: Config, transport: Option<Arc<dyn Transport>>) -> Result<Ring> {
        let (ctx, dispatcher, vnodes) = Self::init(config, transport)?;

        // Wire each vnode to min(r, N-1) clockwise neighbors so no
        // vnode lists itself; a lone vnode is its own successor.
        let count = vnodes.len();
        if count == 1 {
            vnodes[0].successors.set_head(vnodes[0].vnode().clone())?;
        } else {
            let neighbors = ctx.config.num_successors.min(count - 1);
            for (idx, vnode) in vnodes.iter().enumerate() {
                let mut succs = Vec::with_capacity(neighbors);
                for i in 0..neighbors {
                    succs.push(vnodes[(idx + i + 1) % count].vnode().clone());
                }
                vnode.successors.replace(&succs)?;
            }
        }

        Self::register(&ctx, &vnodes);
        let tasks = vnodes.iter().cloned().map(spawn_maintenance).collect();

        Ok(Ring {
            ctx,
            vnodes,
            tasks,
            dispatcher,
        })
    }

    /// Join an existing ring through a seed host. Successor lists are
    /// seeded from the nearest seed vnodes, and one synchronous
    /// stabilization round runs before the timers start so the remote
    /// side learns of the newcomers promptly.
    pub async fn join(
        config: Config,
        transport: Option<Arc<dyn Transport>>,
        seed_host: &str,
    ) -> Result<Ring> {
        let (ctx, dispatcher, vnodes) = Self::init(config, transport)?;

        let mut seed = ctx.transport.list_vnodes(seed_host).await?;
        if seed.is_empty() {
            return Err(Error::EmptySeed(seed_host.to_string()));
        }
        seed.sort_by(|a, b| a.id.cmp(&b.id));

        let num_successors = ctx.config.num_successors;
        let seed_ids: Vec<&[u8]> = seed.iter().map(|vn| vn.id.as_slice()).collect();
        for vnode in &vnodes {
            let near = match nearest_idx(&seed_ids, &vnode.vnode().id) {
                Some(idx) => &seed[idx],
                None => return Err(Error::EmptySeed(seed_host.to_string())),
            };
            let succs = ctx
                .transport
                .find_successors(near, num_successors, &vnode.vnode().id)
                .await?;
            vnode.successors.replace(&succs)?;
        }

        Self::register(&ctx, &vnodes);
        for vnode in &vnodes {
            vnode.stabilize().await;
        }
        let tasks = vnodes.iter().cloned().map(spawn_maintenance).collect();

        Ok(Ring {
            ctx,
            vnodes,
            tasks,
            dispatcher,
        })
    }

    fn init(
        config: Config,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<(Arc<RingContext>, Option<Dispatcher>, Vec<Arc<LocalVnode>>)> {
        config.validate()?;

        let transport = Arc::new(LocalTransport::new(transport));
        let dispatcher = config.delegate.clone().map(Dispatcher::start);
        let events = dispatcher.as_ref().map(|d| d.sender());
        let ctx = RingContext::new(config, transport, events);

        let mut vnodes: Vec<Arc<LocalVnode>> = (0..ctx.config.num_vnodes)
            .map(|idx| Arc::new(LocalVnode::new(ctx.clone(), idx as u16)))
            .collect();
        vnodes.sort_by(|a, b| a.vnode().id.cmp(&b.vnode().id));

        Ok((ctx, dispatcher, vnodes))
    }

    fn register(ctx: &Arc<RingContext>, vnodes: &[Arc<LocalVnode>]) {
        for vnode in vnodes {
            ctx.transport.register(vnode.clone() as Arc<dyn VnodeHandler>);
        }
    }

    /// Descriptors of the local vnodes, in ring order.
    pub fn vnodes(&self) -> Vec<Vnode> {
        self.vnodes.iter().map(|vn| vn.vnode().clone()).collect()
    }

    /// Look up to `n` successors of a key. The key is hashed with the
    /// configured hash function and the lookup is delegated to the
    /// nearest local vnode.
    pub async fn lookup(&self, n: usize, key: &[u8]) -> Result<Vec<Vnode>> {
        let max = self.ctx.config.num_successors;
        if n > max {
            return Err(Error::TooManySuccessors { requested: n, max });
        }

        let key_hash = self.ctx.config.hash_key(key);
        let ids: Vec<&[u8]> = self.vnodes.iter().map(|vn| vn.vnode().id.as_slice()).collect();
        let vnode = nearest_idx(&ids, &key_hash)
            .map(|idx| &self.vnodes[idx])
            .ok_or_else(|| Error::InvalidConfig("ring has no vnodes".into()))?;

        vnode.find_successors(n, &key_hash).await
    }

    /// Leave the ring: stop maintenance, announce the departure to
    /// predecessors and successors, then stop the delegate queue.
    /// Peer-notification failures are accumulated and merged.
    pub async fn leave(mut self) -> Result<()> {
        self.stop_vnodes().await;

        let mut failures: Vec<Error> = vec![];
        for vnode in &self.vnodes {
            self.ctx
                .emit(RingEvent::Leaving {
                    local: vnode.vnode().clone(),
                })
                .await;

            let pred = vnode.lock_predecessor()?.clone();
            if let Some(pred) = pred {
                if let Err(e) = self.ctx.transport.skip_successor(&pred, vnode.vnode()).await {
                    failures.push(e);
                }
            }

            if let Some(succ) = vnode.successors.head()? {
                if let Err(e) = self
                    .ctx
                    .transport
                    .clear_predecessor(&succ, vnode.vnode())
                    .await
                {
                    failures.push(e);
                }
            }
        }

        self.stop_delegate().await;

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Error::Merged(failures)),
        }
    }

    /// Shut down the local process without announcing the departure.
    pub async fn shutdown(mut self) {
        self.stop_vnodes().await;
        self.stop_delegate().await;
    }

    /// Signal shutdown and wait for every maintenance task to
    /// acknowledge by exiting.
    async fn stop_vnodes(&mut self) {
        self.ctx.signal_shutdown();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    async fn stop_delegate(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.stop().await;
        }
    }
}
