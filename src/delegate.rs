//! Ring event delegation.
//!
//! User callbacks run on a single consumer task reading a bounded
//! queue, so they are totally ordered relative to enqueue order and
//! never run concurrently with each other. A panicking callback is
//! caught and logged; it never kills the consumer.

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::channel::oneshot;
use tokio::task::JoinHandle;

use crate::dht::Vnode;

/// Capacity of the event queue between the ring and the consumer.
const EVENT_QUEUE_SIZE: usize = 32;

/// Callbacks invoked on ring membership events. All methods default
/// to no-ops so implementations only override what they observe.
pub trait Delegate: Send + Sync + 'static {
    /// `local` adopted `new_pred` as its predecessor, replacing
    /// `old_pred`.
    fn new_predecessor(&self, _local: &Vnode, _new_pred: &Vnode, _old_pred: Option<&Vnode>) {}

    /// `local` is leaving the ring.
    fn leaving(&self, _local: &Vnode) {}

    /// The predecessor of `local` announced it is leaving.
    fn predecessor_leaving(&self, _local: &Vnode, _remote: &Vnode) {}

    /// The successor of `local` announced it is leaving.
    fn successor_leaving(&self, _local: &Vnode, _remote: &Vnode) {}

    /// The ring is shutting down; this is the last callback.
    fn shutdown(&self) {}
}

#[derive(Debug, Clone)]
pub(crate) enum RingEvent {
    NewPredecessor {
        local: Vnode,
        new_pred: Vnode,
        old_pred: Option<Vnode>,
    },
    Leaving {
        local: Vnode,
    },
    PredecessorLeaving {
        local: Vnode,
        remote: Vnode,
    },
    SuccessorLeaving {
        local: Vnode,
        remote: Vnode,
    },
    Shutdown,
}

pub(crate) type EventSender = async_channel::Sender<(RingEvent, oneshot::Sender<()>)>;

fn invoke(delegate: &dyn Delegate, event: &RingEvent) {
    match event {
        RingEvent::NewPredecessor {
            local,
            new_pred,
            old_pred,
        } => delegate.new_predecessor(local, new_pred, old_pred.as_ref()),
        RingEvent::Leaving { local } => delegate.leaving(local),
        RingEvent::PredecessorLeaving { local, remote } => {
            delegate.predecessor_leaving(local, remote)
        }
        RingEvent::SuccessorLeaving { local, remote } => delegate.successor_leaving(local, remote),
        RingEvent::Shutdown => delegate.shutdown(),
    }
}

/// The single-consumer dispatcher serializing delegate callbacks.
pub(crate) struct Dispatcher {
    tx: EventSender,
    consumer: JoinHandle<()>,
}

impl Dispatcher {
    pub(crate) fn start(delegate: Arc<dyn Delegate>) -> Self {
        let (tx, rx) =
            async_channel::bounded::<(RingEvent, oneshot::Sender<()>)>(EVENT_QUEUE_SIZE);

        let consumer = tokio::spawn(async move {
            while let Ok((event, done)) = rx.recv().await {
                let called = catch_unwind(AssertUnwindSafe(|| invoke(delegate.as_ref(), &event)));
                if called.is_err() {
                    tracing::error!("[delegate] callback panicked handling {:?}", event);
                }
                let _ = done.send(());
            }
        });

        Self { tx, consumer }
    }

    pub(crate) fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    /// Deliver the final `Shutdown` callback, wait for it to finish,
    /// then close the queue and join the consumer.
    pub(crate) async fn stop(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send((RingEvent::Shutdown, done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
        self.tx.close();
        let _ = self.consumer.await;
    }
}
