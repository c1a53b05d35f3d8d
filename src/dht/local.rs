//! Local vnode: one instance of the ring state machine.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Instant;

use async_trait::async_trait;

use super::finger::FingerTable;
use super::id::between;
use super::id::between_right_incl;
use super::iter::ClosestPreceding;
use super::successor::SuccessorList;
use super::vnode::Vnode;
use crate::config::Config;
use crate::delegate::RingEvent;
use crate::error::Error;
use crate::error::Result;
use crate::ring::RingContext;
use crate::transport::Transport;
use crate::transport::VnodeHandler;

/// Deterministic vnode identifier: hash(hostname ∥ big-endian index).
pub(crate) fn gen_id(conf: &Config, index: u16) -> Vec<u8> {
    let mut hasher = (conf.hash_fn)();
    hasher.update(conf.hostname.as_bytes());
    hasher.update(&index.to_be_bytes());
    hasher.finalize().to_vec()
}

/// A virtual participant owned by the local ring. Holds the
/// predecessor, successor list and finger table, and serves both the
/// maintenance steps and the inbound RPC surface. State fields are
/// individually locked; no lock is held across a transport call.
pub struct LocalVnode {
    vnode: Vnode,
    bits: usize,
    pub(crate) ctx: Arc<RingContext>,
    pub(crate) successors: SuccessorList,
    pub(crate) finger: Mutex<FingerTable>,
    pub(crate) predecessor: Mutex<Option<Vnode>>,
    pub(crate) stabilized: Mutex<Option<Instant>>,
}

impl LocalVnode {
    pub(crate) fn new(ctx: Arc<RingContext>, index: u16) -> Self {
        let id = gen_id(&ctx.config, index);
        let vnode = Vnode::new(id, ctx.config.hostname.clone());
        let bits = ctx.config.hash_bits();
        Self {
            successors: SuccessorList::new(vnode.clone(), ctx.config.num_successors),
            finger: Mutex::new(FingerTable::new(vnode.clone(), bits)),
            predecessor: Mutex::new(None),
            stabilized: Mutex::new(None),
            vnode,
            bits,
            ctx,
        }
    }

    /// The descriptor of this vnode.
    pub fn vnode(&self) -> &Vnode {
        &self.vnode
    }

    pub(crate) fn lock_predecessor(&self) -> Result<MutexGuard<Option<Vnode>>> {
        self.predecessor.lock().map_err(|_| Error::StateLock)
    }

    pub(crate) fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::StateLock)
    }

    /// Find up to `n` successors of `key`, routing through the best
    /// known preceding nodes when the key is not covered locally.
    pub async fn find_successors(&self, n: usize, key: &[u8]) -> Result<Vec<Vnode>> {
        // Covered by the immediate successor.
        if let Some(head) = self.successors.head()? {
            if between_right_incl(&self.vnode.id, &head.id, key) {
                return Ok(self.successors.take(n)?);
            }
        }

        // Forward to the closest preceding node that answers.
        let iter = ClosestPreceding::new(
            &self.vnode,
            key,
            self.bits,
            self.successors.list()?,
            self.lock_finger()?.list().to_vec(),
        );
        for candidate in iter {
            if self.ctx.is_shutdown() {
                return Err(Error::ShuttingDown);
            }
            match self
                .ctx
                .transport
                .find_successors(&candidate, n, key)
                .await
            {
                Ok(found) => return Ok(found),
                Err(e) => {
                    tracing::debug!(
                        "[lookup] candidate {} failed for key {}: {}",
                        candidate,
                        hex::encode(key),
                        e
                    );
                }
            }
        }

        // No candidate answered; fall back to our own successor list.
        let slots = self.successors.list()?;
        let known = slots.iter().flatten().count();
        for i in 1..known.saturating_sub(n) {
            if let Some(succ) = &slots[i] {
                if between_right_incl(&self.vnode.id, &succ.id, key) {
                    return Ok(slots[i..].iter().flatten().take(n).cloned().collect());
                }
            }
        }

        Err(Error::ExhaustedPrecedingNodes)
    }

    /// Possibly adopt `claimant` as the new predecessor; always
    /// answers with the current successor list.
    pub async fn notify(&self, claimant: Vnode) -> Result<Vec<Vnode>> {
        // A vnode is never its own predecessor.
        if claimant != self.vnode {
            let adopted = {
                let mut pred = self.lock_predecessor()?;
                let tighter = match &*pred {
                    None => true,
                    Some(cur) => between(&cur.id, &self.vnode.id, &claimant.id),
                };
                if tighter {
                    let old = pred.replace(claimant.clone());
                    Some(old)
                } else {
                    None
                }
            };
            if let Some(old) = adopted {
                self.ctx
                    .emit(RingEvent::NewPredecessor {
                        local: self.vnode.clone(),
                        new_pred: claimant,
                        old_pred: old,
                    })
                    .await;
            }
        }

        self.successors.live()
    }

    /// Clear the predecessor iff it equals `leaving`.
    pub async fn clear_predecessor(&self, leaving: Vnode) -> Result<()> {
        let cleared = {
            let mut pred = self.lock_predecessor()?;
            if pred.as_ref() == Some(&leaving) {
                pred.take()
            } else {
                None
            }
        };
        if let Some(old) = cleared {
            self.ctx
                .emit(RingEvent::PredecessorLeaving {
                    local: self.vnode.clone(),
                    remote: old,
                })
                .await;
        }
        Ok(())
    }

    /// Advance past the first successor iff it equals `leaving`.
    pub async fn skip_successor(&self, leaving: Vnode) -> Result<()> {
        if self.successors.head()? == Some(leaving.clone()) {
            self.successors.shift_left()?;
            // A ring of one is its own successor.
            if self.successors.head()?.is_none() {
                self.successors.set_head(self.vnode.clone())?;
            }
            self.ctx
                .emit(RingEvent::SuccessorLeaving {
                    local: self.vnode.clone(),
                    remote: leaving,
                })
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl VnodeHandler for LocalVnode {
    fn vnode(&self) -> &Vnode {
        &self.vnode
    }

    async fn get_predecessor(&self) -> Result<Option<Vnode>> {
        Ok(self.lock_predecessor()?.clone())
    }

    async fn notify(&self, claimant: Vnode) -> Result<Vec<Vnode>> {
        self.notify(claimant).await
    }

    async fn find_successors(&self, n: usize, key: &[u8]) -> Result<Vec<Vnode>> {
        self.find_successors(n, key).await
    }

    async fn clear_predecessor(&self, leaving: Vnode) -> Result<()> {
        self.clear_predecessor(leaving).await
    }

    async fn skip_successor(&self, leaving: Vnode) -> Result<()> {
        self.skip_successor(leaving).await
    }
}
