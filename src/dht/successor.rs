//! Successor list for a local vnode.
//!
//! A plain fixed-capacity array with a nil-padded tail: shifts of
//! length r are cheap for the r values rings actually run with. The
//! list lives behind an `RwLock` so concurrent RPC handlers read a
//! consistent snapshot of every slot while the maintenance task
//! splices.

use std::sync::RwLock;

use super::vnode::Vnode;
use crate::error::Error;
use crate::error::Result;

#[derive(Debug)]
pub struct SuccessorList {
    owner: Vnode,
    slots: RwLock<Vec<Option<Vnode>>>,
}

impl SuccessorList {
    pub fn new(owner: Vnode, capacity: usize) -> Self {
        Self {
            owner,
            slots: RwLock::new(vec![None; capacity]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }

    /// The first entry, used for stabilization.
    pub fn head(&self) -> Result<Option<Vnode>> {
        let slots = self.slots.read().map_err(|_| Error::StateLock)?;
        Ok(slots.first().cloned().flatten())
    }

    /// Snapshot of every slot, nil padding included.
    pub fn list(&self) -> Result<Vec<Option<Vnode>>> {
        let slots = self.slots.read().map_err(|_| Error::StateLock)?;
        Ok(slots.clone())
    }

    /// The known entries in order, nils skipped.
    pub fn live(&self) -> Result<Vec<Vnode>> {
        let slots = self.slots.read().map_err(|_| Error::StateLock)?;
        Ok(slots.iter().flatten().cloned().collect())
    }

    /// Count of known entries.
    pub fn known(&self) -> Result<usize> {
        let slots = self.slots.read().map_err(|_| Error::StateLock)?;
        Ok(slots.iter().flatten().count())
    }

    /// The first `n` known entries in order.
    pub fn take(&self, n: usize) -> Result<Vec<Vnode>> {
        let slots = self.slots.read().map_err(|_| Error::StateLock)?;
        Ok(slots.iter().flatten().take(n).cloned().collect())
    }

    pub fn set_head(&self, vnode: Vnode) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| Error::StateLock)?;
        if let Some(slot) = slots.first_mut() {
            *slot = Some(vnode);
        }
        Ok(())
    }

    /// Splice a new head in front, shifting everything right and
    /// dropping the tail entry.
    pub fn insert_front(&self, vnode: Vnode) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| Error::StateLock)?;
        slots.pop();
        slots.insert(0, Some(vnode));
        Ok(())
    }

    /// Advance past the head, shifting everything left and nilling
    /// the tail.
    pub fn shift_left(&self) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| Error::StateLock)?;
        if !slots.is_empty() {
            slots.remove(0);
            slots.push(None);
        }
        Ok(())
    }

    /// Copy a successor's own list into slots 1.., skipping entries
    /// equal to the owner so a one-node ring never loops on itself.
    pub fn fill_tail(&self, rest: &[Vnode]) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| Error::StateLock)?;
        let mut idx = 1;
        for vnode in rest {
            if idx >= slots.len() {
                break;
            }
            if *vnode == self.owner {
                continue;
            }
            slots[idx] = Some(vnode.clone());
            idx += 1;
        }
        Ok(())
    }

    /// Bulk-assign the list from the front, used when joining.
    pub fn replace(&self, list: &[Vnode]) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| Error::StateLock)?;
        let capacity = slots.len();
        slots.iter_mut().for_each(|s| *s = None);
        let mut idx = 0;
        for vnode in list {
            if idx >= capacity {
                break;
            }
            if *vnode == self.owner {
                continue;
            }
            slots[idx] = Some(vnode.clone());
            idx += 1;
        }
        Ok(())
    }
}
