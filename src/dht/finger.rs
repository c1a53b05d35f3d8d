//! Finger table of a local vnode.

use super::id::between_right_incl;
use super::id::power_offset;
use super::vnode::Vnode;

/// m routing entries, where entry i approximates the successor of
/// (owner + 2^i) mod 2^m, plus the cursor of the next entry to
/// repair. Entries are written only by finger repair.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerTable {
    owner: Vnode,
    bits: usize,
    slots: Vec<Option<Vnode>>,
    last_finger: usize,
}

impl FingerTable {
    pub fn new(owner: Vnode, bits: usize) -> Self {
        Self {
            owner,
            bits,
            slots: vec![None; bits],
            last_finger: 0,
        }
    }

    /// Identifier width m.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Index of the entry the next repair round targets.
    pub fn fix_index(&self) -> usize {
        self.last_finger
    }

    pub fn get(&self, index: usize) -> Option<&Vnode> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn list(&self) -> &[Option<Vnode>] {
        &self.slots
    }

    /// Record the repaired owner of offset `fix_index()`, then
    /// coalesce forward: a single successor typically covers a run of
    /// finger offsets, so one lookup amortizes many entries. The
    /// cursor ends one past the last entry the successor covers,
    /// wrapping at m.
    pub fn apply_fix(&mut self, node: Vnode) {
        let idx = self.last_finger;
        self.slots[idx] = Some(node.clone());

        let mut next = idx + 1;
        while next < self.bits {
            let offset = power_offset(&self.owner.id, next, self.bits);
            if !between_right_incl(&self.owner.id, &node.id, &offset) {
                break;
            }
            self.slots[next] = Some(node.clone());
            self.last_finger = next;
            next += 1;
        }

        self.last_finger = (self.last_finger + 1) % self.bits;
    }
}
