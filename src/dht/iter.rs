//! Closest-preceding candidate iterator.

use std::collections::HashSet;

use super::id::between;
use super::id::distance;
use super::vnode::Vnode;

/// Lazily yields the best known candidates to forward a lookup for a
/// key to, in increasing forward distance from the key and without
/// repeating any candidate. Works over point-in-time snapshots of the
/// successor list and finger table, with one descending cursor per
/// table and a set of already-yielded identifiers.
///
/// The sequence is finite and non-restartable: every call either
/// advances a cursor or ends the iteration.
pub struct ClosestPreceding {
    home: Vec<u8>,
    key: Vec<u8>,
    bits: usize,
    successors: Vec<Option<Vnode>>,
    finger: Vec<Option<Vnode>>,
    successor_idx: isize,
    finger_idx: isize,
    yielded: HashSet<Vec<u8>>,
}

impl ClosestPreceding {
    pub fn new(
        home: &Vnode,
        key: &[u8],
        bits: usize,
        successors: Vec<Option<Vnode>>,
        finger: Vec<Option<Vnode>>,
    ) -> Self {
        let successor_idx = successors.len() as isize - 1;
        let finger_idx = finger.len() as isize - 1;
        Self {
            home: home.id.clone(),
            key: key.to_vec(),
            bits,
            successors,
            finger,
            successor_idx,
            finger_idx,
            yielded: HashSet::new(),
        }
    }

    /// Scan a table downward from `from` for the first entry that
    /// precedes the key and has not been yielded yet.
    fn scan_table(&self, slots: &[Option<Vnode>], from: isize) -> (isize, Option<Vnode>) {
        let mut i = from;
        while i >= 0 {
            if let Some(vnode) = &slots[i as usize] {
                if !self.yielded.contains(&vnode.id) && between(&self.home, &self.key, &vnode.id) {
                    return (i, Some(vnode.clone()));
                }
            }
            i -= 1;
        }
        (i, None)
    }
}

impl Iterator for ClosestPreceding {
    type Item = Vnode;

    fn next(&mut self) -> Option<Vnode> {
        let (si, successor_node) = self.scan_table(&self.successors, self.successor_idx);
        self.successor_idx = si;

        let (fi, finger_node) = self.scan_table(&self.finger, self.finger_idx);
        self.finger_idx = fi;

        let winner = match (successor_node, finger_node) {
            (Some(s), Some(f)) => {
                // Ties go to the successor candidate.
                if distance(&s.id, &self.key, self.bits) <= distance(&f.id, &self.key, self.bits) {
                    self.successor_idx -= 1;
                    s
                } else {
                    self.finger_idx -= 1;
                    f
                }
            }
            (Some(s), None) => {
                self.successor_idx -= 1;
                s
            }
            (None, Some(f)) => {
                self.finger_idx -= 1;
                f
            }
            (None, None) => return None,
        };

        self.yielded.insert(winner.id.clone());
        Some(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vn(id: u8) -> Vnode {
        Vnode::new(vec![id], "test:9000")
    }

    #[test]
    fn test_yield_order_by_forward_distance() {
        // m=6 ring: home 54, key 32. Candidates preceding the key are
        // 62 (distance 34), 1 (distance 31) and 10 (distance 22);
        // finger entry 32 equals the key and is excluded.
        let home = vn(54);
        let successors = vec![Some(vn(62))];
        let finger = vec![
            None,
            None,
            None,
            Some(vn(1)),
            Some(vn(10)),
            Some(vn(32)),
        ];

        let mut iter = ClosestPreceding::new(&home, &[32], 6, successors, finger);
        assert_eq!(iter.next(), Some(vn(10)));
        assert_eq!(iter.next(), Some(vn(1)));
        assert_eq!(iter.next(), Some(vn(62)));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_no_duplicates_and_bounded_steps() {
        // The same vnode sitting in both tables is yielded once, and
        // iteration never exceeds |successors| + |finger| yields.
        let home = vn(0);
        let successors = vec![Some(vn(10)), Some(vn(20)), None];
        let finger = vec![Some(vn(10)), Some(vn(20)), Some(vn(30)), None];

        let yielded: Vec<Vnode> =
            ClosestPreceding::new(&home, &[40], 6, successors, finger).collect();

        assert_eq!(yielded, vec![vn(30), vn(20), vn(10)]);
        let mut unique = yielded.clone();
        unique.dedup();
        assert_eq!(unique, yielded);
    }

    #[test]
    fn test_empty_tables_yield_nothing() {
        let home = vn(0);
        let mut iter = ClosestPreceding::new(&home, &[40], 6, vec![None; 3], vec![None; 6]);
        assert_eq!(iter.next(), None);
    }
}
