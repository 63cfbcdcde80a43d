//! In-memory ordered key index (spec §4.3): a skip list of fixed-width byte
//! keys mapping to [`Rid`]s, with head/tail sentinel nodes and per-level
//! forward pointers, grounded on `original_source/Index/skiplist.cc`.
//!
//! Concurrency follows the single-latch alternative spec §5 explicitly
//! permits: one `parking_lot::RwLock` over the whole structure rather than
//! hand-over-hand per-level latches. Nodes live in an arena (`Vec<Tower>`
//! plus a free list) addressed by index, so no raw pointers or `unsafe` are
//! needed to hold the forward-pointer arrays.

use crate::page_id::Rid;
use parking_lot::RwLock;
use rand::Rng;

/// Hard ceiling on tower height. The original source's `SKIP_LIST_MAX_LEVEL`.
pub const MAX_HEIGHT: usize = 32;

const HEAD: usize = 0;
const TAIL: usize = 1;

pub type Key = Vec<u8>;

struct Tower {
    key: Key,
    value: Rid,
    forward: Vec<Option<usize>>,
}

struct Inner {
    arena: Vec<Tower>,
    free: Vec<usize>,
    height: usize,
}

impl Inner {
    /// Walks top-down, returning the predecessor at each level in
    /// `0..self.height` whose key is the greatest key strictly less than
    /// `key`. This is the one-predecessor-per-level trace spec §9 requires
    /// for `Delete`, shared here with `Search`/`Insert`/`Update`/`ForwardScan`.
    fn predecessors(&self, key: &[u8]) -> Vec<usize> {
        let mut preds = vec![HEAD; self.height];
        let mut cur = HEAD;
        for level in (0..self.height).rev() {
            loop {
                match self.arena[cur].forward[level] {
                    Some(next) if next != TAIL && self.arena[next].key.as_slice() < key => {
                        cur = next;
                    }
                    _ => break,
                }
            }
            preds[level] = cur;
        }
        preds
    }

    fn node_at_or_after(&self, preds: &[usize]) -> Option<usize> {
        preds
            .first()
            .and_then(|&pred| self.arena[pred].forward[0])
            .filter(|&idx| idx != TAIL)
    }
}

pub struct SkipList {
    key_width: usize,
    max_height: usize,
    inner: RwLock<Inner>,
}

impl SkipList {
    pub fn new(key_width: usize, max_height: usize) -> Self {
        let max_height = max_height.min(MAX_HEIGHT).max(1);
        let head = Tower {
            key: Vec::new(),
            value: Rid::INVALID,
            forward: vec![Some(TAIL); max_height],
        };
        let tail = Tower {
            key: Vec::new(),
            value: Rid::INVALID,
            forward: vec![None; max_height],
        };

        Self {
            key_width,
            max_height,
            inner: RwLock::new(Inner {
                arena: vec![head, tail],
                free: Vec::new(),
                height: 1,
            }),
        }
    }

    pub fn key_width(&self) -> usize {
        self.key_width
    }

    fn sample_height(&self) -> usize {
        let mut height = 1;
        let mut rng = rand::thread_rng();
        while height < self.max_height && rng.gen_bool(0.5) {
            height += 1;
        }
        height
    }

    pub fn search(&self, key: &[u8]) -> Option<Rid> {
        debug_assert_eq!(key.len(), self.key_width);
        let inner = self.inner.read();
        let preds = inner.predecessors(key);
        inner
            .node_at_or_after(&preds)
            .filter(|&idx| inner.arena[idx].key == key)
            .map(|idx| inner.arena[idx].value)
    }

    /// Returns `false` without modifying the index if `key` is already
    /// present — duplicate key is never an exceptional condition (spec §7).
    pub fn insert(&self, key: Key, value: Rid) -> bool {
        debug_assert_eq!(key.len(), self.key_width);
        let mut inner = self.inner.write();
        let preds = inner.predecessors(&key);
        if let Some(idx) = inner.node_at_or_after(&preds) {
            if inner.arena[idx].key == key {
                return false;
            }
        }

        let height = self.sample_height();
        if height > inner.height {
            inner.height = height;
        }

        let mut forward = vec![None; height];
        for level in 0..height {
            let pred = if level < preds.len() { preds[level] } else { HEAD };
            forward[level] = inner.arena[pred].forward[level];
        }

        let node_idx = match inner.free.pop() {
            Some(idx) => {
                inner.arena[idx] = Tower { key, value, forward };
                idx
            }
            None => {
                inner.arena.push(Tower { key, value, forward });
                inner.arena.len() - 1
            }
        };

        for level in 0..height {
            let pred = if level < preds.len() { preds[level] } else { HEAD };
            inner.arena[pred].forward[level] = Some(node_idx);
        }

        true
    }

    /// Returns `false` without modifying the index if `key` is absent.
    pub fn update(&self, key: &[u8], value: Rid) -> bool {
        debug_assert_eq!(key.len(), self.key_width);
        let mut inner = self.inner.write();
        let preds = inner.predecessors(key);
        match inner.node_at_or_after(&preds) {
            Some(idx) if inner.arena[idx].key == key => {
                inner.arena[idx].value = value;
                true
            }
            _ => false,
        }
    }

    /// Returns `false` without modifying the index if `key` is absent.
    pub fn delete(&self, key: &[u8]) -> bool {
        debug_assert_eq!(key.len(), self.key_width);
        let mut inner = self.inner.write();
        let preds = inner.predecessors(key);
        let node_idx = match inner.node_at_or_after(&preds) {
            Some(idx) if inner.arena[idx].key == key => idx,
            _ => return false,
        };

        let height = inner.arena[node_idx].forward.len();
        for level in 0..height {
            let pred = if level < preds.len() { preds[level] } else { HEAD };
            let succ = inner.arena[node_idx].forward[level];
            inner.arena[pred].forward[level] = succ;
        }

        inner.arena[node_idx].key.clear();
        inner.arena[node_idx].forward.clear();
        inner.free.push(node_idx);
        true
    }

    /// Walks forward from `start_key` (or the first key, if `start_key` is
    /// `None`) collecting up to `limit` entries (unbounded if `None`).
    ///
    /// `inclusive` controls whether a `start_key` that matches an existing
    /// key is itself included — carried from `SkipList::ForwardScan` in the
    /// original source, which advances one extra step when the caller asked
    /// for an exclusive start.
    pub fn forward_scan(
        &self,
        start_key: Option<&[u8]>,
        inclusive: bool,
        limit: Option<usize>,
    ) -> Vec<(Key, Rid)> {
        if limit == Some(0) {
            return Vec::new();
        }

        let inner = self.inner.read();
        let mut cur = match start_key {
            None => inner.arena[HEAD].forward[0],
            Some(key) => {
                let preds = inner.predecessors(key);
                let candidate = inner.node_at_or_after(&preds);
                match candidate {
                    Some(idx) if inner.arena[idx].key == key && !inclusive => {
                        inner.arena[idx].forward[0]
                    }
                    other => other,
                }
            }
        };

        let mut out = Vec::new();
        while let Some(idx) = cur {
            if idx == TAIL {
                break;
            }
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
            out.push((inner.arena[idx].key.clone(), inner.arena[idx].value));
            cur = inner.arena[idx].forward[0];
        }
        out
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.arena.len() - inner.free.len() - 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_id::PageId;

    fn rid(n: u64) -> Rid {
        Rid::new(PageId::new(0, n), 0)
    }

    fn key(n: u8) -> Key {
        vec![n]
    }

    #[test]
    fn search_on_empty_list_finds_nothing() {
        let list = SkipList::new(1, 8);
        assert_eq!(list.search(&key(5)), None);
    }

    #[test]
    fn insert_then_search_round_trips() {
        let list = SkipList::new(1, 8);
        assert!(list.insert(key(5), rid(100)));
        assert_eq!(list.search(&key(5)), Some(rid(100)));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let list = SkipList::new(1, 8);
        assert!(list.insert(key(5), rid(100)));
        assert!(!list.insert(key(5), rid(200)));
        assert_eq!(list.search(&key(5)), Some(rid(100)));
    }

    #[test]
    fn update_existing_changes_value() {
        let list = SkipList::new(1, 8);
        list.insert(key(5), rid(100));
        assert!(list.update(&key(5), rid(200)));
        assert_eq!(list.search(&key(5)), Some(rid(200)));
    }

    #[test]
    fn update_missing_key_fails() {
        let list = SkipList::new(1, 8);
        assert!(!list.update(&key(5), rid(200)));
    }

    #[test]
    fn delete_removes_and_reclaims_slot() {
        let list = SkipList::new(1, 8);
        list.insert(key(5), rid(100));
        assert_eq!(list.len(), 1);
        assert!(list.delete(&key(5)));
        assert_eq!(list.search(&key(5)), None);
        assert_eq!(list.len(), 0);

        // Reclaimed slot is reused rather than growing the arena forever.
        list.insert(key(9), rid(900));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn delete_missing_key_fails() {
        let list = SkipList::new(1, 8);
        assert!(!list.delete(&key(5)));
    }

    #[test]
    fn forward_scan_yields_sorted_order() {
        let list = SkipList::new(1, 8);
        for n in [5u8, 1, 9, 3, 7] {
            list.insert(key(n), rid(n as u64));
        }
        let scanned: Vec<u8> = list
            .forward_scan(None, true, None)
            .into_iter()
            .map(|(k, _)| k[0])
            .collect();
        assert_eq!(scanned, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn forward_scan_inclusive_start_includes_match() {
        let list = SkipList::new(1, 8);
        for n in [1u8, 3, 5, 7] {
            list.insert(key(n), rid(n as u64));
        }
        let scanned: Vec<u8> = list
            .forward_scan(Some(&key(3)), true, None)
            .into_iter()
            .map(|(k, _)| k[0])
            .collect();
        assert_eq!(scanned, vec![3, 5, 7]);
    }

    #[test]
    fn forward_scan_exclusive_start_skips_match() {
        let list = SkipList::new(1, 8);
        for n in [1u8, 3, 5, 7] {
            list.insert(key(n), rid(n as u64));
        }
        let scanned: Vec<u8> = list
            .forward_scan(Some(&key(3)), false, None)
            .into_iter()
            .map(|(k, _)| k[0])
            .collect();
        assert_eq!(scanned, vec![5, 7]);
    }

    #[test]
    fn forward_scan_start_key_not_found_begins_after_it() {
        let list = SkipList::new(1, 8);
        for n in [1u8, 3, 7, 9] {
            list.insert(key(n), rid(n as u64));
        }
        // 5 isn't present; scan should start at the first key greater (7).
        let scanned: Vec<u8> = list
            .forward_scan(Some(&key(5)), true, None)
            .into_iter()
            .map(|(k, _)| k[0])
            .collect();
        assert_eq!(scanned, vec![7, 9]);
    }

    #[test]
    fn forward_scan_respects_limit() {
        let list = SkipList::new(1, 8);
        for n in [1u8, 2, 3, 4, 5] {
            list.insert(key(n), rid(n as u64));
        }
        assert_eq!(list.forward_scan(None, true, Some(0)).len(), 0);
        assert_eq!(list.forward_scan(None, true, Some(2)).len(), 2);
    }

    #[test]
    fn height_never_exceeds_configured_max() {
        let list = SkipList::new(1, 4);
        for n in 0u8..=255 {
            list.insert(key(n), rid(n as u64));
        }
        let inner = list.inner.read();
        assert!(inner.height <= 4);
        for tower in inner.arena.iter().skip(2) {
            assert!(tower.forward.len() <= 4);
        }
    }
}
