//! Process-wide page frame pool (spec §4.2). `BufferPool::pin`/`unpin` are
//! the only entry points the table layer (or anything else) uses to reach a
//! page's byte image.
//!
//! Locking discipline (spec §5): the pool latch (`state: Mutex<PoolState>`)
//! guards the resident map, LRU queue and file registry, and is never held
//! across `load_page`/`flush_page`. A victim frame's own latch is acquired
//! while the pool latch is still held (spec's "atomically taking the frame
//! latch before releasing the pool latch"), then the pool latch is dropped
//! before any I/O runs.

pub mod frame;
mod replacer;

use crate::file::PageFile;
use crate::page_id::{PageId, PAGE_SIZE};
use frame::{Frame, FrameId};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use replacer::{LruReplacer, Replacer};
use std::collections::HashMap;
use std::sync::Arc;

struct PoolState {
    resident: HashMap<PageId, FrameId>,
    lru: Box<dyn Replacer + Send>,
    files: HashMap<u16, Arc<dyn PageFile>>,
}

pub struct BufferPool {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
}

impl BufferPool {
    /// `capacity` is `N` from spec §6's tunables. Every frame starts
    /// unpinned and invalid, and per spec §4.2 step 3 ("the pool keeps all
    /// unused frames enqueued at startup") all of them are seeded directly
    /// into the LRU queue rather than kept in a separate free list.
    pub fn new(capacity: usize) -> Self {
        let frames = (0..capacity).map(Frame::new).collect::<Vec<_>>();
        let mut lru = LruReplacer::new(capacity);
        for id in 0..capacity {
            lru.mark_unpinned(id);
        }

        Self {
            frames,
            state: Mutex::new(PoolState {
                resident: HashMap::new(),
                lru: Box::new(lru),
                files: HashMap::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn register_file(&self, file: Arc<dyn PageFile>) {
        let mut state = self.state.lock();
        state.files.insert(file.id(), file);
    }

    pub fn file(&self, file_id: u16) -> Option<Arc<dyn PageFile>> {
        self.state.lock().files.get(&file_id).cloned()
    }

    /// Returns a pinned frame for `page_id`, or `None` if the id is
    /// invalid, the file isn't registered, I/O fails, or the pool is full
    /// with every frame pinned (spec §4.2).
    pub fn pin(&self, page_id: PageId) -> Option<&Frame> {
        if !page_id.is_valid() {
            log::debug!("pin: rejected invalid page id");
            return None;
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.resident.get(&page_id) {
            state.lru.mark_pinned(frame_id);
            let frame = &self.frames[frame_id];
            let count = frame.inc_pin();
            drop(state);
            log::trace!("pin: {page_id} resident in frame {frame_id}, pin_count={count}");
            return Some(frame);
        }

        let file = match state.files.get(&page_id.file_id).cloned() {
            Some(file) => file,
            None => {
                log::debug!("pin: file {} not registered", page_id.file_id);
                return None;
            }
        };

        if !state.lru.can_evict() {
            log::debug!("pin: pool exhausted, no evictable frame for {page_id}");
            return None;
        }
        let victim_id = state.lru.evict();
        let victim = &self.frames[victim_id];

        // Acquire the frame latch while the pool latch is still held, then
        // release the pool latch before doing any I/O.
        let mut guard = victim.latch();
        let old_page_id = victim.page_id();
        let was_dirty = victim.is_dirty();

        if old_page_id.is_valid() {
            state.resident.remove(&old_page_id);
        }
        state.resident.insert(page_id, victim_id);

        let old_file = if was_dirty {
            state.files.get(&old_page_id.file_id).cloned()
        } else {
            None
        };

        drop(state);

        if was_dirty {
            let flushed = match &old_file {
                Some(f) => f.flush_page(old_page_id, &guard).is_ok(),
                None => false,
            };
            if !flushed {
                log::warn!("pin: write-back of dirty victim {old_page_id} failed, aborting pin of {page_id}");
                drop(guard);
                let mut state = self.state.lock();
                state.resident.remove(&page_id);
                state.resident.insert(old_page_id, victim_id);
                state.lru.requeue_immediate(victim_id);
                return None;
            }
            victim.set_dirty(false);
        }

        if file.load_page(page_id, &mut guard).is_err() {
            log::warn!("pin: load of {page_id} failed");
            drop(guard);
            let mut state = self.state.lock();
            state.resident.remove(&page_id);
            victim.reset_identity();
            state.lru.mark_unpinned(victim_id);
            return None;
        }

        victim.set_page_id(page_id);
        victim.set_dirty(false);
        let count = victim.inc_pin();
        debug_assert_eq!(count, 1, "evicted victim should have had pin count 0");
        drop(guard);

        log::trace!("pin: loaded {page_id} into frame {victim_id}");
        Some(victim)
    }

    /// Must only be called on a frame the caller currently holds a pin on.
    pub fn unpin(&self, frame: &Frame) {
        let count = frame.dec_pin();
        if count == 0 {
            let mut state = self.state.lock();
            state.lru.mark_unpinned(frame.id());
            log::trace!("unpin: frame {} now evictable", frame.id());
        }
    }

    /// Flushes every dirty resident frame. Intended for shutdown; frames
    /// with a nonzero pin count are a contract violation by the caller and
    /// are flushed anyway rather than silently dropped.
    pub fn flush_all(&self) -> anyhow::Result<()> {
        let state = self.state.lock();
        for (&page_id, &frame_id) in state.resident.iter() {
            let frame = &self.frames[frame_id];
            if !frame.is_dirty() {
                continue;
            }
            if frame.pin_count() > 0 {
                log::warn!("flush_all: frame {frame_id} ({page_id}) still pinned at shutdown");
            }
            let guard = frame.rlatch();
            if let Some(file) = state.files.get(&page_id.file_id) {
                file.flush_page(page_id, &guard)?;
                drop(guard);
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn frame_for(&self, page_id: PageId) -> Option<&Frame> {
        let state = self.state.lock();
        state.resident.get(&page_id).map(|&id| &self.frames[id])
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(err) = self.flush_all() {
            log::error!("buffer pool shutdown flush failed: {err}");
        }
    }
}

lazy_static! {
    static ref GLOBAL: Mutex<Option<Arc<BufferPool>>> = Mutex::new(None);
}

/// Thin ambient accessor (spec §9's rewrite strategy): callers that want a
/// process-wide instance install one explicitly rather than relying on a
/// hardcoded default, keeping construction (pool size, registered files)
/// under the owner's control.
pub fn install_global(pool: Arc<BufferPool>) {
    *GLOBAL.lock() = Some(pool);
}

pub fn global() -> Arc<BufferPool> {
    GLOBAL
        .lock()
        .clone()
        .expect("buffer pool global accessed before install_global()")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::DiskPageFile;

    fn pool_with_file(capacity: usize) -> (BufferPool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = BufferPool::new(capacity);
        let file = Arc::new(DiskPageFile::new(0, dir.path()).unwrap());
        pool.register_file(file);
        (pool, dir)
    }

    #[test]
    fn pin_unregistered_file_fails() {
        let pool = BufferPool::new(1);
        assert!(pool.pin(PageId::new(9, 0)).is_none());
    }

    #[test]
    fn pin_invalid_page_id_fails() {
        let pool = BufferPool::new(1);
        assert!(pool.pin(PageId::INVALID).is_none());
    }

    #[test]
    fn pin_allocates_and_reads_back() {
        let (pool, _dir) = pool_with_file(2);
        let file = pool.state.lock().files.get(&0).unwrap().clone();
        let p1 = file.allocate_page();

        let frame = pool.pin(p1).expect("pin should succeed");
        assert_eq!(frame.page_id(), p1);
        assert_eq!(frame.pin_count(), 1);
        pool.unpin(frame);
    }

    #[test]
    fn repeated_pin_returns_same_frame_and_increments_count() {
        let (pool, _dir) = pool_with_file(2);
        let file = pool.state.lock().files.get(&0).unwrap().clone();
        let p1 = file.allocate_page();

        let f1 = pool.pin(p1).unwrap();
        let f2 = pool.pin(p1).unwrap();
        assert_eq!(f1.id(), f2.id());
        assert_eq!(f1.pin_count(), 2);
        pool.unpin(f1);
        pool.unpin(f2);
        assert_eq!(f1.pin_count(), 0);
    }

    #[test]
    fn even_pin_unpin_pairs_leave_zero_pin_counts() {
        let (pool, _dir) = pool_with_file(2);
        let file = pool.state.lock().files.get(&0).unwrap().clone();
        let p1 = file.allocate_page();

        for _ in 0..5 {
            let f = pool.pin(p1).unwrap();
            pool.unpin(f);
        }
        assert_eq!(pool.pin(p1).unwrap().pin_count(), 1);
    }

    #[test]
    fn pinned_frame_is_not_evicted() {
        let (pool, _dir) = pool_with_file(1);
        let file = pool.state.lock().files.get(&0).unwrap().clone();
        let p1 = file.allocate_page();
        let p2 = file.allocate_page();

        let _f1 = pool.pin(p1).unwrap();
        assert!(pool.pin(p2).is_none());
    }

    #[test]
    fn pool_size_two_eviction_scenario() {
        // Scenario 4: pool size 2, three pages; pin P1, pin P2, unpin P1,
        // pin P3 evicts P1; resident set becomes {P2, P3}.
        let (pool, _dir) = pool_with_file(2);
        let file = pool.state.lock().files.get(&0).unwrap().clone();
        let (p1, p2, p3) = (
            file.allocate_page(),
            file.allocate_page(),
            file.allocate_page(),
        );

        let f1 = pool.pin(p1).unwrap();
        let _f2 = pool.pin(p2).unwrap();
        pool.unpin(f1);
        let _f3 = pool.pin(p3).unwrap();

        assert!(pool.frame_for(p1).is_none());
        assert!(pool.frame_for(p2).is_some());
        assert!(pool.frame_for(p3).is_some());
    }

    #[test]
    fn dirty_victim_is_flushed_exactly_once_on_eviction() {
        let (pool, _dir) = pool_with_file(1);
        let file = pool.state.lock().files.get(&0).unwrap().clone();
        let p1 = file.allocate_page();
        let p2 = file.allocate_page();

        let f1 = pool.pin(p1).unwrap();
        {
            let mut guard = f1.latch();
            guard[0] = 9;
            f1.set_dirty(true);
        }
        pool.unpin(f1);

        // Forces eviction of p1's frame.
        let f2 = pool.pin(p2).unwrap();
        pool.unpin(f2);

        let mut out = [0u8; PAGE_SIZE];
        file.load_page(p1, &mut out).unwrap();
        assert_eq!(out[0], 9);
    }

    #[test]
    fn pool_exhaustion_then_recovery() {
        // Scenario 6.
        let (pool, _dir) = pool_with_file(1);
        let file = pool.state.lock().files.get(&0).unwrap().clone();
        let p1 = file.allocate_page();
        let p2 = file.allocate_page();

        let f1 = pool.pin(p1).unwrap();
        assert!(pool.pin(p2).is_none());
        pool.unpin(f1);
        assert!(pool.pin(p2).is_some());
    }
}
