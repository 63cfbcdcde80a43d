use crate::page_id::{PageId, PAGE_SIZE};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub(crate) type FrameId = usize;

/// One pool slot: a page-sized byte image plus identity, pin count, dirty
/// bit and its own latch (spec §3/§4.1).
///
/// `page_id`/`pin_count`/`dirty` are kept outside the buffer's `RwLock` so
/// identity and pin-count can be read without contending with in-flight
/// latch holders, matching the "stable while pinned" guarantee without
/// requiring every reader to take the frame latch just to ask "what page is
/// this".
pub struct Frame {
    id: FrameId,
    buffer: RwLock<Box<[u8; PAGE_SIZE]>>,
    page_id: Mutex<PageId>,
    pin_count: AtomicU32,
    dirty: AtomicBool,
}

impl Frame {
    pub(crate) fn new(id: FrameId) -> Self {
        Self {
            id,
            buffer: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            page_id: Mutex::new(PageId::INVALID),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.lock()
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        *self.page_id.lock() = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub(crate) fn inc_pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Must not be called on a frame whose pin count is already 0.
    pub(crate) fn dec_pin(&self) -> u32 {
        let prev = self.pin_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
            (c > 0).then_some(c - 1)
        });
        match prev {
            Ok(prev) => prev - 1,
            Err(_) => panic!("frame {} unpinned with pin count already 0", self.id),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Exclusive latch: the returned guard grants mutable access to the
    /// page image. Dropping the guard is the "unlatch".
    pub fn latch(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.buffer.write()
    }

    /// Shared latch for read-only access.
    pub fn rlatch(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.buffer.read()
    }

    /// Only used by the buffer pool during eviction/load, which already
    /// holds the exclusive guard it wants mutated.
    pub(crate) fn reset_identity(&self) {
        *self.page_id.lock() = PageId::INVALID;
        self.dirty.store(false, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frame_is_invalid_and_unpinned() {
        let frame = Frame::new(0);
        assert!(!frame.page_id().is_valid());
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn pin_unpin_round_trips() {
        let frame = Frame::new(0);
        assert_eq!(frame.inc_pin(), 1);
        assert_eq!(frame.inc_pin(), 2);
        assert_eq!(frame.dec_pin(), 1);
        assert_eq!(frame.dec_pin(), 0);
    }

    #[test]
    #[should_panic]
    fn dec_pin_on_zero_panics() {
        let frame = Frame::new(0);
        frame.dec_pin();
    }

    #[test]
    fn latch_grants_mutable_byte_access() {
        let frame = Frame::new(0);
        {
            let mut guard = frame.latch();
            guard[0] = 7;
        }
        assert_eq!(frame.rlatch()[0], 7);
    }
}
