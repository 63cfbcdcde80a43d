//! Thin table layer over the buffer manager (spec §6), specified only far
//! enough to reveal the pin/latch/dirty/unpin contract: a fixed-size-record
//! data page, and a directory page tracking each data page's free slot
//! count, grounded on `original_source/Storage/table.cc`.
//!
//! This is deliberately not a general relational tuple format — just enough
//! slotted-page bookkeeping for `Insert`/`Read`/`Update`/`Delete` to exercise
//! the buffer manager end to end.

mod data_page;
mod directory_page;

use crate::buffer::BufferPool;
use crate::file::PageFile;
use crate::page_id::{PageId, Rid};
use parking_lot::Mutex;
use std::sync::Arc;

pub use data_page::RECORD_SIZE;

pub struct Table {
    pool: Arc<BufferPool>,
    data_file_id: u16,
    dir_file_id: u16,
    next_free: Mutex<Option<PageId>>,
    dir_pages: Mutex<Vec<PageId>>,
}

impl Table {
    pub fn new(pool: Arc<BufferPool>, data_file_id: u16, dir_file_id: u16) -> Self {
        Self {
            pool,
            data_file_id,
            dir_file_id,
            next_free: Mutex::new(None),
            dir_pages: Mutex::new(Vec::new()),
        }
    }

    fn data_file(&self) -> Arc<dyn PageFile> {
        self.pool
            .file(self.data_file_id)
            .expect("table's data file not registered with the buffer pool")
    }

    fn dir_file(&self) -> Arc<dyn PageFile> {
        self.pool
            .file(self.dir_file_id)
            .expect("table's directory file not registered with the buffer pool")
    }

    fn dir_location(&self, data_page_num: u64) -> (u64, usize) {
        let per_page = directory_page::ENTRIES_PER_PAGE as u64;
        (
            data_page_num / per_page,
            (data_page_num % per_page) as usize,
        )
    }

    /// Lazily allocates directory pages up to and including `dir_page_num`.
    fn ensure_dir_page(&self, dir_page_num: u64) -> PageId {
        let mut dir_pages = self.dir_pages.lock();
        while (dir_pages.len() as u64) <= dir_page_num {
            let page_id = self.dir_file().allocate_page();
            dir_pages.push(page_id);
        }
        dir_pages[dir_page_num as usize]
    }

    fn init_directory_entry(&self, data_page_num: u64) {
        let (dir_page_num, idx) = self.dir_location(data_page_num);
        let dir_page_id = self.ensure_dir_page(dir_page_num);
        let frame = self
            .pool
            .pin(dir_page_id)
            .expect("directory page must be pinnable right after allocation");
        {
            let mut guard = frame.latch();
            directory_page::set_free_slots(&mut guard, idx, data_page::SLOTS_PER_PAGE as u32);
            frame.set_dirty(true);
        }
        self.pool.unpin(frame);
    }

    fn allocate_data_page(&self) -> PageId {
        let page_id = self.data_file().allocate_page();
        self.init_directory_entry(page_id.page_num);
        page_id
    }

    /// Inserts `record` (at most [`RECORD_SIZE`] bytes) and returns the
    /// [`Rid`] it was stored at, or `None` if the record doesn't fit in a
    /// slot or the buffer pool has no frames to pin a page with.
    pub fn insert(&self, record: &[u8]) -> Option<Rid> {
        if record.len() > data_page::RECORD_SIZE {
            log::debug!("insert: record of {} bytes exceeds slot size", record.len());
            return None;
        }

        loop {
            let page_id = {
                let mut next_free = self.next_free.lock();
                match *next_free {
                    Some(id) => id,
                    None => {
                        let id = self.allocate_data_page();
                        *next_free = Some(id);
                        id
                    }
                }
            };

            let frame = self.pool.pin(page_id)?;
            let rid = {
                let mut guard = frame.latch();
                let num_slots = data_page::num_slots(&guard);
                if (num_slots as usize) < data_page::SLOTS_PER_PAGE {
                    data_page::write_slot(&mut guard, num_slots, record);
                    data_page::set_num_slots(&mut guard, num_slots + 1);
                    frame.set_dirty(true);
                    Some(Rid::new(page_id, num_slots))
                } else {
                    None
                }
            };
            self.pool.unpin(frame);

            match rid {
                Some(rid) => {
                    self.decrement_free_slots(page_id.page_num);
                    return Some(rid);
                }
                None => {
                    // Page filled up since it was marked next_free; allocate
                    // a fresh one and retry, mirroring the original source's
                    // retry-on-full behavior.
                    let fresh = self.allocate_data_page();
                    *self.next_free.lock() = Some(fresh);
                }
            }
        }
    }

    fn decrement_free_slots(&self, data_page_num: u64) {
        let (dir_page_num, idx) = self.dir_location(data_page_num);
        let dir_page_id = self.ensure_dir_page(dir_page_num);
        let Some(frame) = self.pool.pin(dir_page_id) else {
            log::warn!("decrement_free_slots: could not pin directory page {dir_page_id}");
            return;
        };
        {
            let mut guard = frame.latch();
            let current = directory_page::free_slots(&guard, idx);
            directory_page::set_free_slots(&mut guard, idx, current.saturating_sub(1));
            frame.set_dirty(true);
        }
        self.pool.unpin(frame);
    }

    fn increment_free_slots(&self, data_page_num: u64) {
        let (dir_page_num, idx) = self.dir_location(data_page_num);
        let dir_page_id = self.ensure_dir_page(dir_page_num);
        let Some(frame) = self.pool.pin(dir_page_id) else {
            log::warn!("increment_free_slots: could not pin directory page {dir_page_id}");
            return;
        };
        {
            let mut guard = frame.latch();
            let current = directory_page::free_slots(&guard, idx);
            let capacity = data_page::SLOTS_PER_PAGE as u32;
            directory_page::set_free_slots(&mut guard, idx, (current + 1).min(capacity));
            frame.set_dirty(true);
        }
        self.pool.unpin(frame);
    }

    pub fn read(&self, rid: Rid) -> Option<[u8; RECORD_SIZE]> {
        let frame = self.pool.pin(rid.page_id)?;
        let result = {
            let guard = frame.rlatch();
            if rid.slot < data_page::num_slots(&guard) {
                Some(data_page::read_slot(&guard, rid.slot))
            } else {
                None
            }
        };
        self.pool.unpin(frame);
        result
    }

    pub fn update(&self, rid: Rid, record: &[u8]) -> bool {
        if record.len() > data_page::RECORD_SIZE {
            return false;
        }
        let Some(frame) = self.pool.pin(rid.page_id) else {
            return false;
        };
        let updated = {
            let mut guard = frame.latch();
            if rid.slot < data_page::num_slots(&guard) {
                data_page::write_slot(&mut guard, rid.slot, record);
                frame.set_dirty(true);
                true
            } else {
                false
            }
        };
        self.pool.unpin(frame);
        updated
    }

    pub fn delete(&self, rid: Rid) -> bool {
        let Some(frame) = self.pool.pin(rid.page_id) else {
            return false;
        };
        let deleted = {
            let mut guard = frame.latch();
            if rid.slot < data_page::num_slots(&guard) {
                data_page::write_slot(&mut guard, rid.slot, &[0u8; data_page::RECORD_SIZE]);
                frame.set_dirty(true);
                true
            } else {
                false
            }
        };
        self.pool.unpin(frame);
        if deleted {
            self.increment_free_slots(rid.page_id.page_num);
        }
        deleted
    }
}
