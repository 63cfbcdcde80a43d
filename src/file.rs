//! The file collaborator (spec §6): `BaseFile` in the original source,
//! `PageFile` here. The buffer manager dispatches `load`/`flush` through
//! whatever is registered for a page's `file_id`; this module supplies the
//! trait plus one concrete, on-disk implementation grounded on the
//! teacher's `disk_manager/mod.rs` (one flat file per page, written/read
//! whole).

use crate::page_id::{PageId, PAGE_SIZE};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// External collaborator consumed by the buffer manager. Out of scope for
/// this core per spec §1; specified here only as the trait boundary the
/// buffer manager dispatches through.
pub trait PageFile: Send + Sync {
    fn id(&self) -> u16;
    fn allocate_page(&self) -> PageId;
    fn page_exists(&self, page_id: PageId) -> bool;
    fn load_page(&self, page_id: PageId, out: &mut [u8; PAGE_SIZE]) -> Result<()>;
    fn flush_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;
}

/// One page per flat file under `root/<page_num>`, matching the teacher's
/// `DiskManager` (`write_to_file`/`read_from_file` keyed by page id).
#[derive(Debug)]
pub struct DiskPageFile {
    id: u16,
    root: PathBuf,
    next_page_num: AtomicU64,
}

impl DiskPageFile {
    pub fn new(id: u16, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating file-{id} storage dir at {root:?}"))?;

        let next_page_num = std::fs::read_dir(&root)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
            .filter_map(|name| name.parse::<u64>().ok())
            .max()
            .map_or(0, |max| max + 1);

        Ok(Self {
            id,
            root,
            next_page_num: AtomicU64::new(next_page_num),
        })
    }

    fn path_for(&self, page_num: u64) -> PathBuf {
        self.root.join(page_num.to_string())
    }
}

impl PageFile for DiskPageFile {
    fn id(&self) -> u16 {
        self.id
    }

    fn allocate_page(&self) -> PageId {
        let page_num = self.next_page_num.fetch_add(1, Ordering::SeqCst);
        let page_id = PageId::new(self.id, page_num);

        let path = self.path_for(page_num);
        let blank = [0u8; PAGE_SIZE];
        match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .and_then(|mut f| f.write_all(&blank))
        {
            Ok(()) => page_id,
            Err(_) => PageId::INVALID,
        }
    }

    fn page_exists(&self, page_id: PageId) -> bool {
        page_id.file_id == self.id && self.path_for(page_id.page_num).exists()
    }

    fn load_page(&self, page_id: PageId, out: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if page_id.file_id != self.id {
            return Err(crate::error::Error::InvalidArgument(format!(
                "page {page_id} does not belong to file {}",
                self.id
            ))
            .into());
        }
        let mut file = OpenOptions::new()
            .read(true)
            .open(self.path_for(page_id.page_num))
            .with_context(|| format!("opening page {page_id} for read"))?;
        file.read_exact(out)
            .with_context(|| format!("reading page {page_id}"))?;
        Ok(())
    }

    fn flush_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if page_id.file_id != self.id {
            return Err(crate::error::Error::InvalidArgument(format!(
                "page {page_id} does not belong to file {}",
                self.id
            ))
            .into());
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.path_for(page_id.page_num))
            .with_context(|| format!("opening page {page_id} for write"))?;
        file.write_all(data)
            .with_context(|| format!("writing page {page_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_load_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = DiskPageFile::new(7, dir.path())?;

        let page_id = file.allocate_page();
        assert!(page_id.is_valid());
        assert!(file.page_exists(page_id));

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        file.flush_page(page_id, &data)?;

        let mut out = [0u8; PAGE_SIZE];
        file.load_page(page_id, &mut out)?;
        assert_eq!(out[0], 42);

        Ok(())
    }

    #[test]
    fn load_rejects_foreign_file_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = DiskPageFile::new(1, dir.path()).unwrap();
        let mut out = [0u8; PAGE_SIZE];
        let foreign = PageId::new(2, 0);
        assert!(file.load_page(foreign, &mut out).is_err());
    }
}
