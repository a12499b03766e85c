//! Record manager - fixed-width slotted heap files
//!
//! One heap file per table. Records are fixed-width byte arrays matching the
//! table's column layout, stored in 4 KiB pages of equal-size slots and
//! addressed by a stable `Rid`. Pages live in memory; durable page I/O and
//! the buffer pool belong to the embedding system.

pub mod error;

pub use error::{StorageError, StorageResult};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Page capacity in bytes
pub const PAGE_SIZE: usize = 4096;

/// Row identifier: a stable handle on a record slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid {
    pub page_no: u32,
    pub slot_no: u32,
}

impl Rid {
    pub const MIN: Rid = Rid {
        page_no: 0,
        slot_no: 0,
    };
    pub const MAX: Rid = Rid {
        page_no: u32::MAX,
        slot_no: u32::MAX,
    };

    pub fn new(page_no: u32, slot_no: u32) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot_no)
    }
}

/// One page of equal-size slots
#[derive(Debug, Default)]
struct Page {
    slots: Vec<Option<Vec<u8>>>,
    live: usize,
}

/// Heap file for one table
#[derive(Debug)]
pub struct TableFile {
    record_len: usize,
    slots_per_page: usize,
    pages: RwLock<Vec<Page>>,
}

impl TableFile {
    fn new(record_len: usize) -> StorageResult<Self> {
        if record_len == 0 || record_len > PAGE_SIZE {
            return Err(StorageError::RecordTooLarge {
                len: record_len,
                max: PAGE_SIZE,
            });
        }
        Ok(Self {
            record_len,
            slots_per_page: PAGE_SIZE / record_len,
            pages: RwLock::new(Vec::new()),
        })
    }

    /// Byte width of records in this file
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// Record slots per page
    pub fn records_per_page(&self) -> usize {
        self.slots_per_page
    }

    /// Number of allocated pages
    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }

    fn check_len(&self, data: &[u8]) -> StorageResult<()> {
        if data.len() != self.record_len {
            return Err(StorageError::WrongRecordSize {
                expected: self.record_len,
                got: data.len(),
            });
        }
        Ok(())
    }

    /// Fetch a record image by rid
    pub fn get(&self, rid: Rid) -> StorageResult<Vec<u8>> {
        let pages = self.pages.read();
        pages
            .get(rid.page_no as usize)
            .and_then(|p| p.slots.get(rid.slot_no as usize))
            .and_then(|slot| slot.clone())
            .ok_or(StorageError::RecordNotFound(rid))
    }

    /// Insert a record, returning its rid. The first free slot in page
    /// order is reused before a new page is allocated.
    pub fn insert(&self, data: &[u8]) -> StorageResult<Rid> {
        self.check_len(data)?;
        let mut pages = self.pages.write();

        for (page_no, page) in pages.iter_mut().enumerate() {
            if page.live < page.slots.len() {
                for (slot_no, slot) in page.slots.iter_mut().enumerate() {
                    if slot.is_none() {
                        *slot = Some(data.to_vec());
                        page.live += 1;
                        return Ok(Rid::new(page_no as u32, slot_no as u32));
                    }
                }
            }
            if page.slots.len() < self.slots_per_page {
                page.slots.push(Some(data.to_vec()));
                page.live += 1;
                return Ok(Rid::new(page_no as u32, page.slots.len() as u32 - 1));
            }
        }

        let mut page = Page::default();
        page.slots.push(Some(data.to_vec()));
        page.live = 1;
        pages.push(page);
        Ok(Rid::new(pages.len() as u32 - 1, 0))
    }

    /// Delete the record at rid
    pub fn delete(&self, rid: Rid) -> StorageResult<()> {
        let mut pages = self.pages.write();
        let page = pages
            .get_mut(rid.page_no as usize)
            .ok_or(StorageError::RecordNotFound(rid))?;
        let slot = page
            .slots
            .get_mut(rid.slot_no as usize)
            .ok_or(StorageError::RecordNotFound(rid))?;
        if slot.take().is_none() {
            return Err(StorageError::RecordNotFound(rid));
        }
        page.live -= 1;
        Ok(())
    }

    /// Overwrite the record at rid in place
    pub fn update(&self, rid: Rid, data: &[u8]) -> StorageResult<()> {
        self.check_len(data)?;
        let mut pages = self.pages.write();
        let slot = pages
            .get_mut(rid.page_no as usize)
            .and_then(|p| p.slots.get_mut(rid.slot_no as usize))
            .ok_or(StorageError::RecordNotFound(rid))?;
        if slot.is_none() {
            return Err(StorageError::RecordNotFound(rid));
        }
        *slot = Some(data.to_vec());
        Ok(())
    }

    /// Open a physical-order scan over the live records of this file.
    /// The scan snapshots the rid list at open time.
    pub fn scan(&self) -> RecordScan {
        let pages = self.pages.read();
        let mut rids = Vec::new();
        for (page_no, page) in pages.iter().enumerate() {
            for (slot_no, slot) in page.slots.iter().enumerate() {
                if slot.is_some() {
                    rids.push(Rid::new(page_no as u32, slot_no as u32));
                }
            }
        }
        RecordScan { rids, pos: 0 }
    }
}

/// Physical-order iterator over the rids of a heap file
#[derive(Debug)]
pub struct RecordScan {
    rids: Vec<Rid>,
    pos: usize,
}

impl RecordScan {
    /// The rid under the cursor; only valid while `is_end` is false
    pub fn rid(&self) -> Rid {
        self.rids[self.pos]
    }

    /// Advance the cursor
    pub fn next(&mut self) {
        if self.pos < self.rids.len() {
            self.pos += 1;
        }
    }

    /// True once the cursor has moved past the last record
    pub fn is_end(&self) -> bool {
        self.pos >= self.rids.len()
    }
}

/// Registry of heap files, one per table
#[derive(Debug, Default)]
pub struct RecordManager {
    files: RwLock<HashMap<String, Arc<TableFile>>>,
}

impl RecordManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the heap file for a new table
    pub fn create_file(&self, table: &str, record_len: usize) -> StorageResult<()> {
        let mut files = self.files.write();
        if files.contains_key(table) {
            return Err(StorageError::TableExists(table.to_string()));
        }
        files.insert(table.to_string(), Arc::new(TableFile::new(record_len)?));
        Ok(())
    }

    /// Remove a table's heap file
    pub fn drop_file(&self, table: &str) -> StorageResult<()> {
        self.files
            .write()
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    /// Open a table's heap file
    pub fn open(&self, table: &str) -> StorageResult<Arc<TableFile>> {
        self.files
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }
}
