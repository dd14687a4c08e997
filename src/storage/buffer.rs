use crate::error::DbError;
use crate::storage::disk::{DbFile, FileId};
use crate::storage::page::{Page, PageNo, INVALID_PAGE};
use crate::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Shared handle to a page resident in the buffer pool. The bytes behind it
/// are only stable while the caller holds a pin on the corresponding
/// (file, page) binding; after the last unpin the frame may be rebound.
pub type PageRef = Arc<RwLock<Page>>;

/// The buffer manager as shared by heap files and operators.
pub type SharedBufMgr = Arc<Mutex<BufMgr>>;

/// Per-frame descriptor, kept in lock-step with the hash table.
struct BufDesc {
    file: Option<DbFile>,
    page_no: PageNo,
    pin_cnt: u32,
    dirty: bool,
    refbit: bool,
    valid: bool,
}

impl BufDesc {
    fn new() -> BufDesc {
        BufDesc {
            file: None,
            page_no: INVALID_PAGE,
            pin_cnt: 0,
            dirty: false,
            refbit: false,
            valid: false,
        }
    }

    /// Bind the frame to (file, page): pinned once, clean, referenced.
    fn set(&mut self, file: DbFile, page_no: PageNo) {
        self.file = Some(file);
        self.page_no = page_no;
        self.pin_cnt = 1;
        self.dirty = false;
        self.refbit = true;
        self.valid = true;
    }

    fn clear(&mut self) {
        *self = BufDesc::new();
    }
}

struct HashEntry {
    file: FileId,
    page_no: PageNo,
    frame: usize,
}

/// Chained hash table from (file identity, page number) to a frame index.
/// It never hands out references into the pool, only indices.
struct BufHashTable {
    buckets: Vec<Vec<HashEntry>>,
}

impl BufHashTable {
    fn new(pool_size: usize) -> BufHashTable {
        // Smallest odd bucket count >= 1.2x the pool size.
        let n = ((pool_size as f64 * 1.2).ceil() as usize) | 1;
        BufHashTable {
            buckets: (0..n).map(|_| Vec::new()).collect(),
        }
    }

    fn bucket(&self, file: FileId, page_no: PageNo) -> usize {
        let key = file.wrapping_mul(31).wrapping_add(page_no as u32 as u64);
        (key % self.buckets.len() as u64) as usize
    }

    fn lookup(&self, file: FileId, page_no: PageNo) -> Option<usize> {
        self.buckets[self.bucket(file, page_no)]
            .iter()
            .find(|e| e.file == file && e.page_no == page_no)
            .map(|e| e.frame)
    }

    fn insert(&mut self, file: FileId, page_no: PageNo, frame: usize) -> Result<()> {
        if self.lookup(file, page_no).is_some() {
            return Err(DbError::HashTblError(format!(
                "duplicate entry for page {page_no} of file {file}"
            )));
        }
        let b = self.bucket(file, page_no);
        self.buckets[b].push(HashEntry {
            file,
            page_no,
            frame,
        });
        Ok(())
    }

    fn remove(&mut self, file: FileId, page_no: PageNo) -> Result<()> {
        let b = self.bucket(file, page_no);
        let chain = &mut self.buckets[b];
        match chain
            .iter()
            .position(|e| e.file == file && e.page_no == page_no)
        {
            Some(i) => {
                chain.swap_remove(i);
                Ok(())
            }
            None => Err(DbError::HashNotFound),
        }
    }
}

/// Fixed-size page cache with clock (second-chance) replacement.
///
/// Frames with a positive pin count are never evicted and never rebound;
/// the dirty flag, once set for a binding, is only cleared by writing the
/// bytes back to the owning file.
pub struct BufMgr {
    frames: Vec<BufDesc>,
    pool: Vec<PageRef>,
    table: BufHashTable,
    clock_hand: usize,
}

impl BufMgr {
    pub fn new(num_bufs: usize) -> BufMgr {
        assert!(num_bufs > 0, "buffer pool needs at least one frame");
        BufMgr {
            frames: (0..num_bufs).map(|_| BufDesc::new()).collect(),
            pool: (0..num_bufs)
                .map(|_| Arc::new(RwLock::new(Page::new())))
                .collect(),
            table: BufHashTable::new(num_bufs),
            // First advance wraps to frame 0.
            clock_hand: num_bufs - 1,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Pin `page_no` of `file` into the pool, reading it from disk on a
    /// miss, and return the shared page handle.
    pub fn read_page(&mut self, file: &DbFile, page_no: PageNo) -> Result<PageRef> {
        if let Some(frame) = self.table.lookup(file.id(), page_no) {
            let desc = &mut self.frames[frame];
            desc.refbit = true;
            desc.pin_cnt += 1;
            return Ok(self.pool[frame].clone());
        }

        let frame = self.alloc_buf()?;
        file.read_page(page_no, &mut self.pool[frame].write())?;
        self.table.insert(file.id(), page_no, frame)?;
        self.frames[frame].set(file.clone(), page_no);
        Ok(self.pool[frame].clone())
    }

    /// Allocate a fresh page in `file` and pin it. The returned page is
    /// zeroed and clean; the caller establishes its contents.
    pub fn alloc_page(&mut self, file: &DbFile) -> Result<(PageNo, PageRef)> {
        let page_no = file.allocate_page()?;
        let frame = self.alloc_buf()?;
        self.pool[frame].write().reset();
        self.table.insert(file.id(), page_no, frame)?;
        self.frames[frame].set(file.clone(), page_no);
        Ok((page_no, self.pool[frame].clone()))
    }

    /// Drop one pin. A true `dirty` marks the frame dirty; false never
    /// clears an existing dirty flag.
    pub fn unpin_page(&mut self, file: &DbFile, page_no: PageNo, dirty: bool) -> Result<()> {
        let frame = self
            .table
            .lookup(file.id(), page_no)
            .ok_or(DbError::HashNotFound)?;
        let desc = &mut self.frames[frame];
        if desc.pin_cnt == 0 {
            return Err(DbError::PageNotPinned);
        }
        desc.pin_cnt -= 1;
        if dirty {
            desc.dirty = true;
        }
        Ok(())
    }

    /// Drop a page from the pool (it must be unpinned) and return it to the
    /// file store's allocator.
    pub fn dispose_page(&mut self, file: &DbFile, page_no: PageNo) -> Result<()> {
        if let Some(frame) = self.table.lookup(file.id(), page_no) {
            debug_assert_eq!(self.frames[frame].pin_cnt, 0, "disposing a pinned page");
            self.frames[frame].clear();
            self.table.remove(file.id(), page_no)?;
        }
        file.dispose_page(page_no)
    }

    /// Write back and release every frame owned by `file`. Fails with
    /// `PagePinned` if any of them is still pinned.
    pub fn flush_file(&mut self, file: &DbFile) -> Result<()> {
        for frame in 0..self.frames.len() {
            let owned = self.frames[frame]
                .file
                .as_ref()
                .is_some_and(|f| f.id() == file.id());
            if !owned {
                continue;
            }
            if !self.frames[frame].valid {
                return Err(DbError::BadBuffer);
            }
            if self.frames[frame].pin_cnt > 0 {
                return Err(DbError::PagePinned);
            }
            let page_no = self.frames[frame].page_no;
            if self.frames[frame].dirty {
                file.write_page(page_no, &self.pool[frame].read())?;
                self.frames[frame].dirty = false;
            }
            self.table.remove(file.id(), page_no)?;
            self.frames[frame].clear();
        }
        Ok(())
    }

    /// Current pin count of a resident page; `None` if not resident.
    pub fn pin_count(&self, file: &DbFile, page_no: PageNo) -> Option<u32> {
        self.table
            .lookup(file.id(), page_no)
            .map(|frame| self.frames[frame].pin_cnt)
    }

    /// Clock sweep. Invalid frames are taken immediately; a set reference
    /// bit buys the frame a second chance; pinned frames are skipped. Only
    /// pinned skips count toward saturation: once more than `n` of them
    /// accumulate the pool is fully pinned and allocation fails.
    fn alloc_buf(&mut self) -> Result<usize> {
        let n = self.frames.len();
        let mut pinned_skips = 0usize;
        loop {
            if pinned_skips > n {
                return Err(DbError::BufferExceeded);
            }
            self.advance_clock();
            let desc = &mut self.frames[self.clock_hand];
            if !desc.valid {
                break;
            }
            if desc.refbit {
                desc.refbit = false;
                continue;
            }
            if desc.pin_cnt > 0 {
                pinned_skips += 1;
                continue;
            }
            break;
        }

        let victim = self.clock_hand;
        if self.frames[victim].valid {
            self.evict(victim)?;
        }
        Ok(victim)
    }

    fn evict(&mut self, frame: usize) -> Result<()> {
        let (file, page_no, dirty) = {
            let desc = &self.frames[frame];
            let file = desc.file.clone().ok_or(DbError::BadBuffer)?;
            (file, desc.page_no, desc.dirty)
        };
        if dirty {
            log::debug!(
                "writing back page {page_no} of {} on eviction from frame {frame}",
                file.name()
            );
            file.write_page(page_no, &self.pool[frame].read())?;
            self.frames[frame].dirty = false;
        }
        self.table.remove(file.id(), page_no)?;
        self.frames[frame].clear();
        Ok(())
    }

    fn advance_clock(&mut self) {
        self.clock_hand = (self.clock_hand + 1) % self.frames.len();
    }
}

impl Drop for BufMgr {
    fn drop(&mut self) {
        for frame in 0..self.frames.len() {
            let desc = &self.frames[frame];
            if !desc.valid {
                continue;
            }
            debug_assert_eq!(
                desc.pin_cnt, 0,
                "page {} still pinned at buffer manager teardown",
                desc.page_no
            );
            if desc.dirty {
                if let Some(file) = &desc.file {
                    if let Err(e) = file.write_page(desc.page_no, &self.pool[frame].read()) {
                        log::warn!(
                            "write-back of page {} of {} failed at teardown: {e}",
                            desc.page_no,
                            file.name()
                        );
                    }
                }
            }
        }
    }
}
