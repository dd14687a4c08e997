use crate::catalog::AttrType;
use crate::error::DbError;
use crate::storage::buffer::{PageRef, SharedBufMgr};
use crate::storage::disk::{DbFile, FileStore};
use crate::storage::page::{PageNo, Rid, DPFIXED, INVALID_PAGE, NULL_RID, PAGE_SIZE};
use crate::Result;
use std::cmp::Ordering;

/// Width of the file-name field in the header page, terminator included.
pub const MAX_NAME_SIZE: usize = 32;

const OFF_NAME: usize = 0;
const OFF_FIRST_PAGE: usize = 32;
const OFF_LAST_PAGE: usize = 36;
const OFF_PAGE_CNT: usize = 40;
const OFF_REC_CNT: usize = 44;

/// Comparison operator for scan predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Lte,
    Eq,
    Gte,
    Gt,
    Ne,
}

/// The metadata stored on the first page of every heap file. Decoded from
/// and encoded to the pinned header page, never cached per handle, so all
/// open handles observe one copy.
#[derive(Debug, Clone)]
struct FileHeader {
    file_name: String,
    first_page: PageNo,
    last_page: PageNo,
    page_cnt: i32,
    rec_cnt: i32,
}

impl FileHeader {
    fn decode(page: &crate::storage::page::Page) -> FileHeader {
        let bytes = page.bytes();
        let name_field = &bytes[OFF_NAME..OFF_NAME + MAX_NAME_SIZE];
        let end = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_SIZE);
        FileHeader {
            file_name: String::from_utf8_lossy(&name_field[..end]).into_owned(),
            first_page: read_i32(bytes, OFF_FIRST_PAGE),
            last_page: read_i32(bytes, OFF_LAST_PAGE),
            page_cnt: read_i32(bytes, OFF_PAGE_CNT),
            rec_cnt: read_i32(bytes, OFF_REC_CNT),
        }
    }

    fn encode(&self, page: &mut crate::storage::page::Page) {
        let bytes = page.bytes_mut();
        bytes[OFF_NAME..OFF_NAME + MAX_NAME_SIZE].fill(0);
        // Truncate to leave room for the NUL terminator.
        let name = self.file_name.as_bytes();
        let n = name.len().min(MAX_NAME_SIZE - 1);
        bytes[OFF_NAME..OFF_NAME + n].copy_from_slice(&name[..n]);
        write_i32(bytes, OFF_FIRST_PAGE, self.first_page);
        write_i32(bytes, OFF_LAST_PAGE, self.last_page);
        write_i32(bytes, OFF_PAGE_CNT, self.page_cnt);
        write_i32(bytes, OFF_REC_CNT, self.rec_cnt);
    }
}

fn read_i32(bytes: &[u8], off: usize) -> i32 {
    i32::from_le_bytes(bytes[off..off + 4].try_into().unwrap())
}

fn write_i32(bytes: &mut [u8], off: usize, v: i32) {
    bytes[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

/// Create a heap file: the backing file, its header page, and one empty
/// data page. Fails with `FileExists` if the file is already there; any
/// failure after the file was created destroys the partial file.
pub fn create_heap_file(store: &FileStore, buf: &SharedBufMgr, name: &str) -> Result<()> {
    store.create_file(name)?;
    if let Err(e) = init_heap_file(store, buf, name) {
        store.destroy_file(name).ok();
        return Err(e);
    }
    log::debug!("created heap file {name}");
    Ok(())
}

fn init_heap_file(store: &FileStore, buf: &SharedBufMgr, name: &str) -> Result<()> {
    let file = store.open_file(name)?;
    let result = init_heap_pages(buf, &file, name);
    store.close_file(&file).ok();
    result
}

fn init_heap_pages(buf: &SharedBufMgr, file: &DbFile, name: &str) -> Result<()> {
    let mut buf = buf.lock();
    let (hdr_no, hdr_page) = buf.alloc_page(file)?;
    let (data_no, data_page) = match buf.alloc_page(file) {
        Ok(alloc) => alloc,
        Err(e) => {
            buf.unpin_page(file, hdr_no, false).ok();
            return Err(e);
        }
    };

    data_page.write().init(data_no);
    let header = FileHeader {
        file_name: name.to_string(),
        first_page: data_no,
        last_page: data_no,
        page_cnt: 1,
        rec_cnt: 0,
    };
    header.encode(&mut hdr_page.write());

    buf.unpin_page(file, data_no, true)?;
    buf.unpin_page(file, hdr_no, true)?;
    buf.flush_file(file)
}

/// Remove a heap file from the store. Fails if any handle still has it open.
pub fn destroy_heap_file(store: &FileStore, name: &str) -> Result<()> {
    store.destroy_file(name)
}

/// An open heap file: a pinned header page plus at most one pinned data
/// page (the "current" page), both released when the handle drops. The
/// last handle to close a file flushes its frames so a closed heap file is
/// fully on disk.
pub struct HeapFile {
    store: FileStore,
    buf: SharedBufMgr,
    file: DbFile,
    header_page_no: PageNo,
    header: PageRef,
    hdr_dirty: bool,
    cur_page: Option<PageRef>,
    cur_page_no: PageNo,
    cur_dirty: bool,
    cur_rec: Rid,
}

impl HeapFile {
    pub fn open(store: &FileStore, buf: &SharedBufMgr, name: &str) -> Result<HeapFile> {
        let file = store.open_file(name)?;

        let header_page_no = match file.get_first_page() {
            Ok(n) => n,
            Err(e) => {
                store.close_file(&file).ok();
                return Err(e);
            }
        };
        // Bind each read before matching on it: the buffer lock taken in
        // the expression must not still be held inside the error arms.
        let header_read = buf.lock().read_page(&file, header_page_no);
        let header = match header_read {
            Ok(p) => p,
            Err(e) => {
                store.close_file(&file).ok();
                return Err(e);
            }
        };

        let first_page = FileHeader::decode(&header.read()).first_page;
        let cur_page = if first_page == INVALID_PAGE {
            None
        } else {
            let first_read = buf.lock().read_page(&file, first_page);
            match first_read {
                Ok(p) => Some(p),
                Err(e) => {
                    buf.lock().unpin_page(&file, header_page_no, false).ok();
                    store.close_file(&file).ok();
                    return Err(e);
                }
            }
        };

        log::debug!("opened heap file {name}");
        Ok(HeapFile {
            store: store.clone(),
            buf: buf.clone(),
            file,
            header_page_no,
            header,
            hdr_dirty: false,
            cur_page,
            cur_page_no: first_page,
            cur_dirty: false,
            cur_rec: NULL_RID,
        })
    }

    /// Number of live records in the file.
    pub fn rec_cnt(&self) -> i32 {
        FileHeader::decode(&self.header.read()).rec_cnt
    }

    /// Number of linked data pages (the header page not included).
    pub fn page_cnt(&self) -> i32 {
        FileHeader::decode(&self.header.read()).page_cnt
    }

    pub fn first_page(&self) -> PageNo {
        FileHeader::decode(&self.header.read()).first_page
    }

    pub fn last_page(&self) -> PageNo {
        FileHeader::decode(&self.header.read()).last_page
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    /// Fetch the record at `rid`, switching the current page if needed.
    pub fn get_record(&mut self, rid: Rid) -> Result<Vec<u8>> {
        if rid.page_no != self.cur_page_no || self.cur_page.is_none() {
            self.move_to_page(rid.page_no)?;
            self.cur_rec = rid;
        }
        let page = self.current_page();
        let guard = page.read();
        Ok(guard.get_record(rid)?.to_vec())
    }

    /// Unpin the current page (propagating its dirty flag) and pin
    /// `page_no` in its place, clean.
    fn move_to_page(&mut self, page_no: PageNo) -> Result<()> {
        if self.cur_page.take().is_some() {
            self.buf
                .lock()
                .unpin_page(&self.file, self.cur_page_no, self.cur_dirty)?;
        }
        self.cur_dirty = false;
        let page = self.buf.lock().read_page(&self.file, page_no)?;
        self.cur_page = Some(page);
        self.cur_page_no = page_no;
        Ok(())
    }

    /// The pinned current page. Callers ensure one exists first (open and
    /// `move_to_page` both leave the handle positioned on a page).
    fn current_page(&self) -> PageRef {
        self.cur_page
            .as_ref()
            .expect("no current page pinned")
            .clone()
    }

    fn update_header(&mut self, apply: impl FnOnce(&mut FileHeader)) {
        let mut header = FileHeader::decode(&self.header.read());
        apply(&mut header);
        header.encode(&mut self.header.write());
        self.hdr_dirty = true;
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        let mut buf = self.buf.lock();
        if self.cur_page.take().is_some() {
            if let Err(e) = buf.unpin_page(&self.file, self.cur_page_no, self.cur_dirty) {
                log::warn!("unpin of data page {} failed: {e}", self.cur_page_no);
            }
        }
        if let Err(e) = buf.unpin_page(&self.file, self.header_page_no, self.hdr_dirty) {
            log::warn!("unpin of header page failed: {e}");
        }
        if self.store.open_refs(self.file.name()) == 1 {
            if let Err(e) = buf.flush_file(&self.file) {
                log::warn!("flush of {} on close failed: {e}", self.file.name());
            }
        }
        drop(buf);
        if let Err(e) = self.store.close_file(&self.file) {
            log::warn!("close of {} failed: {e}", self.file.name());
        }
        log::debug!("closed heap file {}", self.file.name());
    }
}

struct Filter {
    offset: usize,
    length: usize,
    attr_type: AttrType,
    op: CompareOp,
    value: Vec<u8>,
}

/// A filtered cursor over a heap file, delivering records in (page, slot)
/// order along the page chain. Holds its own open handle.
pub struct HeapFileScan {
    hf: HeapFile,
    filter: Option<Filter>,
    marked_page_no: PageNo,
    marked_rec: Rid,
}

impl HeapFileScan {
    pub fn open(store: &FileStore, buf: &SharedBufMgr, name: &str) -> Result<HeapFileScan> {
        Ok(HeapFileScan {
            hf: HeapFile::open(store, buf, name)?,
            filter: None,
            marked_page_no: INVALID_PAGE,
            marked_rec: NULL_RID,
        })
    }

    /// Install the scan predicate. A `None` literal means no filtering:
    /// every record matches. `Int` and `Float` attributes must be exactly
    /// four bytes, and the literal must be exactly `length` bytes.
    pub fn start_scan(
        &mut self,
        offset: usize,
        length: usize,
        attr_type: AttrType,
        literal: Option<&[u8]>,
        op: CompareOp,
    ) -> Result<()> {
        let Some(literal) = literal else {
            self.filter = None;
            return Ok(());
        };
        if length < 1 {
            return Err(DbError::BadScanParm);
        }
        if matches!(attr_type, AttrType::Int | AttrType::Float) && length != 4 {
            return Err(DbError::BadScanParm);
        }
        if literal.len() != length {
            return Err(DbError::BadScanParm);
        }
        self.filter = Some(Filter {
            offset,
            length,
            attr_type,
            op,
            value: literal.to_vec(),
        });
        Ok(())
    }

    /// Release the scan's data-page pin and forget the scan position.
    pub fn end_scan(&mut self) -> Result<()> {
        if self.hf.cur_page.take().is_some() {
            self.hf
                .buf
                .lock()
                .unpin_page(&self.hf.file, self.hf.cur_page_no, self.hf.cur_dirty)?;
        }
        self.hf.cur_page_no = INVALID_PAGE;
        self.hf.cur_dirty = false;
        self.hf.cur_rec = NULL_RID;
        Ok(())
    }

    /// Snapshot the scan position for a later `reset_scan`.
    pub fn mark_scan(&mut self) {
        self.marked_page_no = self.hf.cur_page_no;
        self.marked_rec = self.hf.cur_rec;
    }

    /// Return to the marked position. Re-pinning a different page
    /// propagates the current page's dirty flag on the way out and comes
    /// back clean.
    pub fn reset_scan(&mut self) -> Result<()> {
        if self.marked_page_no != self.hf.cur_page_no {
            self.hf.move_to_page(self.marked_page_no)?;
        }
        self.hf.cur_rec = self.marked_rec;
        Ok(())
    }

    /// Advance to the next record matching the predicate. `Ok(None)` is
    /// end of file. Pages form a finite acyclic chain and slot counts are
    /// finite, so the walk terminates.
    pub fn scan_next(&mut self) -> Result<Option<Rid>> {
        if self.hf.cur_page.is_none() {
            let first = self.hf.first_page();
            if first == INVALID_PAGE {
                return Ok(None);
            }
            self.hf.move_to_page(first)?;
            self.hf.cur_rec = NULL_RID;
        }

        let mut page = self.hf.current_page();
        let mut candidate = {
            let guard = page.read();
            if self.hf.cur_rec == NULL_RID {
                guard.first_record()
            } else {
                guard.next_record(self.hf.cur_rec)
            }
        };

        loop {
            match candidate {
                Some(rid) => {
                    let guard = page.read();
                    let rec = guard.get_record(rid)?;
                    if self.matches(rec) {
                        self.hf.cur_rec = rid;
                        return Ok(Some(rid));
                    }
                    candidate = guard.next_record(rid);
                }
                None => {
                    let next = page.read().next_page();
                    if next == INVALID_PAGE {
                        return Ok(None);
                    }
                    self.hf.move_to_page(next)?;
                    self.hf.cur_rec = NULL_RID;
                    page = self.hf.current_page();
                    candidate = page.read().first_record();
                }
            }
        }
    }

    /// The record at the current scan position.
    pub fn get_record(&self) -> Result<Vec<u8>> {
        let page = self.hf.cur_page.as_ref().ok_or(DbError::InvalidSlotNo)?;
        let guard = page.read();
        Ok(guard.get_record(self.hf.cur_rec)?.to_vec())
    }

    /// Delete the record at the current scan position. The page is marked
    /// dirty before the mutation and stays dirty even if it fails.
    pub fn delete_record(&mut self) -> Result<()> {
        self.hf.cur_dirty = true;
        let page = self
            .hf
            .cur_page
            .as_ref()
            .ok_or(DbError::InvalidSlotNo)?
            .clone();
        page.write().delete_record(self.hf.cur_rec)?;
        self.hf.update_header(|h| h.rec_cnt -= 1);
        Ok(())
    }

    /// Mark the current page dirty (for callers mutating records in place).
    pub fn mark_dirty(&mut self) {
        self.hf.cur_dirty = true;
    }

    pub fn rec_cnt(&self) -> i32 {
        self.hf.rec_cnt()
    }

    pub fn page_cnt(&self) -> i32 {
        self.hf.page_cnt()
    }

    /// Predicate check. The attribute and literal are copied out of their
    /// unaligned byte positions before comparison; records never get
    /// reinterpreted through pointer casts.
    fn matches(&self, rec: &[u8]) -> bool {
        let Some(f) = &self.filter else {
            return true;
        };
        if f.offset + f.length > rec.len() {
            return false;
        }
        let attr = &rec[f.offset..f.offset + f.length];
        let ord = match f.attr_type {
            AttrType::Int => {
                let a = i32::from_ne_bytes(attr.try_into().unwrap());
                let b = i32::from_ne_bytes(f.value.as_slice().try_into().unwrap());
                a.cmp(&b)
            }
            AttrType::Float => {
                let a = f32::from_ne_bytes(attr.try_into().unwrap());
                let b = f32::from_ne_bytes(f.value.as_slice().try_into().unwrap());
                match a.partial_cmp(&b) {
                    Some(ord) => ord,
                    None => return false,
                }
            }
            AttrType::String => attr.cmp(f.value.as_slice()),
        };
        match f.op {
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ne => ord != Ordering::Equal,
        }
    }
}

/// An open heap file specialized for appending records at the tail of the
/// page chain, growing it when the tail fills up.
pub struct InsertFileScan {
    hf: HeapFile,
}

impl InsertFileScan {
    pub fn open(store: &FileStore, buf: &SharedBufMgr, name: &str) -> Result<InsertFileScan> {
        Ok(InsertFileScan {
            hf: HeapFile::open(store, buf, name)?,
        })
    }

    pub fn insert_record(&mut self, rec: &[u8]) -> Result<Rid> {
        if rec.len() > PAGE_SIZE - DPFIXED {
            return Err(DbError::InvalidRecLen);
        }

        // Inserts only ever extend the chain tail; reposition there if the
        // handle is currently pinned elsewhere.
        let last = self.hf.last_page();
        if self.hf.cur_page.is_none() || self.hf.cur_page_no != last {
            self.hf.move_to_page(last)?;
            self.hf.cur_rec = NULL_RID;
        }

        let page = self.hf.current_page();
        // Bind the attempt so the page's write guard is released before the
        // no-space path takes it again.
        let attempt = page.write().insert_record(rec);
        let rid = match attempt {
            Ok(rid) => rid,
            Err(DbError::NoSpace) => {
                let (new_no, new_page) = self.hf.buf.lock().alloc_page(&self.hf.file)?;
                new_page.write().init(new_no);

                self.hf.update_header(|h| {
                    h.last_page = new_no;
                    h.page_cnt += 1;
                });
                page.write().set_next_page(new_no);
                self.hf.cur_dirty = true;

                self.hf
                    .buf
                    .lock()
                    .unpin_page(&self.hf.file, self.hf.cur_page_no, self.hf.cur_dirty)?;
                self.hf.cur_page = Some(new_page.clone());
                self.hf.cur_page_no = new_no;
                self.hf.cur_dirty = false;

                // A record this size always fits on an empty page.
                let rid = new_page.write().insert_record(rec)?;
                rid
            }
            Err(e) => return Err(e),
        };

        self.hf.update_header(|h| h.rec_cnt += 1);
        self.hf.cur_dirty = true;
        self.hf.cur_rec = rid;
        Ok(rid)
    }

    pub fn rec_cnt(&self) -> i32 {
        self.hf.rec_cnt()
    }

    pub fn page_cnt(&self) -> i32 {
        self.hf.page_cnt()
    }
}
