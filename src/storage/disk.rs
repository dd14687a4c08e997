use crate::error::DbError;
use crate::storage::page::{Page, PageNo, INVALID_PAGE, PAGE_SIZE};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of an open file, stable for as long as the file stays open.
/// Reopening a fully closed file yields a fresh id.
pub type FileId = u64;

struct AllocState {
    num_pages: u32,
    free: Vec<PageNo>,
}

struct FileInner {
    id: FileId,
    name: String,
    file: Mutex<File>,
    alloc: Mutex<AllocState>,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// Handle to an open page file. Cheap to clone; all clones share the same
/// descriptor and page allocator, so a handle held by the buffer pool can
/// still write back pages after the owner has logically closed the file.
#[derive(Clone)]
pub struct DbFile(Arc<FileInner>);

impl DbFile {
    pub fn id(&self) -> FileId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Page number of the logically first page of the file. Heap files keep
    /// their header there.
    pub fn get_first_page(&self) -> Result<PageNo> {
        let alloc = self.0.alloc.lock();
        if alloc.num_pages == 0 {
            return Err(DbError::Storage(format!("file {} is empty", self.0.name)));
        }
        Ok(0)
    }

    /// Allocate a page: reuse a disposed one if available, otherwise extend
    /// the file with a zeroed page.
    pub fn allocate_page(&self) -> Result<PageNo> {
        let mut alloc = self.0.alloc.lock();
        if let Some(page_no) = alloc.free.pop() {
            return Ok(page_no);
        }
        let page_no = alloc.num_pages as PageNo;
        alloc.num_pages += 1;
        drop(alloc);

        let zeroes = [0u8; PAGE_SIZE];
        let mut file = self.0.file.lock();
        file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        file.write_all(&zeroes)?;
        Ok(page_no)
    }

    /// Return a page to the allocator. The free list is in-memory only; the
    /// store is not durable beyond explicit page writes.
    pub fn dispose_page(&self, page_no: PageNo) -> Result<()> {
        let mut alloc = self.0.alloc.lock();
        if page_no == INVALID_PAGE || page_no as u32 >= alloc.num_pages {
            return Err(DbError::Storage(format!(
                "dispose of page {page_no} outside file {}",
                self.0.name
            )));
        }
        alloc.free.push(page_no);
        Ok(())
    }

    pub fn read_page(&self, page_no: PageNo, page: &mut Page) -> Result<()> {
        let mut file = self.0.file.lock();
        file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        file.read_exact(page.bytes_mut())?;
        self.0.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn write_page(&self, page_no: PageNo, page: &Page) -> Result<()> {
        let mut file = self.0.file.lock();
        file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        file.write_all(page.bytes())?;
        self.0.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of `read_page` calls issued on this handle's file since it
    /// was opened. Tests use this to tell cache hits from misses.
    pub fn read_count(&self) -> u64 {
        self.0.reads.load(Ordering::Relaxed)
    }

    /// Number of `write_page` calls issued on this handle's file since it
    /// was opened. Tests use this to observe dirty write-back.
    pub fn write_count(&self) -> u64 {
        self.0.writes.load(Ordering::Relaxed)
    }
}

struct OpenEntry {
    file: DbFile,
    refs: u32,
}

/// A directory of page files with an open-file table. Opening a name that
/// is already open returns the same shared handle, so every component sees
/// one identity per file.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    open: Arc<Mutex<HashMap<String, OpenEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<FileStore> {
        let root = dir.into();
        std::fs::create_dir_all(&root)?;
        Ok(FileStore {
            root,
            open: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn create_file(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        if path.exists() {
            return Err(DbError::FileExists(name.to_string()));
        }
        File::create(&path)?;
        log::debug!("created file {name}");
        Ok(())
    }

    pub fn destroy_file(&self, name: &str) -> Result<()> {
        if self.open.lock().contains_key(name) {
            return Err(DbError::FileOpen(name.to_string()));
        }
        std::fs::remove_file(self.path_of(name))?;
        log::debug!("destroyed file {name}");
        Ok(())
    }

    pub fn open_file(&self, name: &str) -> Result<DbFile> {
        let mut open = self.open.lock();
        if let Some(entry) = open.get_mut(name) {
            entry.refs += 1;
            return Ok(entry.file.clone());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path_of(name))?;
        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        let handle = DbFile(Arc::new(FileInner {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            file: Mutex::new(file),
            alloc: Mutex::new(AllocState {
                num_pages,
                free: Vec::new(),
            }),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }));
        open.insert(
            name.to_string(),
            OpenEntry {
                file: handle.clone(),
                refs: 1,
            },
        );
        Ok(handle)
    }

    pub fn close_file(&self, file: &DbFile) -> Result<()> {
        let mut open = self.open.lock();
        let entry = open
            .get_mut(file.name())
            .ok_or_else(|| DbError::Storage(format!("close of unopened file {}", file.name())))?;
        entry.refs -= 1;
        if entry.refs == 0 {
            open.remove(file.name());
        }
        Ok(())
    }

    /// How many `open_file` calls are outstanding for `name`.
    pub fn open_refs(&self, name: &str) -> u32 {
        self.open.lock().get(name).map_or(0, |e| e.refs)
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}
