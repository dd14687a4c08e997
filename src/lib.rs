// HeapDB - minimal single-user relational storage engine
// Core library module

pub mod catalog;
pub mod error;
pub mod query;
pub mod storage;

pub use error::{DbError, Result};

use catalog::{AttrCatalog, AttrType};
use parking_lot::Mutex;
use std::sync::Arc;
use storage::buffer::{BufMgr, SharedBufMgr};
use storage::disk::FileStore;
use storage::heap;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub buffer_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            buffer_pool_size: 64,
        }
    }
}

/// The assembled engine: file store, shared buffer pool, and catalog.
/// Heap files and operators borrow these handles; the buffer pool itself
/// is torn down (writing dirty pages back) when the last handle drops.
pub struct Database {
    store: FileStore,
    buf: SharedBufMgr,
    catalog: AttrCatalog,
}

impl Database {
    pub fn open(config: Config) -> Result<Database> {
        Ok(Database {
            store: FileStore::new(config.data_dir.as_str())?,
            buf: Arc::new(Mutex::new(BufMgr::new(config.buffer_pool_size))),
            catalog: AttrCatalog::new(),
        })
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn buffer(&self) -> &SharedBufMgr {
        &self.buf
    }

    pub fn catalog(&self) -> &AttrCatalog {
        &self.catalog
    }

    /// Register a relation in the catalog and create its heap file.
    pub fn create_relation(&self, name: &str, attrs: &[(&str, AttrType, usize)]) -> Result<()> {
        self.catalog.register_relation(name, attrs)?;
        if let Err(e) = heap::create_heap_file(&self.store, &self.buf, name) {
            self.catalog.drop_relation(name).ok();
            return Err(e);
        }
        Ok(())
    }

    /// Drop a relation's heap file and catalog entry.
    pub fn destroy_relation(&self, name: &str) -> Result<()> {
        heap::destroy_heap_file(&self.store, name)?;
        self.catalog.drop_relation(name).ok();
        Ok(())
    }
}
