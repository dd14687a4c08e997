pub mod buffer;
pub mod disk;
pub mod heap;
pub mod page;

pub use buffer::{BufMgr, PageRef, SharedBufMgr};
pub use disk::{DbFile, FileId, FileStore};
pub use heap::{
    create_heap_file, destroy_heap_file, CompareOp, HeapFile, HeapFileScan, InsertFileScan,
    MAX_NAME_SIZE,
};
pub use page::{Page, PageNo, Rid, DPFIXED, INVALID_PAGE, NULL_RID, PAGE_SIZE};
