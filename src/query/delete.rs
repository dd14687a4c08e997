use super::{apply_condition, Where};
use crate::storage::heap::HeapFileScan;
use crate::{Database, Result};

/// Delete every tuple of `relation` matching `cond`; no condition deletes
/// them all. Returns the number of tuples removed.
pub fn delete_where(db: &Database, relation: &str, cond: Option<Where<'_>>) -> Result<usize> {
    let mut scan = HeapFileScan::open(db.store(), db.buffer(), relation)?;
    apply_condition(db, &mut scan, relation, cond)?;

    let mut deleted = 0;
    while scan.scan_next()?.is_some() {
        scan.delete_record()?;
        deleted += 1;
    }
    Ok(deleted)
}
