use super::{apply_condition, Where};
use crate::catalog::AttrDesc;
use crate::error::DbError;
use crate::storage::heap::{HeapFileScan, InsertFileScan};
use crate::{Database, Result};

/// Project `projections` of every `source` tuple matching `cond` into the
/// `result` relation. Returns the number of tuples inserted.
pub fn select_into(
    db: &Database,
    result: &str,
    source: &str,
    projections: &[&str],
    cond: Option<Where<'_>>,
) -> Result<usize> {
    let proj_descs: Vec<AttrDesc> = projections
        .iter()
        .map(|attr| db.catalog().get_info(source, attr))
        .collect::<Result<_>>()?;
    let out_len: usize = proj_descs.iter().map(|a| a.attr_len).sum();

    let mut result_rel = InsertFileScan::open(db.store(), db.buffer(), result)?;
    let mut scan = HeapFileScan::open(db.store(), db.buffer(), source)?;
    apply_condition(db, &mut scan, source, cond)?;

    let mut out = vec![0u8; out_len];
    let mut inserted = 0;
    while scan.scan_next()?.is_some() {
        let rec = scan.get_record()?;
        let mut off = 0;
        for desc in &proj_descs {
            let end = desc.attr_offset + desc.attr_len;
            let field = rec.get(desc.attr_offset..end).ok_or_else(|| {
                DbError::Storage(format!(
                    "record of {source} shorter than catalog layout for {}",
                    desc.attr_name
                ))
            })?;
            out[off..off + desc.attr_len].copy_from_slice(field);
            off += desc.attr_len;
        }
        result_rel.insert_record(&out)?;
        inserted += 1;
    }
    Ok(inserted)
}
