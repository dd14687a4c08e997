//! Relational operators: build-and-insert a tuple, delete matching tuples,
//! and project-select into a result relation. All three drive heap-file
//! scans and look attribute layouts up in the catalog.

mod delete;
mod insert;
mod select;

pub use delete::delete_where;
pub use insert::{insert_into, AttrValue};
pub use select::select_into;

use crate::catalog::{AttrDesc, AttrType};
use crate::error::DbError;
use crate::storage::heap::{CompareOp, HeapFileScan};
use crate::{Database, Result};

/// A single-attribute comparison, `attr op value`, with the value in its
/// textual form. The attribute's declared type decides how the value is
/// converted.
#[derive(Debug, Clone, Copy)]
pub struct Where<'a> {
    pub attr_name: &'a str,
    pub op: CompareOp,
    pub value: &'a str,
}

/// Convert a textual literal into the on-record byte form of `desc`'s
/// type: strings are zero-padded (or truncated) to the attribute width,
/// numbers are parsed and stored as native-endian bytes.
fn literal_bytes(desc: &AttrDesc, raw: &str) -> Result<Vec<u8>> {
    match desc.attr_type {
        AttrType::Int => {
            let v: i32 = raw
                .trim()
                .parse()
                .map_err(|_| DbError::AttrTypeMismatch(format!("{raw:?} is not an integer")))?;
            Ok(v.to_ne_bytes().to_vec())
        }
        AttrType::Float => {
            let v: f32 = raw
                .trim()
                .parse()
                .map_err(|_| DbError::AttrTypeMismatch(format!("{raw:?} is not a float")))?;
            Ok(v.to_ne_bytes().to_vec())
        }
        AttrType::String => {
            let mut out = vec![0u8; desc.attr_len];
            let bytes = raw.as_bytes();
            let n = bytes.len().min(desc.attr_len);
            out[..n].copy_from_slice(&bytes[..n]);
            Ok(out)
        }
    }
}

/// Start `scan` with the given condition, or unpredicated when there is
/// none (the operator and type play no role in that case).
fn apply_condition(
    db: &Database,
    scan: &mut HeapFileScan,
    relation: &str,
    cond: Option<Where<'_>>,
) -> Result<()> {
    match cond {
        None => scan.start_scan(0, 0, AttrType::String, None, CompareOp::Eq),
        Some(w) => {
            let desc = db.catalog().get_info(relation, w.attr_name)?;
            let literal = literal_bytes(&desc, w.value)?;
            scan.start_scan(
                desc.attr_offset,
                desc.attr_len,
                desc.attr_type,
                Some(&literal),
                w.op,
            )
        }
    }
}
