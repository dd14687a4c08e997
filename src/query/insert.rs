use super::literal_bytes;
use crate::error::DbError;
use crate::storage::heap::InsertFileScan;
use crate::storage::page::Rid;
use crate::{Database, Result};

/// One attribute of a tuple to insert, value in textual form.
#[derive(Debug, Clone)]
pub struct AttrValue {
    pub attr_name: String,
    pub value: String,
}

impl AttrValue {
    pub fn new(attr_name: impl Into<String>, value: impl Into<String>) -> AttrValue {
        AttrValue {
            attr_name: attr_name.into(),
            value: value.into(),
        }
    }
}

/// Assemble a record from named attribute values and insert it into
/// `relation`. Every catalog attribute must be supplied (no NULLs); values
/// are matched to attributes by name and converted to the declared types.
pub fn insert_into(db: &Database, relation: &str, values: &[AttrValue]) -> Result<Rid> {
    let attrs = db.catalog().get_rel_info(relation)?;
    if attrs.len() != values.len() {
        return Err(DbError::AttrNotFound(format!(
            "{relation} has {} attributes, {} values given",
            attrs.len(),
            values.len()
        )));
    }

    let rec_len: usize = attrs.iter().map(|a| a.attr_len).sum();
    let mut rec = vec![0u8; rec_len];
    for desc in &attrs {
        let value = values
            .iter()
            .find(|v| v.attr_name == desc.attr_name)
            .ok_or_else(|| DbError::AttrNotFound(format!("{relation}.{}", desc.attr_name)))?;
        let bytes = literal_bytes(desc, &value.value)?;
        rec[desc.attr_offset..desc.attr_offset + desc.attr_len].copy_from_slice(&bytes);
    }

    let mut scan = InsertFileScan::open(db.store(), db.buffer(), relation)?;
    scan.insert_record(&rec)
}
