use crate::error::DbError;
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute type codes, matching the on-record representation: `String`
/// is a fixed-width byte field, `Int` and `Float` are four native-endian
/// bytes each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String = 0,
    Int = 1,
    Float = 2,
}

/// Where an attribute lives inside a relation's records.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDesc {
    pub rel_name: String,
    pub attr_name: String,
    pub attr_offset: usize,
    pub attr_len: usize,
    pub attr_type: AttrType,
}

/// In-memory attribute catalog: relation name -> attribute descriptors in
/// definition order.
#[derive(Clone)]
pub struct AttrCatalog {
    rels: Arc<RwLock<HashMap<String, Vec<AttrDesc>>>>,
}

impl AttrCatalog {
    pub fn new() -> AttrCatalog {
        AttrCatalog {
            rels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a relation's layout. Offsets are assigned in definition
    /// order; `Int` and `Float` attributes are always four bytes wide
    /// regardless of the declared length.
    pub fn register_relation(
        &self,
        rel_name: &str,
        attrs: &[(&str, AttrType, usize)],
    ) -> Result<()> {
        let mut rels = self.rels.write();
        if rels.contains_key(rel_name) {
            return Err(DbError::Storage(format!(
                "relation {rel_name} already registered"
            )));
        }

        let mut descs = Vec::with_capacity(attrs.len());
        let mut offset = 0;
        for (attr_name, attr_type, len) in attrs {
            let attr_len = match attr_type {
                AttrType::Int | AttrType::Float => 4,
                AttrType::String => *len,
            };
            descs.push(AttrDesc {
                rel_name: rel_name.to_string(),
                attr_name: attr_name.to_string(),
                attr_offset: offset,
                attr_len,
                attr_type: *attr_type,
            });
            offset += attr_len;
        }
        rels.insert(rel_name.to_string(), descs);
        Ok(())
    }

    pub fn get_info(&self, rel_name: &str, attr_name: &str) -> Result<AttrDesc> {
        let rels = self.rels.read();
        let attrs = rels
            .get(rel_name)
            .ok_or_else(|| DbError::RelNotFound(rel_name.to_string()))?;
        attrs
            .iter()
            .find(|a| a.attr_name == attr_name)
            .cloned()
            .ok_or_else(|| DbError::AttrNotFound(format!("{rel_name}.{attr_name}")))
    }

    /// All attributes of a relation in definition order.
    pub fn get_rel_info(&self, rel_name: &str) -> Result<Vec<AttrDesc>> {
        self.rels
            .read()
            .get(rel_name)
            .cloned()
            .ok_or_else(|| DbError::RelNotFound(rel_name.to_string()))
    }

    /// Total record length of a relation.
    pub fn record_len(&self, rel_name: &str) -> Result<usize> {
        Ok(self.get_rel_info(rel_name)?.iter().map(|a| a.attr_len).sum())
    }

    pub fn drop_relation(&self, rel_name: &str) -> Result<()> {
        self.rels
            .write()
            .remove(rel_name)
            .map(|_| ())
            .ok_or_else(|| DbError::RelNotFound(rel_name.to_string()))
    }
}

impl Default for AttrCatalog {
    fn default() -> Self {
        AttrCatalog::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let cat = AttrCatalog::new();
        cat.register_relation(
            "emp",
            &[
                ("name", AttrType::String, 16),
                ("age", AttrType::Int, 0),
                ("rate", AttrType::Float, 0),
            ],
        )
        .unwrap();

        let name = cat.get_info("emp", "name").unwrap();
        assert_eq!((name.attr_offset, name.attr_len), (0, 16));
        let age = cat.get_info("emp", "age").unwrap();
        assert_eq!((age.attr_offset, age.attr_len), (16, 4));
        let rate = cat.get_info("emp", "rate").unwrap();
        assert_eq!((rate.attr_offset, rate.attr_len), (20, 4));
        assert_eq!(cat.record_len("emp").unwrap(), 24);

        assert!(matches!(
            cat.get_info("emp", "salary"),
            Err(DbError::AttrNotFound(_))
        ));
        assert!(matches!(
            cat.get_info("dept", "name"),
            Err(DbError::RelNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let cat = AttrCatalog::new();
        cat.register_relation("t", &[("v", AttrType::Int, 0)])
            .unwrap();
        assert!(cat.register_relation("t", &[("v", AttrType::Int, 0)]).is_err());
        cat.drop_relation("t").unwrap();
        cat.register_relation("t", &[("v", AttrType::Int, 0)])
            .unwrap();
    }

    #[test]
    fn test_rel_info_definition_order() {
        let cat = AttrCatalog::new();
        cat.register_relation(
            "t",
            &[("a", AttrType::Int, 0), ("b", AttrType::String, 8)],
        )
        .unwrap();
        let attrs = cat.get_rel_info("t").unwrap();
        let names: Vec<&str> = attrs.iter().map(|a| a.attr_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
