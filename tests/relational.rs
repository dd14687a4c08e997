// End-to-end scenarios: relations created through the Database facade,
// driven through the insert / delete / select operators and heap-file
// scans.

use heapdb::catalog::AttrType;
use heapdb::query::{delete_where, insert_into, select_into, AttrValue, Where};
use heapdb::storage::{CompareOp, HeapFile, HeapFileScan};
use heapdb::{Config, Database, DbError};
use tempfile::TempDir;

fn open_db(pool: usize) -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(Config {
        data_dir: dir.path().to_str().unwrap().to_string(),
        buffer_pool_size: pool,
    })
    .unwrap();
    (dir, db)
}

fn int_values(db: &Database, rel: &str, values: &[i32]) {
    for v in values {
        insert_into(db, rel, &[AttrValue::new("v", v.to_string())]).unwrap();
    }
}

fn scan_ints(db: &Database, rel: &str) -> Vec<i32> {
    let mut scan = HeapFileScan::open(db.store(), db.buffer(), rel).unwrap();
    let mut out = Vec::new();
    while scan.scan_next().unwrap().is_some() {
        let rec = scan.get_record().unwrap();
        out.push(i32::from_ne_bytes(rec[..4].try_into().unwrap()));
    }
    out
}

#[test]
fn test_create_insert_readback() {
    let (_dir, db) = open_db(16);
    db.create_relation("t", &[("name", AttrType::String, 100)])
        .unwrap();

    for name in ["first", "second", "third"] {
        insert_into(&db, "t", &[AttrValue::new("name", name)]).unwrap();
    }

    let mut scan = HeapFileScan::open(db.store(), db.buffer(), "t").unwrap();
    assert_eq!(scan.rec_cnt(), 3);
    for name in ["first", "second", "third"] {
        scan.scan_next().unwrap().expect("record missing");
        let rec = scan.get_record().unwrap();
        assert_eq!(rec.len(), 100);
        let mut expected = vec![0u8; 100];
        expected[..name.len()].copy_from_slice(name.as_bytes());
        assert_eq!(rec, expected);
    }
    assert!(scan.scan_next().unwrap().is_none());
}

#[test]
fn test_select_with_integer_filter() {
    let (_dir, db) = open_db(16);
    db.create_relation("t", &[("v", AttrType::Int, 0)]).unwrap();
    db.create_relation("r", &[("v", AttrType::Int, 0)]).unwrap();
    int_values(&db, "t", &[1, 2, 3, 2, 4]);

    let n = select_into(
        &db,
        "r",
        "t",
        &["v"],
        Some(Where {
            attr_name: "v",
            op: CompareOp::Eq,
            value: "2",
        }),
    )
    .unwrap();
    assert_eq!(n, 2);
    assert_eq!(scan_ints(&db, "r"), vec![2, 2]);
    // The source is untouched.
    assert_eq!(scan_ints(&db, "t"), vec![1, 2, 3, 2, 4]);
}

#[test]
fn test_select_projection_reorders_fields() {
    let (_dir, db) = open_db(16);
    db.create_relation(
        "emp",
        &[("name", AttrType::String, 8), ("age", AttrType::Int, 0)],
    )
    .unwrap();
    db.create_relation("ages", &[("age", AttrType::Int, 0)])
        .unwrap();

    insert_into(
        &db,
        "emp",
        &[AttrValue::new("name", "ada"), AttrValue::new("age", "36")],
    )
    .unwrap();
    insert_into(
        &db,
        "emp",
        &[AttrValue::new("name", "bob"), AttrValue::new("age", "41")],
    )
    .unwrap();

    let n = select_into(
        &db,
        "ages",
        "emp",
        &["age"],
        Some(Where {
            attr_name: "age",
            op: CompareOp::Gt,
            value: "40",
        }),
    )
    .unwrap();
    assert_eq!(n, 1);
    assert_eq!(scan_ints(&db, "ages"), vec![41]);
}

#[test]
fn test_delete_matching_tuples() {
    let (_dir, db) = open_db(16);
    db.create_relation("t", &[("v", AttrType::Int, 0)]).unwrap();
    int_values(&db, "t", &[1, 2, 3, 2, 4]);

    let deleted = delete_where(
        &db,
        "t",
        Some(Where {
            attr_name: "v",
            op: CompareOp::Eq,
            value: "2",
        }),
    )
    .unwrap();
    assert_eq!(deleted, 2);

    // Survivors keep their page order; the record count reflects the
    // deletions.
    assert_eq!(scan_ints(&db, "t"), vec![1, 3, 4]);
    let hf = HeapFile::open(db.store(), db.buffer(), "t").unwrap();
    assert_eq!(hf.rec_cnt(), 3);
}

#[test]
fn test_delete_without_condition_empties_relation() {
    let (_dir, db) = open_db(16);
    db.create_relation("t", &[("v", AttrType::Int, 0)]).unwrap();
    int_values(&db, "t", &[1, 2, 3]);

    assert_eq!(delete_where(&db, "t", None).unwrap(), 3);
    assert_eq!(scan_ints(&db, "t"), Vec::<i32>::new());

    let hf = HeapFile::open(db.store(), db.buffer(), "t").unwrap();
    assert_eq!(hf.rec_cnt(), 0);
}

#[test]
fn test_cross_page_chain_through_operators() {
    let (_dir, db) = open_db(16);
    // 800-byte records: exactly ten per page, so 25 need three pages.
    db.create_relation("t", &[("pad", AttrType::String, 800)])
        .unwrap();

    for i in 0..25 {
        insert_into(&db, "t", &[AttrValue::new("pad", format!("row-{i:02}"))]).unwrap();
    }

    let hf = HeapFile::open(db.store(), db.buffer(), "t").unwrap();
    assert_eq!(hf.page_cnt(), 3);
    assert_eq!(hf.rec_cnt(), 25);
    drop(hf);

    let mut scan = HeapFileScan::open(db.store(), db.buffer(), "t").unwrap();
    for i in 0..25 {
        scan.scan_next().unwrap().expect("chain lost a record");
        let rec = scan.get_record().unwrap();
        let tag = format!("row-{i:02}");
        assert_eq!(&rec[..tag.len()], tag.as_bytes());
    }
    assert!(scan.scan_next().unwrap().is_none());
}

#[test]
fn test_select_under_buffer_pressure() {
    // Four frames: source header + source data + result header + result
    // data are all pinned while the scan crosses three source pages; page
    // turnover must evict clean unpinned frames rather than fail.
    let (_dir, db) = open_db(4);
    db.create_relation("s", &[("pad", AttrType::String, 800)])
        .unwrap();
    db.create_relation("r", &[("pad", AttrType::String, 800)])
        .unwrap();

    for i in 0..25 {
        insert_into(&db, "s", &[AttrValue::new("pad", format!("row-{i:02}"))]).unwrap();
    }

    let n = select_into(
        &db,
        "r",
        "s",
        &["pad"],
        Some(Where {
            attr_name: "pad",
            op: CompareOp::Lt,
            value: "row-03",
        }),
    )
    .unwrap();
    assert_eq!(n, 3);

    let mut scan = HeapFileScan::open(db.store(), db.buffer(), "r").unwrap();
    let mut seen = 0;
    while scan.scan_next().unwrap().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 3);
}

#[test]
fn test_saturated_pool_reports_buffer_exceeded() {
    let (_dir, db) = open_db(4);
    db.create_relation("s", &[("pad", AttrType::String, 800)])
        .unwrap();
    for i in 0..35 {
        insert_into(&db, "s", &[AttrValue::new("pad", format!("row-{i:02}"))]).unwrap();
    }

    // Header plus four data pages on disk; pin four, and the fifth read
    // has nowhere to go.
    let file = db.store().open_file("s").unwrap();
    let mut buf = db.buffer().lock();
    for p in 0..4 {
        buf.read_page(&file, p).unwrap();
    }
    assert!(matches!(
        buf.read_page(&file, 4),
        Err(DbError::BufferExceeded)
    ));
    for p in 0..4 {
        buf.unpin_page(&file, p, false).unwrap();
    }
    buf.flush_file(&file).unwrap();
    drop(buf);
    db.store().close_file(&file).unwrap();
}

#[test]
fn test_dirty_writeback_observed_by_instrumented_store() {
    let (_dir, db) = open_db(3);
    db.create_relation("t", &[("pad", AttrType::String, 800)])
        .unwrap();

    // Keep one raw handle open so the write counter survives the scans'
    // open/close cycle.
    let probe = db.store().open_file("t").unwrap();
    assert_eq!(probe.write_count(), 0);

    for i in 0..25 {
        insert_into(&db, "t", &[AttrValue::new("pad", format!("row-{i:02}"))]).unwrap();
    }

    // Three frames against four heap pages: insertions evicted dirty
    // pages, so the store has seen writes already.
    assert!(probe.write_count() > 0);

    // The probe held the file open across the scans, so it settles the
    // remaining dirty frames before closing.
    db.buffer().lock().flush_file(&probe).unwrap();
    db.store().close_file(&probe).unwrap();

    let mut scan = HeapFileScan::open(db.store(), db.buffer(), "t").unwrap();
    assert_eq!(scan.rec_cnt(), 25);
    let mut seen = 0;
    while scan.scan_next().unwrap().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 25);
}

#[test]
fn test_insert_validates_against_catalog() {
    let (_dir, db) = open_db(8);
    db.create_relation(
        "t",
        &[("name", AttrType::String, 8), ("v", AttrType::Int, 0)],
    )
    .unwrap();

    // Missing attribute.
    assert!(matches!(
        insert_into(&db, "t", &[AttrValue::new("name", "x")]),
        Err(DbError::AttrNotFound(_))
    ));
    // Wrong attribute name.
    assert!(matches!(
        insert_into(
            &db,
            "t",
            &[AttrValue::new("name", "x"), AttrValue::new("nope", "1")]
        ),
        Err(DbError::AttrNotFound(_))
    ));
    // Unparsable integer.
    assert!(matches!(
        insert_into(
            &db,
            "t",
            &[AttrValue::new("name", "x"), AttrValue::new("v", "abc")]
        ),
        Err(DbError::AttrTypeMismatch(_))
    ));
    // Unknown relation.
    assert!(matches!(
        insert_into(&db, "nope", &[]),
        Err(DbError::RelNotFound(_))
    ));
}

#[test]
fn test_float_predicate_delete() {
    let (_dir, db) = open_db(8);
    db.create_relation("m", &[("reading", AttrType::Float, 0)])
        .unwrap();
    for v in ["1.5", "2.25", "3.75", "0.5"] {
        insert_into(&db, "m", &[AttrValue::new("reading", v)]).unwrap();
    }

    let deleted = delete_where(
        &db,
        "m",
        Some(Where {
            attr_name: "reading",
            op: CompareOp::Gte,
            value: "2.0",
        }),
    )
    .unwrap();
    assert_eq!(deleted, 2);

    let mut scan = HeapFileScan::open(db.store(), db.buffer(), "m").unwrap();
    let mut left = Vec::new();
    while scan.scan_next().unwrap().is_some() {
        let rec = scan.get_record().unwrap();
        left.push(f32::from_ne_bytes(rec[..4].try_into().unwrap()));
    }
    assert_eq!(left, vec![1.5, 0.5]);
}

#[test]
fn test_destroy_relation_requires_closed_file() {
    let (_dir, db) = open_db(8);
    db.create_relation("t", &[("v", AttrType::Int, 0)]).unwrap();

    let hf = HeapFile::open(db.store(), db.buffer(), "t").unwrap();
    assert!(matches!(
        db.destroy_relation("t"),
        Err(DbError::FileOpen(_))
    ));
    drop(hf);

    db.destroy_relation("t").unwrap();
    assert!(HeapFile::open(db.store(), db.buffer(), "t").is_err());
}
