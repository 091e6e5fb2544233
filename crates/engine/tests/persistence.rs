use engine::hash::{format_hex, parse_hex};
use engine::{EngineConfig, EngineError, HmSearch, OpenMode, SearchEngine};
use tempfile::TempDir;

const INSERTED: [&str; 12] = [
    "414F2C9F12625841",
    "DD29B9354FE2BB80",
    "D68F2C1AF77285D9",
    "CBCD1C9D73BA4B18",
    "824EB2B44456DBCD",
    "CD9F03E038366F16",
    "6E32A6B749EDCEC5",
    "D81FBE9ADBF9DCAD",
    "78364579589F20D3",
    "3CA1063EC8C29C2C",
    "3CA1063EC8C29C20",
    "3CA1063EC8C29C21",
];

// Query `i` is `i` bits away from `INSERTED[i]`.
const AT_DISTANCE: [&str; 7] = [
    "414F2C9F12625841",
    "DD29B9354FE0BB80",
    "D68F0C1AF77085D9",
    "CBCD0C9D73B04B18",
    "422EB2B44456DBCD",
    "CD9F030038066F16",
    "6E32A60049EDCEC5",
];

const MISSING: &str = "92EFC9B23AA80608";

fn populated(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("hashes.redb");
    HmSearch::init(&path, &EngineConfig::new(64, 5, 100)).expect("init");

    let db = HmSearch::open(&path, OpenMode::ReadWrite).expect("open read-write");
    for h in INSERTED {
        db.insert(&parse_hex(h).unwrap()).expect("insert");
    }
    db.close().expect("close");
    path
}

#[test]
fn hashes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = populated(&dir);

    let db = HmSearch::open(&path, OpenMode::ReadOnly).expect("reopen");
    assert_eq!(db.config(), &EngineConfig::new(64, 5, 100));

    for (i, query) in AT_DISTANCE.iter().enumerate().take(6) {
        let hits = db.lookup(&parse_hex(query).unwrap(), None).unwrap();
        assert_eq!(hits.len(), 1, "query {i}");
        assert_eq!(format_hex(&hits[0].hash).to_uppercase(), INSERTED[i]);
        assert_eq!(hits[0].distance, i as u32);
    }
}

#[test]
fn beyond_max_error_is_not_found() {
    let dir = TempDir::new().unwrap();
    let db = HmSearch::open(&populated(&dir), OpenMode::ReadOnly).unwrap();
    assert!(db.lookup(&parse_hex(AT_DISTANCE[6]).unwrap(), None).unwrap().is_empty());
}

#[test]
fn smaller_max_error_narrows_results() {
    let dir = TempDir::new().unwrap();
    let db = HmSearch::open(&populated(&dir), OpenMode::ReadOnly).unwrap();

    for (i, query) in AT_DISTANCE.iter().enumerate().take(6) {
        let hits = db.lookup(&parse_hex(query).unwrap(), Some(3)).unwrap();
        if i <= 3 {
            assert_eq!(hits.len(), 1, "query {i}");
            assert_eq!(hits[0].distance, i as u32);
        } else {
            assert!(hits.is_empty(), "query {i}");
        }
    }
}

#[test]
fn missing_hash_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let db = HmSearch::open(&populated(&dir), OpenMode::ReadOnly).unwrap();
    assert!(db.lookup(&parse_hex(MISSING).unwrap(), None).unwrap().is_empty());
}

#[test]
fn near_duplicates_are_all_returned() {
    let dir = TempDir::new().unwrap();
    let db = HmSearch::open(&populated(&dir), OpenMode::ReadOnly).unwrap();

    let hits = db
        .lookup(&parse_hex("3CA1063EC8C29C20").unwrap(), None)
        .unwrap();
    let found: Vec<(String, u32)> = hits
        .iter()
        .map(|h| (format_hex(&h.hash).to_uppercase(), h.distance))
        .collect();
    assert_eq!(
        found,
        vec![
            ("3CA1063EC8C29C20".to_string(), 0),
            ("3CA1063EC8C29C21".to_string(), 1),
            ("3CA1063EC8C29C2C".to_string(), 2),
        ]
    );
}

#[test]
fn read_only_open_rejects_insert() {
    let dir = TempDir::new().unwrap();
    let db = HmSearch::open(&populated(&dir), OpenMode::ReadOnly).unwrap();
    assert_eq!(
        db.insert(&parse_hex(MISSING).unwrap()),
        Err(EngineError::ReadOnly)
    );
}

#[test]
fn init_rejects_invalid_path_and_config() {
    let dir = TempDir::new().unwrap();
    assert!(HmSearch::init(
        &dir.path().join("I/hope/this/wont/exist.redb"),
        &EngineConfig::default()
    )
    .is_err());
    assert!(matches!(
        HmSearch::init(&dir.path().join("bad.redb"), &EngineConfig::new(63, 5, 1)),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn open_missing_database_fails() {
    let dir = TempDir::new().unwrap();
    assert!(HmSearch::open(&dir.path().join("absent.redb"), OpenMode::ReadOnly).is_err());
}
