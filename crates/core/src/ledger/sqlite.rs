//! SQLite-backed ledger implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{
    EntryKind, Ledger, LedgerEntry, LedgerError, LedgerFilter, NewFrameRecord, NewProductRecord,
};
use crate::exposure::FrameType;

/// SQLite-backed ledger.
///
/// A single connection behind a mutex serializes all access, which is
/// what makes the count-then-claim sequence in `try_claim_build` atomic.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Create a new SQLite ledger, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                frame_id TEXT NOT NULL UNIQUE,
                frame_type TEXT NOT NULL,
                group_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                kind TEXT NOT NULL,
                source_ids TEXT NOT NULL DEFAULT '[]',
                checksum TEXT NOT NULL,
                usable INTEGER NOT NULL DEFAULT 1,
                superseded INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_entries_type_group ON entries(frame_type, group_id);
            CREATE INDEX IF NOT EXISTS idx_entries_group ON entries(group_id);

            CREATE TABLE IF NOT EXISTS build_claims (
                group_id TEXT NOT NULL,
                frame_type TEXT NOT NULL,
                product_id TEXT NOT NULL,
                claimed_at TEXT NOT NULL,
                PRIMARY KEY (group_id, frame_type)
            );
            "#,
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<LedgerEntry> {
        let id: i64 = row.get(0)?;
        let frame_id: String = row.get(1)?;
        let frame_type_tag: String = row.get(2)?;
        let group_id: String = row.get(3)?;
        let recorded_at_str: String = row.get(4)?;
        let kind_str: String = row.get(5)?;
        let source_ids_json: String = row.get(6)?;
        let checksum: String = row.get(7)?;
        let usable: bool = row.get(8)?;
        let superseded: bool = row.get(9)?;

        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        // Tags are written by us, so these should never fail with valid data
        let frame_type = FrameType::from_tag(&frame_type_tag).unwrap_or(FrameType::Object);
        let kind = EntryKind::from_str(&kind_str).unwrap_or(EntryKind::Raw);
        let source_ids: Vec<String> = serde_json::from_str(&source_ids_json).unwrap_or_default();

        Ok(LedgerEntry {
            id,
            frame_id,
            frame_type,
            group_id,
            recorded_at,
            kind,
            source_ids,
            checksum,
            usable,
            superseded,
        })
    }

    const SELECT_COLS: &'static str =
        "id, frame_id, frame_type, group_id, recorded_at, kind, source_ids, checksum, usable, superseded";

    fn build_where_clause(filter: &LedgerFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(frame_type) = filter.frame_type {
            conditions.push("frame_type = ?");
            params.push(Box::new(frame_type.tag().to_string()));
        }

        if let Some(ref group_id) = filter.group_id {
            conditions.push("group_id = ?");
            params.push(Box::new(group_id.clone()));
        }

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str().to_string()));
        }

        if !filter.include_superseded {
            conditions.push("superseded = 0");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl Ledger for SqliteLedger {
    fn record_frame(&self, record: NewFrameRecord) -> Result<LedgerEntry, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let result = conn.execute(
            "INSERT INTO entries (frame_id, frame_type, group_id, recorded_at, kind, source_ids, checksum, usable, superseded) VALUES (?, ?, ?, ?, 'raw', '[]', ?, ?, 0)",
            params![
                record.frame_id,
                record.frame_type.tag(),
                record.group_id,
                now.to_rfc3339(),
                record.checksum,
                record.usable,
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(LedgerError::Duplicate(record.frame_id));
            }
            Err(e) => return Err(LedgerError::Database(e.to_string())),
        }

        Ok(LedgerEntry {
            id: conn.last_insert_rowid(),
            frame_id: record.frame_id,
            frame_type: record.frame_type,
            group_id: record.group_id,
            recorded_at: now,
            kind: EntryKind::Raw,
            source_ids: Vec::new(),
            checksum: record.checksum,
            usable: record.usable,
            superseded: false,
        })
    }

    fn record_product(&self, record: NewProductRecord) -> Result<LedgerEntry, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let source_ids_json = serde_json::to_string(&record.source_ids)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let result = conn.execute(
            "INSERT INTO entries (frame_id, frame_type, group_id, recorded_at, kind, source_ids, checksum, usable, superseded) VALUES (?, ?, ?, ?, 'product', ?, ?, 1, 0)",
            params![
                record.frame_id,
                record.frame_type.tag(),
                record.group_id,
                now.to_rfc3339(),
                source_ids_json,
                record.checksum,
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(LedgerError::Duplicate(record.frame_id));
            }
            Err(e) => return Err(LedgerError::Database(e.to_string())),
        }

        Ok(LedgerEntry {
            id: conn.last_insert_rowid(),
            frame_id: record.frame_id,
            frame_type: record.frame_type,
            group_id: record.group_id,
            recorded_at: now,
            kind: EntryKind::Product,
            source_ids: record.source_ids,
            checksum: record.checksum,
            usable: true,
            superseded: false,
        })
    }

    fn search(
        &self,
        frame_type: FrameType,
        group_id: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM entries WHERE frame_type = ? AND group_id = ? AND superseded = 0 ORDER BY recorded_at ASC",
            Self::SELECT_COLS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![frame_type.tag(), group_id], Self::row_to_entry)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row_result in rows {
            let entry = row_result.map_err(|e| LedgerError::Database(e.to_string()))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    fn exists(&self, frame_type: FrameType, group_id: &str) -> Result<bool, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE frame_type = ? AND group_id = ? AND superseded = 0",
                params![frame_type.tag(), group_id],
                |row| row.get(0),
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    fn count(&self, frame_type: FrameType, group_id: &str) -> Result<i64, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE frame_type = ? AND group_id = ? AND usable = 1 AND superseded = 0",
                params![frame_type.tag(), group_id],
                |row| row.get(0),
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(count)
    }

    fn contains_frame(&self, frame_id: &str) -> Result<bool, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE frame_id = ?",
                params![frame_id],
                |row| row.get(0),
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    fn try_claim_build(
        &self,
        group_id: &str,
        new_type: FrameType,
        product_id: &str,
        clobber: bool,
    ) -> Result<bool, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO build_claims (group_id, frame_type, product_id, claimed_at) VALUES (?, ?, ?, ?)",
                params![group_id, new_type.tag(), product_id, now.to_rfc3339()],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if inserted > 0 {
            return Ok(true);
        }

        if !clobber {
            return Ok(false);
        }

        // Clobber: retire any live product of this type, take over the claim.
        conn.execute(
            "UPDATE entries SET superseded = 1 WHERE frame_type = ? AND group_id = ? AND kind = 'product' AND superseded = 0",
            params![new_type.tag(), group_id],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE build_claims SET product_id = ?, claimed_at = ? WHERE group_id = ? AND frame_type = ?",
            params![product_id, now.to_rfc3339(), group_id, new_type.tag()],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(true)
    }

    fn release_claim(&self, group_id: &str, new_type: FrameType) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "DELETE FROM build_claims WHERE group_id = ? AND frame_type = ?",
            params![group_id, new_type.tag()],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    fn list(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM entries {} ORDER BY recorded_at DESC, id DESC LIMIT ? OFFSET ?",
            Self::SELECT_COLS,
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_entry)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row_result in rows {
            let entry = row_result.map_err(|e| LedgerError::Database(e.to_string()))?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_ledger() -> SqliteLedger {
        SqliteLedger::in_memory().unwrap()
    }

    fn bias_record(seq: u32, group: &str) -> NewFrameRecord {
        NewFrameRecord {
            frame_id: format!("kb230401_{:05}.fits", seq),
            frame_type: FrameType::Bias,
            group_id: group.to_string(),
            checksum: format!("sha-{}", seq),
            usable: true,
        }
    }

    #[test]
    fn test_record_and_search() {
        let ledger = create_test_ledger();

        ledger.record_frame(bias_record(1, "G1")).unwrap();
        ledger.record_frame(bias_record(2, "G1")).unwrap();
        ledger.record_frame(bias_record(3, "G2")).unwrap();

        let entries = ledger.search(FrameType::Bias, "G1").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.group_id == "G1"));
        assert!(entries.iter().all(|e| e.kind == EntryKind::Raw));
    }

    #[test]
    fn test_duplicate_frame_rejected() {
        let ledger = create_test_ledger();

        ledger.record_frame(bias_record(1, "G1")).unwrap();
        let result = ledger.record_frame(bias_record(1, "G1"));
        assert!(matches!(result, Err(LedgerError::Duplicate(_))));
    }

    #[test]
    fn test_count_excludes_unusable() {
        let ledger = create_test_ledger();

        ledger.record_frame(bias_record(1, "G1")).unwrap();
        ledger.record_frame(bias_record(2, "G1")).unwrap();
        ledger
            .record_frame(NewFrameRecord {
                usable: false,
                ..bias_record(3, "G1")
            })
            .unwrap();

        assert_eq!(ledger.count(FrameType::Bias, "G1").unwrap(), 2);
        // But the frame is still known
        assert!(ledger.contains_frame("kb230401_00003.fits").unwrap());
    }

    #[test]
    fn test_exists_and_contains() {
        let ledger = create_test_ledger();

        assert!(!ledger.exists(FrameType::Bias, "G1").unwrap());
        ledger.record_frame(bias_record(1, "G1")).unwrap();
        assert!(ledger.exists(FrameType::Bias, "G1").unwrap());
        assert!(!ledger.exists(FrameType::Dark, "G1").unwrap());
        assert!(ledger.contains_frame("kb230401_00001.fits").unwrap());
        assert!(!ledger.contains_frame("other.fits").unwrap());
    }

    #[test]
    fn test_record_product_with_sources() {
        let ledger = create_test_ledger();

        for seq in 1..=3 {
            ledger.record_frame(bias_record(seq, "G1")).unwrap();
        }

        let product = ledger
            .record_product(NewProductRecord {
                frame_id: "master_bias_G1.fits".to_string(),
                frame_type: FrameType::MasterBias,
                group_id: "G1".to_string(),
                source_ids: vec![
                    "kb230401_00001.fits".to_string(),
                    "kb230401_00002.fits".to_string(),
                    "kb230401_00003.fits".to_string(),
                ],
                checksum: "sha-master".to_string(),
            })
            .unwrap();

        assert_eq!(product.kind, EntryKind::Product);

        let fetched = ledger.search(FrameType::MasterBias, "G1").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].source_ids.len(), 3);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let ledger = create_test_ledger();

        assert!(ledger
            .try_claim_build("G1", FrameType::MasterBias, "master_bias_G1.fits", false)
            .unwrap());
        // Second claim for the same (group, type) loses
        assert!(!ledger
            .try_claim_build("G1", FrameType::MasterBias, "master_bias_G1.fits", false)
            .unwrap());
        // A different group is independent
        assert!(ledger
            .try_claim_build("G2", FrameType::MasterBias, "master_bias_G2.fits", false)
            .unwrap());
    }

    #[test]
    fn test_clobber_reclaims_and_supersedes() {
        let ledger = create_test_ledger();

        assert!(ledger
            .try_claim_build("G1", FrameType::MasterBias, "master_bias_G1.fits", false)
            .unwrap());
        ledger
            .record_product(NewProductRecord {
                frame_id: "master_bias_G1.fits".to_string(),
                frame_type: FrameType::MasterBias,
                group_id: "G1".to_string(),
                source_ids: vec![],
                checksum: "sha-v1".to_string(),
            })
            .unwrap();

        // With clobber the claim is re-taken and the old product retired
        assert!(ledger
            .try_claim_build("G1", FrameType::MasterBias, "master_bias_G1.v2.fits", true)
            .unwrap());

        assert!(!ledger.exists(FrameType::MasterBias, "G1").unwrap());
        let all = ledger
            .list(
                &LedgerFilter::new()
                    .with_frame_type(FrameType::MasterBias)
                    .include_superseded(),
            )
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].superseded);
    }

    #[test]
    fn test_release_claim_allows_retry() {
        let ledger = create_test_ledger();

        assert!(ledger
            .try_claim_build("G1", FrameType::MasterDark, "master_dark_G1.fits", false)
            .unwrap());
        ledger.release_claim("G1", FrameType::MasterDark).unwrap();
        assert!(ledger
            .try_claim_build("G1", FrameType::MasterDark, "master_dark_G1.fits", false)
            .unwrap());
    }

    #[test]
    fn test_list_with_filters() {
        let ledger = create_test_ledger();

        ledger.record_frame(bias_record(1, "G1")).unwrap();
        ledger
            .record_frame(NewFrameRecord {
                frame_id: "kb230401_00010.fits".to_string(),
                frame_type: FrameType::FlatLamp,
                group_id: "G1".to_string(),
                checksum: "sha-10".to_string(),
                usable: true,
            })
            .unwrap();

        let flats = ledger
            .list(&LedgerFilter::new().with_frame_type(FrameType::FlatLamp))
            .unwrap();
        assert_eq!(flats.len(), 1);

        let in_group = ledger.list(&LedgerFilter::new().with_group("G1")).unwrap();
        assert_eq!(in_group.len(), 2);

        let none = ledger.list(&LedgerFilter::new().with_group("G9")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_list_pagination() {
        let ledger = create_test_ledger();

        for seq in 1..=5 {
            ledger.record_frame(bias_record(seq, "G1")).unwrap();
        }

        let page = ledger
            .list(&LedgerFilter::new().with_limit(2).with_offset(0))
            .unwrap();
        assert_eq!(page.len(), 2);

        let page = ledger
            .list(&LedgerFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_file_based_ledger() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("vela.db");

        let ledger = SqliteLedger::new(&db_path).unwrap();
        ledger.record_frame(bias_record(1, "G1")).unwrap();

        assert!(db_path.exists());
        assert!(ledger.contains_frame("kb230401_00001.fits").unwrap());
    }
}
