use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore};

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Create a new SQLite audit store, creating the database file and tables if needed
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path).map_err(|e| AuditError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite audit store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory().map_err(|e| AuditError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), AuditError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                exposure_id TEXT,
                group_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_events_exposure_id ON audit_events(exposure_id);
            CREATE INDEX IF NOT EXISTS idx_audit_events_group_id ON audit_events(group_id);
            CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
            "#,
        )
        .map_err(|e| AuditError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref exposure_id) = filter.exposure_id {
            conditions.push("exposure_id = ?");
            params.push(Box::new(exposure_id.clone()));
        }

        if let Some(ref group_id) = filter.group_id {
            conditions.push("group_id = ?");
            params.push(Box::new(group_id.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<AuditRecord> {
        let id: i64 = row.get(0)?;
        let timestamp_str: String = row.get(1)?;
        let event_type: String = row.get(2)?;
        let exposure_id: Option<String> = row.get(3)?;
        let group_id: Option<String> = row.get(4)?;
        let data_json: String = row.get(5)?;

        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let data: AuditEvent =
            serde_json::from_str(&data_json).unwrap_or(AuditEvent::ServiceStopped {
                reason: "unparseable audit payload".to_string(),
            });

        Ok(AuditRecord {
            id,
            timestamp,
            event_type,
            exposure_id,
            group_id,
            data,
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let conn = self.conn.lock().unwrap();

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, exposure_id, group_id, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.exposure_id,
                record.group_id,
                data_json,
            ],
        )
        .map_err(|e| AuditError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, timestamp, event_type, exposure_id, group_id, data FROM audit_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AuditError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)
            .map_err(|e| AuditError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let record = row_result.map_err(|e| AuditError::Database(e.to_string()))?;
            records.push(record);
        }

        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| AuditError::Database(e.to_string()))?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::FrameType;

    fn ingested_record(exposure_id: &str, group_id: &str) -> AuditRecord {
        AuditRecord {
            id: 0,
            timestamp: Utc::now(),
            event_type: "exposure_ingested".to_string(),
            exposure_id: Some(exposure_id.to_string()),
            group_id: Some(group_id.to_string()),
            data: AuditEvent::ExposureIngested {
                exposure_id: exposure_id.to_string(),
                frame_type: Some(FrameType::Bias),
                group_id: group_id.to_string(),
                usable: true,
            },
        }
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteAuditStore::in_memory().unwrap();

        let id = store.insert(&ingested_record("b1.fits", "G1")).unwrap();
        assert!(id > 0);

        let records = store.query(&AuditFilter::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "exposure_ingested");
        assert_eq!(records[0].exposure_id.as_deref(), Some("b1.fits"));
    }

    #[test]
    fn test_filter_by_exposure_and_group() {
        let store = SqliteAuditStore::in_memory().unwrap();

        store.insert(&ingested_record("b1.fits", "G1")).unwrap();
        store.insert(&ingested_record("b2.fits", "G1")).unwrap();
        store.insert(&ingested_record("b3.fits", "G2")).unwrap();

        let by_exposure = store
            .query(&AuditFilter::new().with_exposure_id("b2.fits"))
            .unwrap();
        assert_eq!(by_exposure.len(), 1);

        let by_group = store
            .query(&AuditFilter::new().with_group_id("G1"))
            .unwrap();
        assert_eq!(by_group.len(), 2);
    }

    #[test]
    fn test_filter_by_event_type_and_count() {
        let store = SqliteAuditStore::in_memory().unwrap();

        store.insert(&ingested_record("b1.fits", "G1")).unwrap();
        store
            .insert(&AuditRecord {
                id: 0,
                timestamp: Utc::now(),
                event_type: "master_built".to_string(),
                exposure_id: None,
                group_id: Some("G1".to_string()),
                data: AuditEvent::MasterBuilt {
                    product_id: "master_bias_G1.fits".to_string(),
                    group_id: "G1".to_string(),
                    frame_type: FrameType::MasterBias,
                    source_count: 7,
                },
            })
            .unwrap();

        let filter = AuditFilter::new().with_event_type("master_built");
        assert_eq!(store.count(&filter).unwrap(), 1);
        let records = store.query(&filter).unwrap();
        assert!(matches!(records[0].data, AuditEvent::MasterBuilt { .. }));
    }

    #[test]
    fn test_pagination() {
        let store = SqliteAuditStore::in_memory().unwrap();

        for i in 0..5 {
            store
                .insert(&ingested_record(&format!("b{}.fits", i), "G1"))
                .unwrap();
        }

        let page = store
            .query(&AuditFilter::new().with_limit(2).with_offset(0))
            .unwrap();
        assert_eq!(page.len(), 2);

        let page = store
            .query(&AuditFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);
    }
}
