// ==========================================
// 生产看板导入系统 - 规范记录 Repository 实现
// ==========================================
// 职责: 实现对账相关数据访问（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据读写
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::{CanonicalRecord, LogicalKey, StoredRecord};
use crate::domain::types::ImportKind;
use crate::repository::canonical_record_repo::{
    CanonicalRecordRepository, ReconcileScope, RecordStore,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// SqliteRecordStore - 事务内访问器
// ==========================================
struct SqliteRecordStore<'a> {
    conn: &'a Connection,
}

impl RecordStore for SqliteRecordStore<'_> {
    fn load_existing(
        &self,
        scope: &ReconcileScope,
    ) -> RepositoryResult<BTreeMap<LogicalKey, CanonicalRecord>> {
        let (from, to) = match scope.range {
            Some(range) => range,
            None => return Ok(BTreeMap::new()),
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT logical_key, payload_json
            FROM canonical_record
            WHERE kind = ?1 AND scope_date BETWEEN ?2 AND ?3
            ORDER BY logical_key
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![
                    scope.kind.as_str(),
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string(),
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut existing = BTreeMap::new();
        for (key, payload) in rows {
            let record: CanonicalRecord = serde_json::from_str(&payload)?;
            existing.insert(LogicalKey::from(key), record);
        }
        Ok(existing)
    }

    fn upsert_batch(&self, records: &[CanonicalRecord], run_id: &str) -> RepositoryResult<usize> {
        let mut stmt = self.conn.prepare(
            r#"
            INSERT INTO canonical_record (
                kind, logical_key, scope_date, payload_json, source_run_id, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kind, logical_key) DO UPDATE SET
                scope_date = excluded.scope_date,
                payload_json = excluded.payload_json,
                source_run_id = excluded.source_run_id,
                updated_at = excluded.updated_at
            "#,
        )?;

        let now = Utc::now().to_rfc3339();
        let mut count = 0;
        for record in records {
            stmt.execute(params![
                record.kind().as_str(),
                record.logical_key().as_str(),
                record.scope_date().format("%Y-%m-%d").to_string(),
                serde_json::to_string(record)?,
                run_id,
                now,
            ])?;
            count += 1;
        }

        Ok(count)
    }

    fn delete_keys(&self, kind: ImportKind, keys: &[LogicalKey]) -> RepositoryResult<usize> {
        let mut stmt = self
            .conn
            .prepare("DELETE FROM canonical_record WHERE kind = ?1 AND logical_key = ?2")?;

        let mut count = 0;
        for key in keys {
            count += stmt.execute(params![kind.as_str(), key.as_str()])?;
        }
        Ok(count)
    }
}

// ==========================================
// SqliteCanonicalRecordRepository
// ==========================================
pub struct SqliteCanonicalRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCanonicalRecordRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与其他仓储共享同一连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl CanonicalRecordRepository for SqliteCanonicalRecordRepository {
    fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn RecordStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let conn = self.get_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        // 闭包失败时 tx 被 drop，自动回滚
        let value = f(&SqliteRecordStore { conn: &*tx })?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(value)
    }

    fn read_snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn RecordStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let conn = self.get_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let value = f(&SqliteRecordStore { conn: &*tx });

        tx.rollback()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        value
    }

    fn list_records(&self, kind: ImportKind) -> RepositoryResult<Vec<StoredRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT logical_key, payload_json FROM canonical_record WHERE kind = ?1 ORDER BY logical_key",
        )?;

        let rows = stmt
            .query_map(params![kind.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, payload)| {
                Ok(StoredRecord {
                    key: LogicalKey::from(key),
                    record: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }

    fn count_records(&self, kind: ImportKind) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM canonical_record WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{DailyMinuteEntry, Fixed4};
    use chrono::NaiveDate;

    fn setup_repo() -> SqliteCanonicalRecordRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        SqliteCanonicalRecordRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn entry(day: u32, operator: &str, ppm: i64) -> CanonicalRecord {
        CanonicalRecord::DailyMinute(DailyMinuteEntry {
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            operator: operator.to_string(),
            shift: "Délelőtt".to_string(),
            pieces_per_minute: Fixed4::from_int(ppm),
            worked_minutes: Some(480),
            machine: None,
        })
    }

    fn october() -> ReconcileScope {
        ReconcileScope::between(
            ImportKind::NapiPerces,
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 31).unwrap(),
        )
    }

    #[test]
    fn test_upsert_then_load_within_scope() {
        let repo = setup_repo();
        repo.run_in_transaction(|store| {
            store.upsert_batch(&[entry(1, "Anna", 120), entry(2, "Béla", 90)], "run-1")
        })
        .unwrap();

        let loaded = repo
            .read_snapshot::<_, RepositoryError, _>(|store| store.load_existing(&october()))
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(repo.count_records(ImportKind::NapiPerces).unwrap(), 2);
        assert_eq!(repo.count_records(ImportKind::Teljesitmeny).unwrap(), 0);
    }

    #[test]
    fn test_upsert_replaces_whole_record() {
        let repo = setup_repo();
        repo.run_in_transaction(|store| store.upsert_batch(&[entry(1, "Anna", 120)], "run-1"))
            .unwrap();
        repo.run_in_transaction(|store| store.upsert_batch(&[entry(1, "Anna", 125)], "run-2"))
            .unwrap();

        let records = repo.list_records(ImportKind::NapiPerces).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record, entry(1, "Anna", 125));
    }

    #[test]
    fn test_failed_closure_rolls_back() {
        let repo = setup_repo();
        let result: Result<(), RepositoryError> = repo.run_in_transaction(|store| {
            store.upsert_batch(&[entry(1, "Anna", 120)], "run-1")?;
            Err(RepositoryError::InternalError("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(repo.count_records(ImportKind::NapiPerces).unwrap(), 0);
    }

    #[test]
    fn test_read_snapshot_never_persists_writes() {
        let repo = setup_repo();
        repo.read_snapshot::<_, RepositoryError, _>(|store| {
            store.upsert_batch(&[entry(1, "Anna", 120)], "run-1")
        })
        .unwrap();
        assert_eq!(repo.count_records(ImportKind::NapiPerces).unwrap(), 0);
    }

    #[test]
    fn test_delete_keys() {
        let repo = setup_repo();
        let record = entry(3, "Csaba", 100);
        let key = record.logical_key();
        repo.run_in_transaction(|store| store.upsert_batch(&[record], "run-1"))
            .unwrap();

        let deleted = repo
            .run_in_transaction(|store| store.delete_keys(ImportKind::NapiPerces, &[key]))
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.count_records(ImportKind::NapiPerces).unwrap(), 0);
    }
}
