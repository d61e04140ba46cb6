// ==========================================
// 生产看板导入系统 - 导入运行记录仓储
// ==========================================
// 职责: 记录每次导入运行，提供"每种类最近一次结果"查询
// 红线: Repository 不做业务逻辑,只做数据映射
// ==========================================

use crate::domain::import::{ImportResult, ImportRunRecord, RunMetrics, RunStatus};
use crate::domain::types::ImportKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct ImportRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportRunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入运行记录
    pub fn insert(&self, run: &ImportRunRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let result_json = match &run.result {
            Some(result) => Some(serde_json::to_string(result)?),
            None => None,
        };

        conn.execute(
            r#"
            INSERT INTO import_run (
                run_id, kind, source_name, actor, status,
                started_at, finished_at, elapsed_ms, sql_statements, slow_sql_statements,
                error_message, result_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                run.run_id,
                run.kind.as_str(),
                run.source_name,
                run.actor,
                run.status.as_str(),
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.metrics.elapsed_ms,
                run.metrics.sql_statements as i64,
                run.metrics.slow_sql_statements as i64,
                run.error_message,
                result_json,
            ],
        )?;

        Ok(())
    }

    /// 某种类最近一次已提交的运行
    pub fn last_committed(&self, kind: ImportKind) -> RepositoryResult<Option<ImportRunRecord>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT run_id, kind, source_name, actor, status,
                       started_at, finished_at, elapsed_ms, sql_statements, slow_sql_statements,
                       error_message, result_json
                FROM import_run
                WHERE kind = ?1 AND status = 'COMMITTED'
                ORDER BY finished_at DESC
                LIMIT 1
                "#,
                params![kind.as_str()],
                RawRunRow::from_row,
            )
            .optional()?;

        raw.map(RawRunRow::into_record).transpose()
    }

    /// 某种类最近的运行记录（含失败/取消）
    pub fn recent(&self, kind: ImportKind, limit: usize) -> RepositoryResult<Vec<ImportRunRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, kind, source_name, actor, status,
                   started_at, finished_at, elapsed_ms, sql_statements, slow_sql_statements,
                       error_message, result_json
            FROM import_run
            WHERE kind = ?1
            ORDER BY finished_at DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt
            .query_map(params![kind.as_str(), limit as i64], RawRunRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRunRow::into_record).collect()
    }
}

// 行 → 记录分两步: rusqlite 闭包内只取原始列，JSON/时间解析在外面做
struct RawRunRow {
    run_id: String,
    kind: String,
    source_name: String,
    actor: String,
    status: String,
    started_at: String,
    finished_at: String,
    elapsed_ms: i64,
    sql_statements: i64,
    slow_sql_statements: i64,
    error_message: Option<String>,
    result_json: Option<String>,
}

impl RawRunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            kind: row.get(1)?,
            source_name: row.get(2)?,
            actor: row.get(3)?,
            status: row.get(4)?,
            started_at: row.get(5)?,
            finished_at: row.get(6)?,
            elapsed_ms: row.get(7)?,
            sql_statements: row.get(8)?,
            slow_sql_statements: row.get(9)?,
            error_message: row.get(10)?,
            result_json: row.get(11)?,
        })
    }

    fn into_record(self) -> RepositoryResult<ImportRunRecord> {
        let kind = ImportKind::parse(&self.kind).ok_or_else(|| RepositoryError::FieldValueError {
            field: "kind".to_string(),
            message: format!("未知导入种类: {}", self.kind),
        })?;
        let result: Option<ImportResult> = match self.result_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok(ImportRunRecord {
            run_id: self.run_id,
            kind,
            source_name: self.source_name,
            actor: self.actor,
            status: RunStatus::from_str(&self.status),
            started_at: parse_ts("started_at", &self.started_at)?,
            finished_at: parse_ts("finished_at", &self.finished_at)?,
            metrics: RunMetrics {
                elapsed_ms: self.elapsed_ms,
                sql_statements: self.sql_statements.max(0) as u64,
                slow_sql_statements: self.slow_sql_statements.max(0) as u64,
            },
            error_message: self.error_message,
            result,
        })
    }
}

fn parse_ts(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::CommitOutcome;
    use chrono::Duration;

    fn setup_repo() -> ImportRunRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ImportRunRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn make_run(run_id: &str, status: RunStatus, offset_secs: i64) -> ImportRunRecord {
        let finished_at = Utc::now() + Duration::seconds(offset_secs);
        ImportRunRecord {
            run_id: run_id.to_string(),
            kind: ImportKind::NapiPerces,
            source_name: "napi.xlsx".to_string(),
            actor: "tester".to_string(),
            status,
            started_at: finished_at,
            finished_at,
            metrics: RunMetrics {
                elapsed_ms: 12,
                sql_statements: 7,
                slow_sql_statements: 0,
            },
            error_message: None,
            result: (status == RunStatus::Committed).then(|| ImportResult {
                kind: ImportKind::NapiPerces,
                source_name: "napi.xlsx".to_string(),
                sheet_name: "Napi percek".to_string(),
                header_row: 3,
                total_rows: 1,
                valid_rows: 1,
                inserted: 1,
                updated: 0,
                unchanged: 0,
                rejected: 0,
                duplicates_overridden: 0,
                missing_from_source: 0,
                removed: 0,
                rejections: vec![],
                outcome: CommitOutcome::Committed,
            }),
        }
    }

    #[test]
    fn test_last_committed_skips_failed_runs() {
        let repo = setup_repo();
        repo.insert(&make_run("r1", RunStatus::Committed, 0)).unwrap();
        repo.insert(&make_run("r2", RunStatus::Failed, 10)).unwrap();

        let last = repo.last_committed(ImportKind::NapiPerces).unwrap().unwrap();
        assert_eq!(last.run_id, "r1");
        assert_eq!(last.metrics.sql_statements, 7);
        assert_eq!(last.result.unwrap().inserted, 1);
        assert!(repo.last_committed(ImportKind::Teljesitmeny).unwrap().is_none());
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let repo = setup_repo();
        repo.insert(&make_run("r1", RunStatus::Committed, 0)).unwrap();
        repo.insert(&make_run("r2", RunStatus::Cancelled, 10)).unwrap();

        let runs = repo.recent(ImportKind::NapiPerces, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "r2");
        assert_eq!(runs[0].status, RunStatus::Cancelled);
    }
}
