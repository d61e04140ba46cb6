// ==========================================
// 生产看板导入系统 - Upsert 编排器
// ==========================================
// 职责: 在单个事务内读取库中现状、分类、写入（insert + update [+ 删除]）
// 红线:
// - 规范记录只由这里写入
// - 差异读取与写入在同一事务内，避免读后写丢失更新
// - 全部成功或整体失败（CommitFailed），不留部分写入
// - 每个种类同一时刻最多一个导入（锁由本编排器持有）
// - 取消只在写入开始前生效
// ==========================================

use crate::domain::import::Discrepancy;
use crate::domain::record::{LogicalKey, SourcedRecord};
use crate::domain::types::ImportKind;
use crate::importer::diff_engine::{ChangeSet, DiffEngine};
use crate::importer::error::{ImportError, ImportOutcome};
use crate::importer::import_lock::{ImportContext, ImportLockGuard, ImportLockRegistry};
use crate::repository::{CanonicalRecordRepository, ReconcileScope};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// 一次对账请求
#[derive(Debug, Clone, Copy)]
pub struct ReconcileRequest<'a> {
    pub scope: ReconcileScope,
    pub source: &'a BTreeMap<LogicalKey, SourcedRecord>,
    /// 是否删除"库中存在、源表缺失"的记录
    pub apply_removals: bool,
    /// 审批同步: 已审阅的差异；事务内差异与之不一致则不写入
    pub reviewed: Option<&'a [Discrepancy]>,
}

impl ReconcileRequest<'_> {
    pub fn kind(&self) -> ImportKind {
        self.scope.kind
    }
}

/// 提交结果
#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub change_set: ChangeSet,
    pub written: usize,
    pub removed: usize,
}

pub struct UpsertOrchestrator<R: CanonicalRecordRepository> {
    repo: Arc<R>,
    locks: Arc<ImportLockRegistry>,
}

impl<R: CanonicalRecordRepository> UpsertOrchestrator<R> {
    pub fn new(repo: Arc<R>, locks: Arc<ImportLockRegistry>) -> Self {
        Self { repo, locks }
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    /// 获取种类锁；调用方持有 Guard 直到提交结束
    pub fn acquire(&self, kind: ImportKind) -> ImportOutcome<ImportLockGuard> {
        self.locks.try_acquire(kind)
    }

    /// 只读预览: 在快照内读取现状并分类，快照结束即回滚
    pub fn preview(&self, request: &ReconcileRequest<'_>) -> ImportOutcome<ChangeSet> {
        self.repo.read_snapshot(|store| {
            let existing = store.load_existing(&request.scope)?;
            Ok(DiffEngine::classify(request.source, &existing))
        })
    }

    /// 在单个事务内对账并提交
    ///
    /// # 参数
    /// - guard: 该种类的锁（证明调用方已持有）
    /// - run_id: 写入记录的来源运行 ID
    ///
    /// # 错误
    /// - Cancelled: 写入前被取消，事务回滚
    /// - ReviewOutdated: 当前差异与已审阅差异不一致，不写入
    /// - CommitFailed: 任一写入失败，事务回滚
    #[instrument(skip(self, guard, request, ctx), fields(kind = %request.kind(), actor = %ctx.actor))]
    pub fn commit(
        &self,
        guard: &ImportLockGuard,
        request: &ReconcileRequest<'_>,
        ctx: &ImportContext,
        run_id: &str,
    ) -> ImportOutcome<CommitSummary> {
        if guard.kind() != request.kind() {
            return Err(ImportError::Other(anyhow::anyhow!(
                "锁种类 {} 与导入种类 {} 不一致",
                guard.kind(),
                request.kind()
            )));
        }

        let result = self.repo.run_in_transaction(|store| {
            // 步骤 1: 同一事务内读取现状
            let existing = store.load_existing(&request.scope)?;

            // 步骤 2: 分类
            let change_set = DiffEngine::classify(request.source, &existing);

            // 步骤 3: 审批同步只写入已审阅的差异
            if let Some(reviewed) = request.reviewed {
                let current = change_set.to_discrepancies();
                if current.as_slice() != reviewed {
                    return Err(ImportError::ReviewOutdated {
                        reviewed: reviewed.len(),
                        current: current.len(),
                    });
                }
            }

            // 步骤 4: 最后一次取消检查，之后进入写入阶段
            ctx.cancel.check()?;

            // 步骤 5: insert + update（整条替换）
            let written = store.upsert_batch(&change_set.records_to_write(), run_id)?;

            // 步骤 6: 删除（REMOVE 策略或审批同步）
            let removed = if request.apply_removals && !change_set.missing.is_empty() {
                store.delete_keys(request.kind(), &change_set.missing_keys())?
            } else {
                0
            };

            Ok::<_, ImportError>(CommitSummary {
                change_set,
                written,
                removed,
            })
        });

        match result {
            Ok(summary) => {
                info!(
                    inserted = summary.change_set.inserts.len(),
                    updated = summary.change_set.updates.len(),
                    unchanged = summary.change_set.unchanged.len(),
                    missing = summary.change_set.missing.len(),
                    removed = summary.removed,
                    "事务已提交"
                );
                Ok(summary)
            }
            Err(ImportError::Repository(e)) => {
                error!(error = %e, "提交失败，事务已回滚");
                Err(ImportError::CommitFailed(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{CanonicalRecord, DailyMinuteEntry, Fixed4};
    use crate::repository::SqliteCanonicalRecordRepository;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (UpsertOrchestrator<SqliteCanonicalRecordRepository>, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = Arc::new(SqliteCanonicalRecordRepository::from_connection(conn.clone()));
        (
            UpsertOrchestrator::new(repo, Arc::new(ImportLockRegistry::new())),
            conn,
        )
    }

    fn entry(day: u32, operator: &str, ppm: i64) -> CanonicalRecord {
        CanonicalRecord::DailyMinute(DailyMinuteEntry {
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            operator: operator.to_string(),
            shift: "Délelőtt".to_string(),
            pieces_per_minute: Fixed4::from_int(ppm),
            worked_minutes: None,
            machine: None,
        })
    }

    fn source(records: Vec<CanonicalRecord>) -> BTreeMap<LogicalKey, SourcedRecord> {
        records
            .into_iter()
            .enumerate()
            .map(|(i, record)| (record.logical_key(), SourcedRecord { row_number: i + 2, record }))
            .collect()
    }

    fn scope() -> ReconcileScope {
        ReconcileScope::between(
            ImportKind::NapiPerces,
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 31).unwrap(),
        )
    }

    fn commit(
        orch: &UpsertOrchestrator<SqliteCanonicalRecordRepository>,
        src: &BTreeMap<LogicalKey, SourcedRecord>,
        apply_removals: bool,
        ctx: &ImportContext,
    ) -> ImportOutcome<CommitSummary> {
        let guard = orch.acquire(ImportKind::NapiPerces)?;
        orch.commit(
            &guard,
            &ReconcileRequest {
                scope: scope(),
                source: src,
                apply_removals,
                reviewed: None,
            },
            ctx,
            "run-test",
        )
    }

    #[test]
    fn test_commit_then_update_and_retain_missing() {
        let (orch, _conn) = setup();
        let ctx = ImportContext::system();

        let first = commit(&orch, &source(vec![entry(1, "Anna", 120), entry(2, "Béla", 90)]), false, &ctx).unwrap();
        assert_eq!(first.written, 2);

        let second = commit(&orch, &source(vec![entry(1, "Anna", 125)]), false, &ctx).unwrap();
        assert_eq!(second.change_set.updates.len(), 1);
        assert_eq!(second.change_set.missing.len(), 1);
        assert_eq!(second.removed, 0);
        assert_eq!(orch.repo().count_records(ImportKind::NapiPerces).unwrap(), 2);
    }

    #[test]
    fn test_apply_removals_deletes_missing() {
        let (orch, _conn) = setup();
        let ctx = ImportContext::system();
        commit(&orch, &source(vec![entry(1, "Anna", 120), entry(2, "Béla", 90)]), false, &ctx).unwrap();

        let summary = commit(&orch, &source(vec![entry(1, "Anna", 120)]), true, &ctx).unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(orch.repo().count_records(ImportKind::NapiPerces).unwrap(), 1);
    }

    #[test]
    fn test_cancel_before_write_commits_nothing() {
        let (orch, _conn) = setup();
        let ctx = ImportContext::system();
        ctx.cancel.cancel();

        let result = commit(&orch, &source(vec![entry(1, "Anna", 120)]), false, &ctx);
        assert!(matches!(result, Err(ImportError::Cancelled)));
        assert_eq!(orch.repo().count_records(ImportKind::NapiPerces).unwrap(), 0);
        // 锁已释放
        assert!(orch.acquire(ImportKind::NapiPerces).is_ok());
    }

    #[test]
    fn test_write_failure_rolls_back_everything() {
        let (orch, conn) = setup();
        conn.lock()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TRIGGER fail_on_hiba BEFORE INSERT ON canonical_record
                WHEN NEW.logical_key LIKE '%Hiba%'
                BEGIN SELECT RAISE(ABORT, 'forced failure'); END;
                "#,
            )
            .unwrap();

        let ctx = ImportContext::system();
        let result = commit(
            &orch,
            &source(vec![entry(1, "Anna", 120), entry(2, "Hiba", 90)]),
            false,
            &ctx,
        );
        assert!(matches!(result, Err(ImportError::CommitFailed(_))));
        assert_eq!(orch.repo().count_records(ImportKind::NapiPerces).unwrap(), 0);
    }

    #[test]
    fn test_preview_does_not_write() {
        let (orch, _conn) = setup();
        let src = source(vec![entry(1, "Anna", 120)]);
        let change_set = orch
            .preview(&ReconcileRequest {
                scope: scope(),
                source: &src,
                apply_removals: false,
                reviewed: None,
            })
            .unwrap();
        assert_eq!(change_set.inserts.len(), 1);
        assert_eq!(orch.repo().count_records(ImportKind::NapiPerces).unwrap(), 0);
    }

    #[test]
    fn test_reviewed_commit_rejects_unreviewed_changes() {
        let (orch, _conn) = setup();
        let ctx = ImportContext::system();
        commit(&orch, &source(vec![entry(1, "Anna", 120), entry(2, "Béla", 90)]), false, &ctx).unwrap();

        // 审阅时只看到 Anna 的更新
        let reviewed_src = source(vec![entry(1, "Anna", 125), entry(2, "Béla", 90)]);
        let reviewed = orch
            .preview(&ReconcileRequest {
                scope: scope(),
                source: &reviewed_src,
                apply_removals: true,
                reviewed: None,
            })
            .unwrap()
            .to_discrepancies();
        assert_eq!(reviewed.len(), 1);

        // 提交时源表又少了 Béla
        let changed_src = source(vec![entry(1, "Anna", 125)]);
        let guard = orch.acquire(ImportKind::NapiPerces).unwrap();
        let result = orch.commit(
            &guard,
            &ReconcileRequest {
                scope: scope(),
                source: &changed_src,
                apply_removals: true,
                reviewed: Some(&reviewed),
            },
            &ctx,
            "run-approve",
        );
        assert!(matches!(
            result,
            Err(ImportError::ReviewOutdated {
                reviewed: 1,
                current: 2
            })
        ));
        assert_eq!(orch.repo().count_records(ImportKind::NapiPerces).unwrap(), 2);

        // 与审阅一致 → 提交
        let summary = orch
            .commit(
                &guard,
                &ReconcileRequest {
                    scope: scope(),
                    source: &reviewed_src,
                    apply_removals: true,
                    reviewed: Some(&reviewed),
                },
                &ctx,
                "run-approve",
            )
            .unwrap();
        assert_eq!(summary.change_set.updates.len(), 1);
    }
}
