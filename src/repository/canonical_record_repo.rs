// ==========================================
// 生产看板导入系统 - 规范记录 Repository Trait
// ==========================================
// 职责: 定义对账所需的数据访问接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据读写
// ==========================================

use crate::domain::record::{CanonicalRecord, LogicalKey, StoredRecord};
use crate::domain::types::ImportKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use std::collections::BTreeMap;

// ==========================================
// ReconcileScope - 对账范围
// ==========================================
// 同一种类 + 报表期间；range 为 None 表示范围为空（不读取任何已存记录）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileScope {
    pub kind: ImportKind,
    pub range: Option<(NaiveDate, NaiveDate)>,
}

impl ReconcileScope {
    pub fn empty(kind: ImportKind) -> Self {
        Self { kind, range: None }
    }

    pub fn between(kind: ImportKind, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            kind,
            range: Some((from.min(to), from.max(to))),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self.range {
            Some((from, to)) => from <= date && date <= to,
            None => false,
        }
    }
}

// ==========================================
// RecordStore - 事务内的数据访问
// ==========================================
// 只在 run_in_transaction / read_snapshot 的闭包内可见
pub trait RecordStore {
    /// 读取范围内已存记录（逻辑键 → 记录）
    fn load_existing(
        &self,
        scope: &ReconcileScope,
    ) -> RepositoryResult<BTreeMap<LogicalKey, CanonicalRecord>>;

    /// 批量写入（整条替换，不做字段级合并）
    ///
    /// # 返回
    /// - Ok(usize): 写入的记录数
    fn upsert_batch(&self, records: &[CanonicalRecord], run_id: &str) -> RepositoryResult<usize>;

    /// 按逻辑键删除
    fn delete_keys(&self, kind: ImportKind, keys: &[LogicalKey]) -> RepositoryResult<usize>;
}

// ==========================================
// CanonicalRecordRepository Trait
// ==========================================
// 实现者: SqliteCanonicalRecordRepository（使用 rusqlite）
pub trait CanonicalRecordRepository: Send + Sync {
    /// 在单个事务内执行闭包
    ///
    /// - 闭包返回 Ok: 提交
    /// - 闭包返回 Err 或提交失败: 回滚，不留任何部分写入
    fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn RecordStore) -> Result<T, E>,
        E: From<RepositoryError>;

    /// 只读快照：闭包结束后总是回滚
    fn read_snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn RecordStore) -> Result<T, E>,
        E: From<RepositoryError>;

    /// 列出某种类的全部已存记录（按逻辑键排序）
    fn list_records(&self, kind: ImportKind) -> RepositoryResult<Vec<StoredRecord>>;

    /// 统计某种类的已存记录数
    fn count_records(&self, kind: ImportKind) -> RepositoryResult<usize>;
}
