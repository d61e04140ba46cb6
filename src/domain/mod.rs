// ==========================================
// 生产看板导入系统 - 领域模型层
// ==========================================
// 职责: 定义导入种类、规范记录、导入结果等领域类型
// 红线: 不含数据访问逻辑,不含导入管道逻辑
// ==========================================

pub mod import;
pub mod record;
pub mod types;

// 重导出核心类型
pub use import::{
    CommitOutcome, Discrepancy, DiscrepancyReport, ImportResult, ImportRunRecord, ImportSource,
    RejectedRow, RunStatus, SourceOrigin,
};
pub use record::{
    CanonicalRecord, DailyMinuteEntry, FieldValue, Fixed4, HeadcountEntry, LogicalKey,
    PerformanceEntry, SourcedRecord, StoredRecord,
};
pub use types::{ChangeKind, DiscrepancyKind, ImportKind, MissingRowPolicy};
