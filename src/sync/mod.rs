// ==========================================
// 生产看板导入系统 - 同步层
// ==========================================
// 职责: 在线数据源的定时/按需对账，差异交人工审批
// ==========================================

pub mod scheduler;

pub use scheduler::{FileLiveSource, LiveSnapshot, LiveSource, SyncOutcome, SyncScheduler};
