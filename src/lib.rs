// ==========================================
// 生产看板导入系统 - 核心库
// ==========================================
// 职责: 外部表格导出 → 规范记录的导入、对账与同步
// 技术栈: Rust + SQLite (rusqlite) + calamine/csv
// 系统定位: 人工可审批的批量导入（不做实时流式导入）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 同步层 - 在线数据源对账
pub mod sync;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计（SQL 计数/慢查询）
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ChangeKind, DiscrepancyKind, ImportKind, MissingRowPolicy};

// 领域实体
pub use domain::{
    CanonicalRecord, Discrepancy, DiscrepancyReport, ImportResult, ImportSource, LogicalKey,
    RejectedRow, SourceOrigin,
};

// 导入管线
pub use importer::{ImportContext, ImportError, ImportOutcome, ImportPipeline};

// 同步
pub use sync::{SyncOutcome, SyncScheduler};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "生产看板导入系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
