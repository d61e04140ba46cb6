// ==========================================
// 生产看板导入系统 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 红线: 规范记录只由 Upsert 编排器通过事务写入
// ==========================================

pub mod canonical_record_repo;
pub mod canonical_record_repo_impl;
pub mod error;
pub mod import_run_repo;

// 重导出核心仓储
pub use canonical_record_repo::{CanonicalRecordRepository, ReconcileScope, RecordStore};
pub use canonical_record_repo_impl::SqliteCanonicalRecordRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_run_repo::ImportRunRepository;
