// ==========================================
// 生产看板导入系统 - API 层
// ==========================================
// 职责: 提供异步业务接口，供 CLI / 路由处理器调用
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use import_api::{ImportApi, SqliteImportPipeline, SqliteSyncScheduler};
