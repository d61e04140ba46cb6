// ==========================================
// 生产看板导入系统 - 导入层
// ==========================================
// 职责: 表格导出文件 → 规范记录，对账并提交
// 支持: Excel (.xlsx/.xls), CSV
// 流程: file_parser → sheet_locator → field_mapper → dq_validator
//       → conflict_handler → diff_engine → upsert_orchestrator
// ==========================================

// 模块声明
pub mod cell_coercion;
pub mod conflict_handler;
pub mod diff_engine;
pub mod dq_validator;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod import_lock;
pub mod layout;
pub mod pipeline;
pub mod sheet_locator;
pub mod upsert_orchestrator;

// 重导出核心类型
pub use conflict_handler::{ConflictHandler, Deduplicated};
pub use diff_engine::{ChangeSet, DiffEngine};
pub use dq_validator::{DqValidator, ValidationRules};
pub use error::{ImportError, ImportOutcome};
pub use field_mapper::{HeaderMap, RowMapper};
pub use file_parser::{parse_workbook, Workbook};
pub use import_lock::{CancelFlag, ImportContext, ImportLockGuard, ImportLockRegistry};
pub use layout::ImportLayout;
pub use pipeline::{ImportPipeline, PreparedImport};
pub use sheet_locator::{HeaderRule, SheetLocator};
pub use upsert_orchestrator::{ReconcileRequest, UpsertOrchestrator};
