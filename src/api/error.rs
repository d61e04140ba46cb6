// ==========================================
// 生产看板导入系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，统一导入/仓储错误并提供稳定的错误码
// 规则: 结构性错误（工作表/表头/必需列）原样透出，不改写消息
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use serde::Serialize;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 导入管线错误（原样透出）
    // ==========================================
    #[error(transparent)]
    Import(#[from] ImportError),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("任务执行失败: {0}")]
    TaskJoinError(String),

    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("字段{}无法解析: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::TaskJoinError(err.to_string())
    }
}

impl ApiError {
    /// 稳定错误码（供调用方分支判断）
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Import(e) => match e {
                ImportError::SheetNotFound { .. } => "SHEET_NOT_FOUND",
                ImportError::HeaderNotFound { .. } => "HEADER_NOT_FOUND",
                ImportError::UnresolvedRequiredColumn { .. } => "UNRESOLVED_REQUIRED_COLUMN",
                ImportError::ImportInProgress(_) => "IMPORT_IN_PROGRESS",
                ImportError::CommitFailed(_) => "COMMIT_FAILED",
                ImportError::Cancelled => "CANCELLED",
                ImportError::ReviewOutdated { .. } => "REVIEW_OUTDATED",
                ImportError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
                ImportError::FileReadError(_) => "FILE_READ_ERROR",
                ImportError::ExcelParseError(_) => "EXCEL_PARSE_ERROR",
                ImportError::CsvParseError(_) => "CSV_PARSE_ERROR",
                ImportError::Config { .. } => "CONFIG_ERROR",
                ImportError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
                ImportError::Repository(_) => "DATABASE_ERROR",
                ImportError::Other(_) => "IMPORT_ERROR",
            },
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseTransactionError(_) => "DATABASE_TRANSACTION_ERROR",
            ApiError::TaskJoinError(_) => "TASK_JOIN_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Other(_) => "OTHER_ERROR",
        }
    }

    /// 可序列化的错误响应
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            ApiError::Import(ImportError::SheetNotFound { sheet, available }) => {
                Some(serde_json::json!({ "sheet": sheet, "available": available }))
            }
            ApiError::Import(ImportError::HeaderNotFound {
                sheet,
                scan_rows,
                threshold,
                best_ratio,
            }) => Some(serde_json::json!({
                "sheet": sheet,
                "scan_rows": scan_rows,
                "threshold": threshold,
                "best_ratio": best_ratio,
            })),
            ApiError::Import(ImportError::UnresolvedRequiredColumn { sheet, missing }) => {
                Some(serde_json::json!({ "sheet": sheet, "missing": missing }))
            }
            _ => None,
        };

        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
