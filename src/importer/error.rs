// ==========================================
// 生产看板导入系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 行级问题不是错误（进入拒绝列表），这里只有结构性/事务性错误
// ==========================================

use crate::domain::types::ImportKind;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 结构性错误（原样返回给调用方） =====
    #[error("工作表不存在: {sheet}（可用: {}）", .available.join(", "))]
    SheetNotFound { sheet: String, available: Vec<String> },

    #[error(
        "未找到表头: 工作表 {sheet}，扫描前 {scan_rows} 行，阈值 {threshold}，最佳匹配率 {best_ratio:.2}"
    )]
    HeaderNotFound {
        sheet: String,
        scan_rows: usize,
        threshold: f64,
        best_ratio: f64,
    },

    #[error("必需列无法解析 (工作表 {sheet}): {}", .missing.join(", "))]
    UnresolvedRequiredColumn { sheet: String, missing: Vec<String> },

    // ===== 并发 / 事务错误 =====
    #[error("导入进行中: {0}")]
    ImportInProgress(ImportKind),

    #[error("提交失败，事务已回滚: {0}")]
    CommitFailed(String),

    #[error("导入已被取消")]
    Cancelled,

    #[error("审批的差异已过期: 审批 {reviewed} 条，当前 {current} 条")]
    ReviewOutdated { reviewed: usize, current: usize },

    // ===== 文件相关错误 =====
    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 配置错误 =====
    #[error("配置值格式错误 (key: {key}): {message}")]
    Config { key: String, message: String },

    // ===== 同步数据源 =====
    #[error("在线数据源不可用: {0}")]
    SourceUnavailable(String),

    // ===== 存储层 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 结构性错误: 工作簿本身需要修正，重试无意义
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ImportError::SheetNotFound { .. }
                | ImportError::HeaderNotFound { .. }
                | ImportError::UnresolvedRequiredColumn { .. }
                | ImportError::UnsupportedFormat(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

impl From<calamine::XlsxError> for ImportError {
    fn from(err: calamine::XlsxError) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

impl From<calamine::XlsError> for ImportError {
    fn from(err: calamine::XlsError) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportOutcome<T> = Result<T, ImportError>;
