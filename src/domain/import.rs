// ==========================================
// 生产看板导入系统 - 导入运行实体
// ==========================================
// 职责: 导入源、导入结果、拒绝行、差异报告、运行记录
// 生命周期: ImportSource 每次调用构造，运行结束即丢弃
// ==========================================

use crate::domain::record::{CanonicalRecord, LogicalKey};
use crate::domain::types::{DiscrepancyKind, ImportKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ==========================================
// SourceOrigin - 表格来源
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    /// 服务器本地文件
    FilePath(PathBuf),
    /// 前端上传（仅保留文件名）
    Upload { file_name: String },
    /// 同步调度器的在线数据源
    Live { descriptor: String },
}

impl SourceOrigin {
    pub fn display_name(&self) -> String {
        match self {
            SourceOrigin::FilePath(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string(),
            SourceOrigin::Upload { file_name } => file_name.clone(),
            SourceOrigin::Live { descriptor } => descriptor.clone(),
        }
    }

    /// 文件扩展名（小写），用于 CSV 判定
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            SourceOrigin::FilePath(path) => path.to_string_lossy().to_string(),
            SourceOrigin::Upload { file_name } => file_name.clone(),
            SourceOrigin::Live { descriptor } => descriptor.clone(),
        };
        Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

// ==========================================
// ImportSource - 导入源（单次运行内不可变）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSource {
    pub kind: ImportKind,
    pub origin: SourceOrigin,
    pub sheet_name: String,
}

impl ImportSource {
    pub fn new(kind: ImportKind, origin: SourceOrigin, sheet_name: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            sheet_name: sheet_name.into(),
        }
    }

    pub fn source_name(&self) -> String {
        self.origin.display_name()
    }
}

// ==========================================
// RejectedRow - 被拒绝的行
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub row_number: usize, // 源表行号（从 1 开始）
    pub reason: String,    // 可读原因
}

// ==========================================
// CommitOutcome - 提交结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitOutcome {
    Committed,
    DryRun,
}

// ==========================================
// ImportResult - 单次运行的结果（返回后不可变）
// ==========================================
// 不含时间戳/运行 ID: 相同输入的预检结果必须完全相同
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub kind: ImportKind,
    pub source_name: String,
    pub sheet_name: String,
    pub header_row: usize,            // 表头所在行（从 1 开始）
    pub total_rows: usize,            // 非空数据行数
    pub valid_rows: usize,            // 去重前通过校验的记录数
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub duplicates_overridden: usize, // 同键后行覆盖前行的次数
    pub missing_from_source: usize,   // 库中存在、源表缺失
    pub removed: usize,               // 删除数（REMOVE 策略或审批同步；预检时为预计数）
    pub rejections: Vec<RejectedRow>,
    pub outcome: CommitOutcome,
}

// ==========================================
// Discrepancy - 同步差异（不自动处理）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub key: LogicalKey,
    pub classification: DiscrepancyKind,
    pub row_number: Option<usize>,
    pub source: Option<CanonicalRecord>,
    pub stored: Option<CanonicalRecord>,
}

// ==========================================
// DiscrepancyReport - 差异报告
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub kind: ImportKind,
    pub source_name: String,
    /// 本次新发现（上次报告未列出）的差异
    pub discrepancies: Vec<Discrepancy>,
    /// 当前全部未处理差异数
    pub outstanding: usize,
    pub rejections: Vec<RejectedRow>,
    pub generated_at: DateTime<Utc>,
}

// ==========================================
// 运行记录（import_run 表）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Committed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Committed => "COMMITTED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "COMMITTED" => RunStatus::Committed,
            "CANCELLED" => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}

/// 一次运行的耗时与 SQL 语句数（语句统计关闭时为 0）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub elapsed_ms: i64,
    pub sql_statements: u64,
    pub slow_sql_statements: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRunRecord {
    pub run_id: String,
    pub kind: ImportKind,
    pub source_name: String,
    pub actor: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub metrics: RunMetrics,
    pub error_message: Option<String>,
    pub result: Option<ImportResult>,
}
