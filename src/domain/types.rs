// ==========================================
// 生产看板导入系统 - 领域类型定义
// ==========================================
// 职责: 导入种类、缺失行策略、差异分类等枚举
// 序列化格式: 与数据库/配置键保持一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入种类 (Import Kind)
// ==========================================
// 一个种类对应一种外部表格布局 + 一份规范记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImportKind {
    /// 每日分钟产量日志
    #[serde(rename = "napi-perces")]
    NapiPerces,
    /// 绩效评分卡
    #[serde(rename = "teljesitmeny")]
    Teljesitmeny,
    /// 作战室班次人数计划
    #[serde(rename = "warroom-letszam")]
    WarroomLetszam,
}

impl ImportKind {
    pub const ALL: [ImportKind; 3] = [
        ImportKind::NapiPerces,
        ImportKind::Teljesitmeny,
        ImportKind::WarroomLetszam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::NapiPerces => "napi-perces",
            ImportKind::Teljesitmeny => "teljesitmeny",
            ImportKind::WarroomLetszam => "warroom-letszam",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "napi-perces" => Some(ImportKind::NapiPerces),
            "teljesitmeny" => Some(ImportKind::Teljesitmeny),
            "warroom-letszam" => Some(ImportKind::WarroomLetszam),
            _ => None,
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 缺失行策略 (Missing Row Policy)
// ==========================================
// 库中存在、源表中缺失的记录如何处理（普通导入）
// 默认 RETAIN: 导入只做新增/修正，不删除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingRowPolicy {
    #[default]
    Retain,
    Remove,
}

impl MissingRowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingRowPolicy::Retain => "RETAIN",
            MissingRowPolicy::Remove => "REMOVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "RETAIN" => Some(MissingRowPolicy::Retain),
            "REMOVE" => Some(MissingRowPolicy::Remove),
            _ => None,
        }
    }
}

// ==========================================
// 变更分类 (Change Kind)
// ==========================================
// 差异引擎对每个逻辑键给出且仅给出一个分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Insert,
    Update,
    NoOp,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "insert"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::NoOp => write!(f, "no-op"),
            ChangeKind::Removed => write!(f, "removed"),
        }
    }
}

// ==========================================
// 差异分类 (Discrepancy Kind)
// ==========================================
// 仅同步调度器使用，供人工审批
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscrepancyKind {
    Added,
    Removed,
    ValueChanged,
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyKind::Added => write!(f, "added"),
            DiscrepancyKind::Removed => write!(f, "removed"),
            DiscrepancyKind::ValueChanged => write!(f, "value-changed"),
        }
    }
}
