// ==========================================
// 生产看板导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管线所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{ImportKind, MissingRowPolicy};
use crate::importer::dq_validator::ValidationRules;
use crate::importer::error::ImportOutcome;
use crate::importer::sheet_locator::HeaderRule;
use async_trait::async_trait;

/// 班次默认取值
pub const DEFAULT_SHIFT_VALUES: [&str; 3] = ["Délelőtt", "Délután", "Éjszaka"];

/// 岗位默认取值
pub const DEFAULT_POSITION_VALUES: [&str; 6] = [
    "Gépkezelő",
    "Operátor",
    "Csoportvezető",
    "Minőségellenőr",
    "Anyagmozgató",
    "Karbantartó",
];

/// 同步默认间隔（秒）
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 900;

// ==========================================
// ImportSettings - 单个种类的导入配置
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub kind: ImportKind,
    /// 默认工作表名（ImportSource 未指定时使用）
    pub sheet_name: String,
    pub header_rule: HeaderRule,
    pub missing_row_policy: MissingRowPolicy,
    pub validation: ValidationRules,
}

impl ImportSettings {
    pub fn default_sheet_name(kind: ImportKind) -> &'static str {
        match kind {
            ImportKind::NapiPerces => "Napi percek",
            ImportKind::Teljesitmeny => "Teljesítmény",
            ImportKind::WarroomLetszam => "Létszám",
        }
    }

    /// 全部取默认值（配置表为空时的行为）
    pub fn defaults(kind: ImportKind) -> Self {
        Self {
            kind,
            sheet_name: Self::default_sheet_name(kind).to_string(),
            header_rule: HeaderRule::default(),
            missing_row_policy: MissingRowPolicy::default(),
            validation: ValidationRules {
                shift_values: DEFAULT_SHIFT_VALUES.iter().map(|s| s.to_string()).collect(),
                position_values: DEFAULT_POSITION_VALUES.iter().map(|s| s.to_string()).collect(),
                reporting_period: None,
            },
        }
    }
}

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 读取某种类的完整导入配置
    ///
    /// # 默认值
    /// - 见 ImportSettings::defaults
    ///
    /// # 错误
    /// - Config: 配置值格式错误
    async fn load_import_settings(&self, kind: ImportKind) -> ImportOutcome<ImportSettings>;

    /// 同步调度间隔（秒）
    ///
    /// # 默认值
    /// - 900
    async fn get_sync_interval_secs(&self) -> ImportOutcome<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_kind() {
        let settings = ImportSettings::defaults(ImportKind::WarroomLetszam);
        assert_eq!(settings.sheet_name, "Létszám");
        assert_eq!(settings.header_rule.scan_rows, 20);
        assert_eq!(settings.missing_row_policy, MissingRowPolicy::Retain);
        assert_eq!(settings.validation.shift_values.len(), 3);
        assert!(settings.validation.reporting_period.is_none());
    }
}
