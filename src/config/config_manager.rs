// ==========================================
// 生产看板导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)，本系统只使用 scope_id='global'
// 规则: 键不存在 → 默认值；键存在但格式错误 → ImportError::Config
// ==========================================

use crate::config::import_config_trait::{
    ImportConfigReader, ImportSettings, DEFAULT_SYNC_INTERVAL_SECS,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::{ImportKind, MissingRowPolicy};
use crate::importer::error::{ImportError, ImportOutcome};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 所有 global 配置（按键排序）
    pub fn list_global_config(&self) -> RepositoryResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// 读取某种类的导入配置（同步版本，供非 async 调用方使用）
    pub fn import_settings(&self, kind: ImportKind) -> ImportOutcome<ImportSettings> {
        let mut settings = ImportSettings::defaults(kind);

        if let Some(v) = self.value(&config_keys::sheet_name(kind))? {
            if !v.trim().is_empty() {
                settings.sheet_name = v;
            }
        }

        let scan_key = config_keys::header_scan_rows(kind);
        if let Some(v) = self.value(&scan_key)? {
            let rows: usize = v.trim().parse().map_err(|_| invalid(&scan_key, &v, "需要正整数"))?;
            if rows == 0 {
                return Err(invalid(&scan_key, &v, "需要正整数"));
            }
            settings.header_rule.scan_rows = rows;
        }

        if let Some(v) = self.value(config_keys::HEADER_MATCH_THRESHOLD)? {
            let threshold: f64 = v
                .trim()
                .parse()
                .map_err(|_| invalid(config_keys::HEADER_MATCH_THRESHOLD, &v, "需要 0~1 的小数"))?;
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(invalid(config_keys::HEADER_MATCH_THRESHOLD, &v, "需要 0~1 的小数"));
            }
            settings.header_rule.threshold = threshold;
        }

        let policy_key = config_keys::missing_row_policy(kind);
        if let Some(v) = self.value(&policy_key)? {
            settings.missing_row_policy = MissingRowPolicy::parse(&v)
                .ok_or_else(|| invalid(&policy_key, &v, "需要 RETAIN 或 REMOVE"))?;
        }

        if let Some(v) = self.value(config_keys::SHIFT_VALUES)? {
            settings.validation.shift_values = parse_string_list(config_keys::SHIFT_VALUES, &v)?;
        }
        if let Some(v) = self.value(config_keys::POSITION_VALUES)? {
            settings.validation.position_values =
                parse_string_list(config_keys::POSITION_VALUES, &v)?;
        }

        let start = self.date_value(config_keys::REPORTING_PERIOD_START)?;
        let end = self.date_value(config_keys::REPORTING_PERIOD_END)?;
        settings.validation.reporting_period = match (start, end) {
            (Some(s), Some(e)) if s <= e => Some((s, e)),
            (Some(_), Some(_)) => {
                return Err(ImportError::Config {
                    key: config_keys::REPORTING_PERIOD_START.to_string(),
                    message: "报表期间开始日期晚于结束日期".to_string(),
                })
            }
            (Some(s), None) => Some((s, open_period_end())),
            (None, Some(e)) => Some((open_period_start(), e)),
            (None, None) => None,
        };

        debug!(kind = %kind, settings = ?settings, "导入配置已加载");
        Ok(settings)
    }

    /// 同步调度间隔（秒）
    pub fn sync_interval_secs(&self) -> ImportOutcome<u64> {
        match self.value(config_keys::SYNC_INTERVAL_SECS)? {
            None => Ok(DEFAULT_SYNC_INTERVAL_SECS),
            Some(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(secs),
                _ => Err(invalid(config_keys::SYNC_INTERVAL_SECS, &v, "需要正整数（秒）")),
            },
        }
    }

    /// 某种类在线数据源的文件路径（未配置 → None）
    pub fn live_source_path(&self, kind: ImportKind) -> ImportOutcome<Option<PathBuf>> {
        Ok(self
            .value(&config_keys::sync_source_path(kind))?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from))
    }

    fn value(&self, key: &str) -> ImportOutcome<Option<String>> {
        Ok(self.get_global_config_value(key)?)
    }

    fn date_value(&self, key: &str) -> ImportOutcome<Option<NaiveDate>> {
        match self.value(key)? {
            None => Ok(None),
            Some(v) if v.trim().is_empty() => Ok(None),
            Some(v) => NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|_| invalid(key, &v, "需要 YYYY-MM-DD")),
        }
    }
}

// 单边期间的另一端；保持四位年份，scope_date 按文本比较
fn open_period_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn open_period_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

fn invalid(key: &str, value: &str, expected: &str) -> ImportError {
    ImportError::Config {
        key: key.to_string(),
        message: format!("值 {:?} 无效，{}", value, expected),
    }
}

/// JSON 字符串数组，例如 ["Délelőtt","Délután","Éjszaka"]
fn parse_string_list(key: &str, raw: &str) -> ImportOutcome<Vec<String>> {
    let values: Vec<String> =
        serde_json::from_str(raw).map_err(|e| invalid(key, raw, &format!("需要 JSON 字符串数组: {}", e)))?;
    Ok(values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn load_import_settings(&self, kind: ImportKind) -> ImportOutcome<ImportSettings> {
        self.import_settings(kind)
    }

    async fn get_sync_interval_secs(&self) -> ImportOutcome<u64> {
        self.sync_interval_secs()
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    use crate::domain::types::ImportKind;

    // 表头识别
    pub const HEADER_MATCH_THRESHOLD: &str = "import.header_match_threshold";

    // 枚举取值（JSON 数组）
    pub const SHIFT_VALUES: &str = "import.shift_values";
    pub const POSITION_VALUES: &str = "import.position_values";

    // 报表期间（YYYY-MM-DD）
    pub const REPORTING_PERIOD_START: &str = "import.reporting_period_start";
    pub const REPORTING_PERIOD_END: &str = "import.reporting_period_end";

    // 同步调度
    pub const SYNC_INTERVAL_SECS: &str = "sync.interval_secs";

    // 按种类区分
    pub fn sheet_name(kind: ImportKind) -> String {
        format!("import.{}.sheet_name", kind.as_str())
    }

    pub fn header_scan_rows(kind: ImportKind) -> String {
        format!("import.{}.header_scan_rows", kind.as_str())
    }

    pub fn missing_row_policy(kind: ImportKind) -> String {
        format!("import.{}.missing_row_policy", kind.as_str())
    }

    pub fn sync_source_path(kind: ImportKind) -> String {
        format!("sync.{}.source_path", kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_empty_table_yields_defaults() {
        let config = setup();
        for kind in ImportKind::ALL {
            assert_eq!(config.import_settings(kind).unwrap(), ImportSettings::defaults(kind));
        }
        assert_eq!(config.sync_interval_secs().unwrap(), 900);
        assert!(config.live_source_path(ImportKind::WarroomLetszam).unwrap().is_none());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = setup();
        let kind = ImportKind::NapiPerces;
        config.set_global_config_value(&config_keys::sheet_name(kind), "Percek 2026").unwrap();
        config.set_global_config_value(&config_keys::header_scan_rows(kind), "5").unwrap();
        config.set_global_config_value(config_keys::HEADER_MATCH_THRESHOLD, "1.0").unwrap();
        config.set_global_config_value(&config_keys::missing_row_policy(kind), "remove").unwrap();
        config.set_global_config_value(config_keys::SHIFT_VALUES, r#"["A","B"]"#).unwrap();
        config.set_global_config_value(config_keys::REPORTING_PERIOD_START, "2026-10-01").unwrap();
        config.set_global_config_value(config_keys::REPORTING_PERIOD_END, "2026-10-31").unwrap();

        let settings = config.import_settings(kind).unwrap();
        assert_eq!(settings.sheet_name, "Percek 2026");
        assert_eq!(settings.header_rule.scan_rows, 5);
        assert_eq!(settings.header_rule.threshold, 1.0);
        assert_eq!(settings.missing_row_policy, MissingRowPolicy::Remove);
        assert_eq!(settings.validation.shift_values, vec!["A", "B"]);
        assert_eq!(
            settings.validation.reporting_period,
            Some((
                NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 10, 31).unwrap()
            ))
        );

        // 其他种类不受按种类配置影响
        let other = config.import_settings(ImportKind::Teljesitmeny).unwrap();
        assert_eq!(other.missing_row_policy, MissingRowPolicy::Retain);
    }

    #[test]
    fn test_one_sided_period_stays_four_digit() {
        let config = setup();
        config.set_global_config_value(config_keys::REPORTING_PERIOD_START, "2026-10-01").unwrap();

        let (from, to) = config
            .import_settings(ImportKind::NapiPerces)
            .unwrap()
            .validation
            .reporting_period
            .unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(to.format("%Y-%m-%d").to_string(), "9999-12-31");
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let config = setup();
        config.set_global_config_value(config_keys::HEADER_MATCH_THRESHOLD, "sok").unwrap();
        match config.import_settings(ImportKind::NapiPerces) {
            Err(ImportError::Config { key, .. }) => assert_eq!(key, "import.header_match_threshold"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_trait_reader_matches_sync_api() {
        let config = setup();
        config.set_global_config_value(config_keys::SYNC_INTERVAL_SECS, "60").unwrap();
        let reader: &dyn ImportConfigReader = &config;
        assert_eq!(reader.get_sync_interval_secs().await.unwrap(), 60);
        assert_eq!(
            reader.load_import_settings(ImportKind::Teljesitmeny).await.unwrap().sheet_name,
            "Teljesítmény"
        );
    }
}
