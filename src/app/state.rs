// ==========================================
// 生产看板导入系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::ImportApi;
use crate::config::ConfigManager;
use crate::domain::types::ImportKind;
use crate::importer::import_lock::ImportLockRegistry;
use crate::importer::pipeline::ImportPipeline;
use crate::repository::{ImportRunRepository, SqliteCanonicalRecordRepository};
use crate::sync::{FileLiveSource, SyncScheduler};

/// 应用状态
///
/// 所有组件共享同一个 SQLite 连接与同一个种类锁注册表
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器
    pub config: Arc<ConfigManager>,

    /// 规范记录仓储（只读查询；写入只经由导入管线）
    pub record_repo: Arc<SqliteCanonicalRecordRepository>,

    /// 导入API
    pub import_api: Arc<ImportApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并应用统一 PRAGMA
    /// 2. 初始化 schema（幂等）
    /// 3. 创建 Repository / 管线 / 调度器 / API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let mut conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::perf::install_sql_tracing(&mut conn, crate::perf::SqlTracing::from_env());
        crate::db::init_schema(&conn).map_err(|e| format!("无法初始化数据库结构: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let record_repo = Arc::new(SqliteCanonicalRecordRepository::from_connection(conn.clone()));
        let run_repo = Arc::new(ImportRunRepository::new(conn.clone()));
        let config = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化管线 / 调度器 / API
        // ==========================================
        let locks = Arc::new(ImportLockRegistry::new());
        let pipeline = Arc::new(ImportPipeline::new(record_repo.clone(), locks, run_repo.clone()));
        let scheduler = Arc::new(SyncScheduler::new(pipeline.clone(), config.clone()));

        // 已配置的在线数据源
        for kind in ImportKind::ALL {
            match config.live_source_path(kind) {
                Ok(Some(path)) => scheduler.register(kind, Arc::new(FileLiveSource::new(path))),
                Ok(None) => {}
                Err(e) => tracing::warn!("在线数据源配置读取失败(kind={}): {}", kind, e),
            }
        }

        let import_api = Arc::new(ImportApi::new(pipeline, config.clone(), run_repo, scheduler));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config,
            record_repo,
            import_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级:
/// 1. 环境变量 SHOPFLOOR_IMPORT_DB_PATH
/// 2. 用户数据目录 / shopfloor-import / shopfloor_import.db
/// 3. 当前目录 ./shopfloor_import.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("SHOPFLOOR_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./shopfloor_import.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("shopfloor-import");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("shopfloor_import.db");
        }
    }

    path.to_string_lossy().to_string()
}
