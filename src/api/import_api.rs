// ==========================================
// 生产看板导入系统 - 导入API
// ==========================================
// 职责: 封装导入/预检/同步/最近结果查询
// 约定: 管线为同步代码，在 spawn_blocking 中执行，不阻塞异步运行时
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportSettings};
use crate::domain::import::{ImportResult, ImportRunRecord, ImportSource};
use crate::domain::types::ImportKind;
use crate::importer::import_lock::ImportContext;
use crate::importer::pipeline::ImportPipeline;
use crate::repository::{ImportRunRepository, SqliteCanonicalRecordRepository};
use crate::sync::{LiveSource, SyncOutcome, SyncScheduler};
use std::sync::Arc;
use tracing::info;

pub type SqliteImportPipeline = ImportPipeline<SqliteCanonicalRecordRepository>;
pub type SqliteSyncScheduler = SyncScheduler<SqliteCanonicalRecordRepository>;

/// 导入API
pub struct ImportApi {
    pipeline: Arc<SqliteImportPipeline>,
    config: Arc<ConfigManager>,
    runs: Arc<ImportRunRepository>,
    scheduler: Arc<SqliteSyncScheduler>,
}

impl ImportApi {
    pub fn new(
        pipeline: Arc<SqliteImportPipeline>,
        config: Arc<ConfigManager>,
        runs: Arc<ImportRunRepository>,
        scheduler: Arc<SqliteSyncScheduler>,
    ) -> Self {
        Self {
            pipeline,
            config,
            runs,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<SqliteSyncScheduler> {
        &self.scheduler
    }

    /// 导入并提交
    ///
    /// # 参数
    /// - source: 导入源（sheet_name 为空时使用配置的默认工作表）
    /// - payload: 工作簿字节（为空 → InvalidInput）
    /// - ctx: 已认证的调用上下文
    pub async fn run_import(
        &self,
        source: ImportSource,
        payload: Vec<u8>,
        ctx: ImportContext,
    ) -> ApiResult<ImportResult> {
        ensure_payload(&source, &payload)?;
        let settings = self.load_settings(source.kind).await?;
        let pipeline = Arc::clone(&self.pipeline);

        let result = tokio::task::spawn_blocking(move || {
            let _perf = crate::perf::PerfGuard::new("api.run_import");
            pipeline.run_import(&source, &payload, &settings, &ctx)
        })
        .await??;

        Ok(result)
    }

    /// 预检（不提交）
    pub async fn check_import(
        &self,
        source: ImportSource,
        payload: Vec<u8>,
        ctx: ImportContext,
    ) -> ApiResult<ImportResult> {
        ensure_payload(&source, &payload)?;
        let settings = self.load_settings(source.kind).await?;
        let pipeline = Arc::clone(&self.pipeline);

        let result = tokio::task::spawn_blocking(move || {
            let _perf = crate::perf::PerfGuard::new("api.check_import");
            pipeline.check_import(&source, &payload, &settings, &ctx)
        })
        .await??;

        Ok(result)
    }

    /// 同步（approve=false 只返回差异报告）
    pub async fn run_sync(
        &self,
        kind: ImportKind,
        approve: bool,
        ctx: ImportContext,
    ) -> ApiResult<SyncOutcome> {
        Ok(self.scheduler.run_sync(kind, approve, ctx).await?)
    }

    /// 最近一次成功提交的运行记录（含 ImportResult）
    pub async fn last_result(&self, kind: ImportKind) -> ApiResult<Option<ImportRunRecord>> {
        let runs = Arc::clone(&self.runs);
        let record = tokio::task::spawn_blocking(move || {
            let _perf = crate::perf::PerfGuard::new("api.last_result");
            runs.last_committed(kind)
        })
        .await??;
        Ok(record)
    }

    /// 注册在线数据源
    pub fn register_live_source(&self, kind: ImportKind, source: Arc<dyn LiveSource>) {
        self.scheduler.register(kind, source);
    }

    /// 启动后台定时同步（间隔来自配置）
    pub async fn start_scheduler(&self) -> ApiResult<tokio::task::JoinHandle<()>> {
        let config = Arc::clone(&self.config);
        let secs = tokio::task::spawn_blocking(move || config.sync_interval_secs()).await??;
        info!(interval_secs = secs, "定时同步已启动");
        Ok(Arc::clone(&self.scheduler).spawn(std::time::Duration::from_secs(secs)))
    }

    async fn load_settings(&self, kind: ImportKind) -> ApiResult<ImportSettings> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || config.import_settings(kind))
            .await?
            .map_err(ApiError::from)
    }
}

fn ensure_payload(source: &ImportSource, payload: &[u8]) -> ApiResult<()> {
    if payload.is_empty() {
        return Err(ApiError::InvalidInput(format!(
            "导入文件为空: {}",
            source.source_name()
        )));
    }
    Ok(())
}
