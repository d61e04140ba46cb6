// ==========================================
// 生产看板导入系统 - 同步调度器
// ==========================================
// 职责: 定时/按需对在线数据源重跑 定位 → 映射 → 校验 → 对账
// 规则:
// - 默认只生成差异报告，不写库（人工审批前不覆盖人员数据）
// - approve=true 时走导入提交路径（同一把种类锁），只提交上次报告列出的差异（含删除）
// - 报告只列出上次报告之后新出现的差异；源不变时第二次为空
// ==========================================

use crate::config::{ImportConfigReader, ImportSettings};
use crate::domain::import::{
    Discrepancy, DiscrepancyReport, ImportResult, ImportSource, SourceOrigin,
};
use crate::domain::types::ImportKind;
use crate::importer::error::{ImportError, ImportOutcome};
use crate::importer::import_lock::ImportContext;
use crate::importer::pipeline::ImportPipeline;
use crate::repository::CanonicalRecordRepository;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

// ==========================================
// LiveSource - 在线数据源
// ==========================================

/// 一次拉取的源数据
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub bytes: Vec<u8>,
    /// 来源描述（带扩展名，用于 CSV 判定与展示）
    pub descriptor: String,
}

#[async_trait]
pub trait LiveSource: Send + Sync {
    /// 拉取当前内容
    ///
    /// # 错误
    /// - SourceUnavailable: 数据源暂时不可用
    async fn fetch(&self) -> ImportOutcome<LiveSnapshot>;
}

/// 共享盘上定期覆盖的导出文件
#[derive(Debug, Clone)]
pub struct FileLiveSource {
    path: PathBuf,
}

impl FileLiveSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LiveSource for FileLiveSource {
    async fn fetch(&self) -> ImportOutcome<LiveSnapshot> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ImportError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(LiveSnapshot {
            bytes,
            descriptor: self.path.display().to_string(),
        })
    }
}

// ==========================================
// SyncOutcome
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// 未审批: 差异报告，库未变更
    Report(DiscrepancyReport),
    /// 已审批: 已提交
    Applied(ImportResult),
}

// ==========================================
// SyncScheduler
// ==========================================
pub struct SyncScheduler<R: CanonicalRecordRepository + 'static> {
    pipeline: Arc<ImportPipeline<R>>,
    config: Arc<dyn ImportConfigReader>,
    sources: RwLock<HashMap<ImportKind, Arc<dyn LiveSource>>>,
    /// 每个种类上次报告时的全部差异
    baseline: Mutex<HashMap<ImportKind, Vec<Discrepancy>>>,
}

impl<R: CanonicalRecordRepository + 'static> SyncScheduler<R> {
    pub fn new(pipeline: Arc<ImportPipeline<R>>, config: Arc<dyn ImportConfigReader>) -> Self {
        Self {
            pipeline,
            config,
            sources: RwLock::new(HashMap::new()),
            baseline: Mutex::new(HashMap::new()),
        }
    }

    /// 注册（或替换）某种类的在线数据源
    pub fn register(&self, kind: ImportKind, source: Arc<dyn LiveSource>) {
        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sources.insert(kind, source);
        info!(kind = %kind, "在线数据源已注册");
    }

    pub fn registered_kinds(&self) -> Vec<ImportKind> {
        let sources = match self.sources.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut kinds: Vec<ImportKind> = sources.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// 当前全部未处理差异（上次报告时的完整列表）
    pub fn pending(&self, kind: ImportKind) -> ImportOutcome<Vec<Discrepancy>> {
        Ok(self.baseline()?.get(&kind).cloned().unwrap_or_default())
    }

    /// 执行一次同步
    ///
    /// # 参数
    /// - approve: false → 只生成报告；true → 提交上次报告列出的全部差异（含删除）
    ///
    /// 审批时若当前差异与上次报告不一致（报告后源表或库中又有变化），
    /// 不写入任何记录，改为返回新的差异报告，需再次审批
    ///
    /// # 错误
    /// - SourceUnavailable: 未注册或拉取失败
    /// - 结构性错误 / ImportInProgress / CommitFailed: 原样返回
    #[instrument(skip(self, ctx), fields(actor = %ctx.actor))]
    pub async fn run_sync(
        &self,
        kind: ImportKind,
        approve: bool,
        ctx: ImportContext,
    ) -> ImportOutcome<SyncOutcome> {
        // 步骤 1: 拉取在线数据
        let live = self.source_for(kind)?;
        let snapshot = live.fetch().await?;
        debug!(descriptor = %snapshot.descriptor, bytes = snapshot.bytes.len(), "在线数据已拉取");

        // 步骤 2: 读取配置
        let settings = self.config.load_import_settings(kind).await?;
        let source = ImportSource::new(
            kind,
            SourceOrigin::Live {
                descriptor: snapshot.descriptor,
            },
            settings.sheet_name.clone(),
        );
        let payload = Arc::new(snapshot.bytes);

        if approve {
            // 步骤 3a: 按已审阅差异提交
            let reviewed = self.pending(kind)?;
            let pipeline = Arc::clone(&self.pipeline);
            let (source, payload, settings, ctx) =
                (source.clone(), Arc::clone(&payload), settings.clone(), ctx.clone());
            let applied = tokio::task::spawn_blocking(move || {
                let _perf = crate::perf::PerfGuard::new("sync.apply");
                pipeline.apply_reviewed(&source, &payload, &settings, &ctx, &reviewed)
            })
            .await
            .map_err(|e| ImportError::Other(anyhow::anyhow!("同步任务执行失败: {}", e)))?;

            match applied {
                Ok(result) => {
                    self.baseline()?.remove(&kind);
                    info!(kind = %kind, inserted = result.inserted, updated = result.updated, removed = result.removed, "同步差异已应用");
                    return Ok(SyncOutcome::Applied(result));
                }
                Err(ImportError::ReviewOutdated { reviewed, current }) => {
                    warn!(kind = %kind, reviewed, current, "差异在审阅后发生变化，未提交，重新生成报告");
                }
                Err(e) => return Err(e),
            }
        }

        // 步骤 3b: 只读对账
        let report = self.report(kind, source, payload, settings, ctx).await?;
        Ok(SyncOutcome::Report(report))
    }

    /// 生成差异报告，只列出上次报告之后新出现的差异
    async fn report(
        &self,
        kind: ImportKind,
        source: ImportSource,
        payload: Arc<Vec<u8>>,
        settings: ImportSettings,
        ctx: ImportContext,
    ) -> ImportOutcome<DiscrepancyReport> {
        let pipeline = Arc::clone(&self.pipeline);
        let (source_name, current, rejections) = tokio::task::spawn_blocking(move || {
            let _perf = crate::perf::PerfGuard::new("sync.report");
            let prepared = pipeline.prepare(&source, &payload, &settings, &ctx)?;
            let change_set = pipeline.preview(&prepared)?;
            Ok::<_, ImportError>((
                prepared.source_name,
                change_set.to_discrepancies(),
                prepared.rejections,
            ))
        })
        .await
        .map_err(|e| ImportError::Other(anyhow::anyhow!("同步任务执行失败: {}", e)))??;

        // 与上次报告比较
        let fresh = {
            let mut baseline = self.baseline()?;
            let previous = baseline.get(&kind);
            let fresh: Vec<Discrepancy> = current
                .iter()
                .filter(|d| previous.map_or(true, |prev| !prev.contains(d)))
                .cloned()
                .collect();
            baseline.insert(kind, current.clone());
            fresh
        };

        info!(
            kind = %kind,
            new = fresh.len(),
            outstanding = current.len(),
            rejected = rejections.len(),
            "同步差异报告已生成"
        );

        Ok(DiscrepancyReport {
            kind,
            source_name,
            discrepancies: fresh,
            outstanding: current.len(),
            rejections,
            generated_at: Utc::now(),
        })
    }

    /// 后台定时同步（只报告，不提交）
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                for kind in self.registered_kinds() {
                    match self.run_sync(kind, false, ImportContext::new("sync-scheduler")).await {
                        Ok(SyncOutcome::Report(report)) => {
                            if !report.discrepancies.is_empty() {
                                warn!(
                                    kind = %kind,
                                    new = report.discrepancies.len(),
                                    outstanding = report.outstanding,
                                    "发现待审批差异"
                                );
                            }
                        }
                        Ok(SyncOutcome::Applied(_)) => {}
                        Err(e) => warn!(kind = %kind, error = %e, "定时同步失败"),
                    }
                }
            }
        })
    }

    fn source_for(&self, kind: ImportKind) -> ImportOutcome<Arc<dyn LiveSource>> {
        let sources = match self.sources.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sources
            .get(&kind)
            .cloned()
            .ok_or_else(|| ImportError::SourceUnavailable(format!("未注册在线数据源: {}", kind)))
    }

    fn baseline(&self) -> ImportOutcome<MutexGuard<'_, HashMap<ImportKind, Vec<Discrepancy>>>> {
        self.baseline
            .lock()
            .map_err(|e| ImportError::Other(anyhow::anyhow!("差异基线不可用: {}", e)))
    }
}
