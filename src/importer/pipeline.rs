// ==========================================
// 生产看板导入系统 - 导入管线
// ==========================================
// 职责: 串联 解析 → 定位 → 映射 → 校验 → 去重 → 对账 → 提交
// 流程:
// - run_import: 先取种类锁，锁内完成校验到提交，记录运行历史
// - check_import: 同样的前置步骤 + 只读预览，不取锁、不写库
// 红线: 行级问题只进拒绝列表；结构性/事务性错误原样返回
// ==========================================

use crate::config::ImportSettings;
use crate::domain::import::{
    CommitOutcome, Discrepancy, ImportResult, ImportRunRecord, ImportSource, RejectedRow,
    RunStatus,
};
use crate::domain::types::{ImportKind, MissingRowPolicy};
use crate::importer::conflict_handler::{ConflictHandler, Deduplicated};
use crate::importer::diff_engine::ChangeSet;
use crate::importer::dq_validator::DqValidator;
use crate::importer::error::{ImportError, ImportOutcome};
use crate::importer::field_mapper::{HeaderMap, RowMapper};
use crate::importer::file_parser::{parse_workbook, Cell};
use crate::importer::import_lock::{ImportContext, ImportLockRegistry};
use crate::importer::layout::ImportLayout;
use crate::importer::sheet_locator::SheetLocator;
use crate::importer::upsert_orchestrator::{ReconcileRequest, UpsertOrchestrator};
use crate::perf::PerfGuard;
use crate::repository::{CanonicalRecordRepository, ImportRunRepository, ReconcileScope};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// PreparedImport - 提交前的中间结果
// ==========================================
/// 校验与去重已完成，尚未读取库中现状
#[derive(Debug, Clone)]
pub struct PreparedImport {
    pub kind: ImportKind,
    pub source_name: String,
    pub sheet_name: String,
    pub header_row: usize,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub rejections: Vec<RejectedRow>,
    pub deduplicated: Deduplicated,
    pub scope: ReconcileScope,
}

impl PreparedImport {
    pub fn request(&self, apply_removals: bool) -> ReconcileRequest<'_> {
        ReconcileRequest {
            scope: self.scope,
            source: &self.deduplicated.records,
            apply_removals,
            reviewed: None,
        }
    }

    fn to_result(&self, change_set: &ChangeSet, removed: usize, outcome: CommitOutcome) -> ImportResult {
        ImportResult {
            kind: self.kind,
            source_name: self.source_name.clone(),
            sheet_name: self.sheet_name.clone(),
            header_row: self.header_row,
            total_rows: self.total_rows,
            valid_rows: self.valid_rows,
            inserted: change_set.inserts.len(),
            updated: change_set.updates.len(),
            unchanged: change_set.unchanged.len(),
            rejected: self.rejections.len(),
            duplicates_overridden: self.deduplicated.overridden,
            missing_from_source: change_set.missing.len(),
            removed,
            rejections: self.rejections.clone(),
            outcome,
        }
    }
}

// ==========================================
// ImportPipeline
// ==========================================
pub struct ImportPipeline<R: CanonicalRecordRepository> {
    orchestrator: UpsertOrchestrator<R>,
    runs: Arc<ImportRunRepository>,
}

impl<R: CanonicalRecordRepository> ImportPipeline<R> {
    pub fn new(repo: Arc<R>, locks: Arc<ImportLockRegistry>, runs: Arc<ImportRunRepository>) -> Self {
        Self {
            orchestrator: UpsertOrchestrator::new(repo, locks),
            runs,
        }
    }

    pub fn orchestrator(&self) -> &UpsertOrchestrator<R> {
        &self.orchestrator
    }

    /// 导入并提交
    ///
    /// # 错误
    /// - ImportInProgress: 同种类已有导入（不写运行记录）
    /// - 结构性错误 / Cancelled / CommitFailed: 不提交任何记录，写入 FAILED/CANCELLED 运行记录
    #[instrument(skip(self, source, payload, settings, ctx), fields(kind = %source.kind, source = %source.source_name(), actor = %ctx.actor))]
    pub fn run_import(
        &self,
        source: &ImportSource,
        payload: &[u8],
        settings: &ImportSettings,
        ctx: &ImportContext,
    ) -> ImportOutcome<ImportResult> {
        self.run_locked(source, payload, settings, ctx, None)
    }

    /// 审批同步: 只有事务内的差异与已审阅差异完全一致时才提交（含删除）
    ///
    /// # 错误
    /// - ReviewOutdated: 审阅后源表或库中现状已变化，不写入
    /// - 其余同 run_import
    #[instrument(skip(self, source, payload, settings, ctx, reviewed), fields(kind = %source.kind, reviewed = reviewed.len(), actor = %ctx.actor))]
    pub fn apply_reviewed(
        &self,
        source: &ImportSource,
        payload: &[u8],
        settings: &ImportSettings,
        ctx: &ImportContext,
        reviewed: &[Discrepancy],
    ) -> ImportOutcome<ImportResult> {
        self.run_locked(source, payload, settings, ctx, Some(reviewed))
    }

    fn run_locked(
        &self,
        source: &ImportSource,
        payload: &[u8],
        settings: &ImportSettings,
        ctx: &ImportContext,
        reviewed: Option<&[Discrepancy]>,
    ) -> ImportOutcome<ImportResult> {
        // 步骤 1: 取锁（失败立即返回，不排队）
        let guard = self.orchestrator.acquire(source.kind)?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let perf = PerfGuard::new("import.run");

        // 步骤 2~4: 锁内执行 校验 → 对账 → 提交
        let outcome = self.prepare(source, payload, settings, ctx).and_then(|prepared| {
            let apply_removals =
                reviewed.is_some() || settings.missing_row_policy == MissingRowPolicy::Remove;
            let request = ReconcileRequest {
                reviewed,
                ..prepared.request(apply_removals)
            };
            let summary = self.orchestrator.commit(&guard, &request, ctx, &run_id)?;
            Ok(prepared.to_result(&summary.change_set, summary.removed, CommitOutcome::Committed))
        });

        // 步骤 5: 运行记录（锁仍持有，保证记录顺序与提交顺序一致）
        let (status, error_message, result) = match &outcome {
            Ok(result) => (RunStatus::Committed, None, Some(result.clone())),
            Err(ImportError::Cancelled) => (RunStatus::Cancelled, Some(ImportError::Cancelled.to_string()), None),
            Err(e) => (RunStatus::Failed, Some(e.to_string()), None),
        };
        let run = ImportRunRecord {
            run_id: run_id.clone(),
            kind: source.kind,
            source_name: source.source_name(),
            actor: ctx.actor.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            metrics: perf.metrics(),
            error_message,
            result,
        };
        if let Err(e) = self.runs.insert(&run) {
            // 运行记录失败不影响导入结果
            error!(run_id = %run_id, error = %e, "运行记录写入失败");
        }

        drop(guard);

        match &outcome {
            Ok(result) => info!(
                run_id = %run_id,
                inserted = result.inserted,
                updated = result.updated,
                unchanged = result.unchanged,
                rejected = result.rejected,
                removed = result.removed,
                "导入完成"
            ),
            Err(e) => warn!(run_id = %run_id, error = %e, "导入失败"),
        }
        outcome
    }

    /// 预检: 校验 + 对账，不提交
    ///
    /// 结果只依赖输入与库中现状，相同输入重复调用结果相同
    #[instrument(skip(self, source, payload, settings, ctx), fields(kind = %source.kind, source = %source.source_name()))]
    pub fn check_import(
        &self,
        source: &ImportSource,
        payload: &[u8],
        settings: &ImportSettings,
        ctx: &ImportContext,
    ) -> ImportOutcome<ImportResult> {
        let prepared = self.prepare(source, payload, settings, ctx)?;
        let change_set = self.orchestrator.preview(&prepared.request(false))?;

        let projected_removals = match settings.missing_row_policy {
            MissingRowPolicy::Remove => change_set.missing.len(),
            MissingRowPolicy::Retain => 0,
        };
        let result = prepared.to_result(&change_set, projected_removals, CommitOutcome::DryRun);
        info!(
            inserted = result.inserted,
            updated = result.updated,
            unchanged = result.unchanged,
            rejected = result.rejected,
            "预检完成"
        );
        Ok(result)
    }

    /// 只读对账（同步调度器的差异模式使用）
    pub fn preview(&self, prepared: &PreparedImport) -> ImportOutcome<ChangeSet> {
        self.orchestrator.preview(&prepared.request(false))
    }

    /// 解析 → 定位 → 映射 → 校验 → 去重 → 计算对账范围
    pub fn prepare(
        &self,
        source: &ImportSource,
        payload: &[u8],
        settings: &ImportSettings,
        ctx: &ImportContext,
    ) -> ImportOutcome<PreparedImport> {
        ctx.cancel.check()?;

        // 步骤 1: 解析工作簿
        let extension = source.origin.extension();
        let workbook = parse_workbook(payload, extension.as_deref())?;

        // 步骤 2: 定位工作表与表头
        let layout = ImportLayout::for_kind(source.kind);
        let sheet_name = if source.sheet_name.trim().is_empty() {
            settings.sheet_name.as_str()
        } else {
            source.sheet_name.as_str()
        };
        let located = SheetLocator::new(layout, settings.header_rule).locate(&workbook, sheet_name)?;

        // 步骤 3: 解析列映射（缺少必需列 → 整体失败）
        let header_map = HeaderMap::resolve(layout, located.sheet_name(), located.header())?;
        debug!(header_row = located.header_row_number(), header_map = ?header_map, "列映射已解析");

        // 步骤 4: 逐行映射（全空行静默跳过）
        let mapper = RowMapper::new(layout, &header_map);
        let mut total_rows = 0;
        let mut candidates = Vec::new();
        for (row_number, row) in located.data_rows() {
            ctx.cancel.check()?;
            if row.iter().all(Cell::is_blank) {
                continue;
            }
            total_rows += 1;
            candidates.extend(mapper.map_row(row_number, row));
        }

        // 步骤 5: 校验（行级失败进入拒绝列表）
        let validation = DqValidator::new(layout, &settings.validation).partition(candidates);
        let valid_rows = validation.valid.len();

        // 步骤 6: 同键去重（后行覆盖前行）
        let deduplicated = ConflictHandler::dedup_last_wins(validation.valid);

        // 步骤 7: 对账范围
        let scope = reconcile_scope(source.kind, settings, Some(&header_map), &deduplicated);
        ctx.cancel.check()?;

        info!(
            sheet = located.sheet_name(),
            header_row = located.header_row_number(),
            total_rows,
            valid_rows,
            rejected = validation.rejected.len(),
            unique_keys = deduplicated.records.len(),
            "源表已校验"
        );

        Ok(PreparedImport {
            kind: source.kind,
            source_name: source.source_name(),
            sheet_name: located.sheet_name().to_string(),
            header_row: located.header_row_number(),
            total_rows,
            valid_rows,
            rejections: validation.rejected,
            deduplicated,
            scope,
        })
    }
}

/// 报表期间 ∪ 表头声明的日期列 ∪ 源表记录日期；都没有 → 空范围
///
/// 月度记录的期间日（月初）可能早于报表期间开始日，因此取并集。
/// 宽表某日期列全部为空时，该日期仍在范围内（库中该日记录视为源表缺失）。
fn reconcile_scope(
    kind: ImportKind,
    settings: &ImportSettings,
    header_map: Option<&HeaderMap>,
    deduplicated: &Deduplicated,
) -> ReconcileScope {
    let declared = header_map.and_then(|map| date_span(map.date_columns().iter().map(|(_, d)| *d)));
    let observed = date_span(
        deduplicated
            .records
            .values()
            .map(|sourced| sourced.record.scope_date()),
    );

    let range = [settings.validation.reporting_period, declared, observed]
        .into_iter()
        .flatten()
        .reduce(|(from, to), (f, t)| (from.min(f), to.max(t)));

    match range {
        Some((from, to)) => ReconcileScope::between(kind, from, to),
        None => ReconcileScope::empty(kind),
    }
}

fn date_span(dates: impl Iterator<Item = NaiveDate>) -> Option<(NaiveDate, NaiveDate)> {
    dates.fold(None, |span: Option<(NaiveDate, NaiveDate)>, date| match span {
        None => Some((date, date)),
        Some((from, to)) => Some((date.min(from), date.max(to))),
    })
}
