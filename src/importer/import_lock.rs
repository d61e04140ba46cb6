// ==========================================
// 生产看板导入系统 - 导入互斥锁
// ==========================================
// 职责: 每个导入种类同一时刻最多一个导入在执行
// 规则:
// - 第二个请求立即失败（ImportInProgress），不排队、不交错
// - Guard 在 Drop 时释放，成功/失败/panic 都不会留下死锁
// ==========================================

use crate::domain::types::ImportKind;
use crate::importer::error::{ImportError, ImportOutcome};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ImportLockRegistry {
    active: Mutex<HashSet<ImportKind>>,
}

impl ImportLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取某种类的锁
    ///
    /// # 错误
    /// - ImportInProgress: 该种类已有导入在执行
    pub fn try_acquire(self: &Arc<Self>, kind: ImportKind) -> ImportOutcome<ImportLockGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|e| ImportError::Other(anyhow::anyhow!("锁注册表不可用: {}", e)))?;

        if !active.insert(kind) {
            warn!(kind = %kind, "导入进行中，拒绝并发请求");
            return Err(ImportError::ImportInProgress(kind));
        }

        debug!(kind = %kind, "已获取导入锁");
        Ok(ImportLockGuard {
            registry: Arc::clone(self),
            kind,
        })
    }

    pub fn is_locked(&self, kind: ImportKind) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(&kind))
            .unwrap_or(false)
    }
}

/// 持有期间该种类被锁定
#[derive(Debug)]
pub struct ImportLockGuard {
    registry: Arc<ImportLockRegistry>,
    kind: ImportKind,
}

impl ImportLockGuard {
    pub fn kind(&self) -> ImportKind {
        self.kind
    }
}

impl Drop for ImportLockGuard {
    fn drop(&mut self) {
        // 注册表 Mutex 中毒时仍然要释放
        let mut active = match self.registry.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.remove(&self.kind);
        debug!(kind = %self.kind, "已释放导入锁");
    }
}

// ==========================================
// 取消标志 / 调用上下文
// ==========================================

/// 调用方可在提交开始前取消长时间运行的导入
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 已取消 → Err(Cancelled)
    pub fn check(&self) -> ImportOutcome<()> {
        if self.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// 已认证的调用上下文（本模块不做认证）
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub actor: String,
    pub cancel: CancelFlag,
}

impl ImportContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn system() -> Self {
        Self::new("system")
    }

    pub fn with_cancel(actor: impl Into<String>, cancel: CancelFlag) -> Self {
        Self {
            actor: actor.into(),
            cancel,
        }
    }
}
