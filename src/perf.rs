// ==========================================
// 生产看板导入系统 - 运行指标
// ==========================================
// 职责: 统计一次操作的耗时与 SQL 语句数；导入运行的指标随 import_run 落库
// 开关:
// - SHOPFLOOR_IMPORT_PERF_SQL=1|0 开关语句统计（Debug 默认开，Release 默认关）
// - SHOPFLOOR_IMPORT_SLOW_SQL_MS=N 慢 SQL 阈值（毫秒）
// 约束: 计数为线程局部，PerfGuard 必须在执行 SQL 的线程上创建
// ==========================================

use crate::domain::import::RunMetrics;
use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static SLOW_SQL_MS: AtomicU64 = AtomicU64::new(200);

thread_local! {
    static OPEN_GUARDS: Cell<u32> = const { Cell::new(0) };
    static STATEMENTS: Cell<u64> = const { Cell::new(0) };
    static SLOW_STATEMENTS: Cell<u64> = const { Cell::new(0) };
}

/// 语句统计配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlTracing {
    pub slow_sql_ms: u64,
}

impl SqlTracing {
    /// 读取环境变量；统计关闭时返回 None
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("SHOPFLOOR_IMPORT_PERF_SQL")
            .map(|v| env_flag(&v))
            .unwrap_or(cfg!(debug_assertions));
        if !enabled {
            return None;
        }
        let slow_sql_ms = std::env::var("SHOPFLOOR_IMPORT_SLOW_SQL_MS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
        Some(Self { slow_sql_ms })
    }
}

fn env_flag(raw: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|v| raw.trim().eq_ignore_ascii_case(v))
}

/// 在连接上安装语句计数与慢 SQL 日志；None 清除该连接已有回调
///
/// 只统计安装了回调的连接
pub fn install_sql_tracing(conn: &mut Connection, tracing: Option<SqlTracing>) {
    match tracing {
        Some(cfg) => {
            SLOW_SQL_MS.store(cfg.slow_sql_ms, Ordering::Relaxed);
            conn.trace(Some(on_statement));
            conn.profile(Some(on_statement_done));
        }
        None => {
            conn.trace(None);
            conn.profile(None);
        }
    }
}

fn counting_here() -> bool {
    OPEN_GUARDS.with(|g| g.get() > 0)
}

fn on_statement(_sql: &str) {
    if counting_here() {
        STATEMENTS.with(|c| c.set(c.get() + 1));
    }
}

fn on_statement_done(sql: &str, took: Duration) {
    let took_ms = took.as_millis() as u64;
    if took_ms < SLOW_SQL_MS.load(Ordering::Relaxed) {
        return;
    }
    tracing::warn!(
        target: "slow_sql",
        took_ms,
        sql = %one_line(sql, 300),
        "慢 SQL"
    );
    if counting_here() {
        SLOW_STATEMENTS.with(|c| c.set(c.get() + 1));
    }
}

/// 折叠空白为单行，最多保留 max_chars 个字符
fn one_line(sql: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for (i, word) in sql.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
        out.push('…');
    }
    out
}

// ==========================================
// PerfGuard - 单次操作的指标
// ==========================================

/// 从创建到 Drop 的耗时与 SQL 语句数；Drop 时写一条 perf 日志
///
/// ```ignore
/// let perf = shopfloor_import::perf::PerfGuard::new("import.run");
/// // ...
/// let metrics = perf.metrics();
/// ```
pub struct PerfGuard {
    op: &'static str,
    started: Instant,
    statements_before: u64,
    slow_before: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        OPEN_GUARDS.with(|g| g.set(g.get() + 1));
        Self {
            op,
            started: Instant::now(),
            statements_before: STATEMENTS.with(Cell::get),
            slow_before: SLOW_STATEMENTS.with(Cell::get),
        }
    }

    /// 截至当前的指标（不结束统计）
    pub fn metrics(&self) -> RunMetrics {
        RunMetrics {
            elapsed_ms: self.started.elapsed().as_millis() as i64,
            sql_statements: STATEMENTS.with(Cell::get).saturating_sub(self.statements_before),
            slow_sql_statements: SLOW_STATEMENTS.with(Cell::get).saturating_sub(self.slow_before),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let metrics = self.metrics();
        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms = metrics.elapsed_ms,
            sql_statements = metrics.sql_statements,
            slow_sql_statements = metrics.slow_sql_statements,
            "操作完成"
        );
        OPEN_GUARDS.with(|g| g.set(g.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line_collapses_and_truncates_on_chars() {
        let sql = "SELECT 'Délelőtt'\n    FROM canonical_record";
        assert_eq!(one_line(sql, 300), "SELECT 'Délelőtt' FROM canonical_record");
        assert_eq!(one_line(sql, 10), "SELECT 'Dé…");
    }

    #[test]
    fn test_guard_counts_only_its_own_statements() {
        let mut conn = Connection::open_in_memory().unwrap();
        install_sql_tracing(&mut conn, Some(SqlTracing { slow_sql_ms: 10_000 }));

        conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
        let outer = PerfGuard::new("outer");
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        {
            let inner = PerfGuard::new("inner");
            conn.execute("INSERT INTO t VALUES (2)", []).unwrap();
            assert_eq!(inner.metrics().sql_statements, 1);
        }
        assert_eq!(outer.metrics().sql_statements, 2);
        assert_eq!(outer.metrics().slow_sql_statements, 0);
    }

    #[test]
    fn test_env_flag_variants() {
        assert!(env_flag(" YES "));
        assert!(env_flag("on"));
        assert!(!env_flag("0"));
    }
}
