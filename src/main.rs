// ==========================================
// 生产看板导入系统 - 命令行入口
// ==========================================
// 用法:
//   shopfloor-import [--db PATH] [--actor NAME] <命令>
//
// 命令:
//   import <kind> <file> [--sheet NAME]   导入并提交（Ctrl-C 在写入前取消）
//   check  <kind> <file> [--sheet NAME]   预检（不提交）
//   sync   <kind> [--approve]             在线数据源对账
//   watch                                 定时同步，Ctrl-C 退出
//   last   <kind>                         最近一次成功导入
//   config list | config set KEY VALUE    配置查看/写入
//
// 结果以 JSON 输出到 stdout，日志输出到 stderr
// ==========================================

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use shopfloor_import::api::ApiError;
use shopfloor_import::app::{get_default_db_path, AppState};
use shopfloor_import::domain::{ImportSource, SourceOrigin};
use shopfloor_import::importer::{CancelFlag, ImportContext};
use shopfloor_import::{logging, ImportKind};
use std::path::PathBuf;

enum Command {
    Import { kind: ImportKind, file: PathBuf, sheet: Option<String>, dry_run: bool },
    Sync { kind: ImportKind, approve: bool },
    Watch,
    Last { kind: ImportKind },
    ConfigList,
    ConfigSet { key: String, value: String },
}

struct Cli {
    db_path: Option<String>,
    actor: String,
    command: Command,
}

fn parse_kind(raw: Option<String>) -> anyhow::Result<ImportKind> {
    let raw = raw.ok_or_else(|| anyhow!("缺少导入种类（napi-perces / teljesitmeny / warroom-letszam）"))?;
    ImportKind::parse(&raw).ok_or_else(|| anyhow!("未知导入种类: {}", raw))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Cli> {
    let mut db_path = None;
    let mut actor = std::env::var("USER").unwrap_or_else(|_| "cli".to_string());
    let mut sheet = None;
    let mut approve = false;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => db_path = Some(args.next().context("--db 需要路径")?),
            "--actor" => actor = args.next().context("--actor 需要名称")?,
            "--sheet" => sheet = Some(args.next().context("--sheet 需要工作表名")?),
            "--approve" => approve = true,
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some(cmd @ ("import" | "check")) => Command::Import {
            kind: parse_kind(positional.next())?,
            file: PathBuf::from(positional.next().context("缺少文件路径")?),
            sheet,
            dry_run: cmd == "check",
        },
        Some("sync") => Command::Sync {
            kind: parse_kind(positional.next())?,
            approve,
        },
        Some("watch") => Command::Watch,
        Some("last") => Command::Last {
            kind: parse_kind(positional.next())?,
        },
        Some("config") => match positional.next().as_deref() {
            Some("list") | None => Command::ConfigList,
            Some("set") => Command::ConfigSet {
                key: positional.next().context("缺少配置键")?,
                value: positional.next().context("缺少配置值")?,
            },
            Some(other) => bail!("未知 config 子命令: {}", other),
        },
        Some(other) => bail!("未知命令: {}", other),
        None => bail!("缺少命令（import / check / sync / watch / last / config）"),
    };

    Ok(Cli {
        db_path,
        actor,
        command,
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_path = cli.db_path.unwrap_or_else(get_default_db_path);
    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;
    let api = state.import_api.clone();
    let ctx = ImportContext::new(cli.actor);

    match cli.command {
        Command::Import {
            kind,
            file,
            sheet,
            dry_run,
        } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("无法读取文件 {}", file.display()))?;
            let source = ImportSource::new(kind, SourceOrigin::FilePath(file), sheet.unwrap_or_default());

            // Ctrl-C: 写入开始前取消导入
            let cancel = CancelFlag::new();
            let ctx = ImportContext::with_cancel(ctx.actor, cancel.clone());
            let on_interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let result = if dry_run {
                api.check_import(source, payload, ctx).await
            } else {
                api.run_import(source, payload, ctx).await
            };
            on_interrupt.abort();
            print_result(result)
        }
        Command::Sync { kind, approve } => print_result(api.run_sync(kind, approve, ctx).await),
        Command::Watch => {
            let handle = api.start_scheduler().await.map_err(report_error)?;
            tokio::signal::ctrl_c().await?;
            handle.abort();
            tracing::info!("定时同步已停止");
            Ok(())
        }
        Command::Last { kind } => print_result(api.last_result(kind).await),
        Command::ConfigList => print_json(&state.config.list_global_config()?),
        Command::ConfigSet { key, value } => {
            state.config.set_global_config_value(&key, &value)?;
            print_json(&serde_json::json!({ "key": key, "value": value }))
        }
    }
}

fn print_result<T: Serialize>(result: Result<T, ApiError>) -> anyhow::Result<()> {
    let value = result.map_err(report_error)?;
    print_json(&value)
}

/// 错误对象写入 stdout，返回 anyhow 错误用于设置退出码
fn report_error(err: ApiError) -> anyhow::Error {
    match serde_json::to_string_pretty(&err.to_response()) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("错误序列化失败: {}", e),
    }
    anyhow!(err)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("{} v{}", shopfloor_import::APP_NAME, shopfloor_import::VERSION);

    let cli = parse_args(std::env::args().skip(1))?;
    run(cli).await
}
