//! Notification Hub CLI
//!
//! 采集通知、管理来源重要性、查看历史，并在常驻模式下对未读重要通知定时重提醒

use anyhow::Result;
use clap::{Parser, Subcommand};
use notification_hub::cli::{
    handle_config, handle_ingest, handle_list, handle_prefs, handle_range, handle_run,
    handle_search, ConfigCommand, IngestArgs, ListArgs, PrefsCommand, RangeArgs, RunArgs,
    ViewArgs,
};
use notification_hub::notification::channels::{ConsoleSurface, LocalFileSurface};
use notification_hub::{AlertDispatcher, HubPaths, NotificationHub};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "nhub")]
#[command(about = "Notification Hub - 采集通知并对重要通知定时重提醒")]
#[command(version)]
struct Cli {
    /// 数据目录（默认使用系统数据/配置目录）
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Dry-run 模式（提醒只打印不发送）
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 采集一条通知
    Ingest(IngestArgs),
    /// 列出通知
    List(ListArgs),
    /// 按关键字搜索来源、标题和正文
    Search {
        query: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// 按时间范围列出通知
    Range(RangeArgs),
    /// 标记一条通知为已读
    Read {
        id: i64,
    },
    /// 将所有重要通知标记为已读
    ReadAll,
    /// 管理来源重要性
    #[command(subcommand)]
    Prefs(PrefsCommand),
    /// 立即执行一次清理
    Cleanup {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 存储占用估算（先执行清理）
    Stats {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看或修改配置
    #[command(subcommand)]
    Config(ConfigCommand),
    /// 清空所有通知
    Clear {
        /// 同时把所有来源重置为非重要
        #[arg(long)]
        reset_prefs: bool,
    },
    /// 常驻模式：从标准输入读取 JSON Lines 宿主事件
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notification_hub=info,nhub=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    let paths = match &cli.data_dir {
        Some(dir) => HubPaths::in_dir(dir),
        None => HubPaths::default_paths(),
    };
    debug!(?paths, "Resolved data paths");

    let mut dispatcher = AlertDispatcher::new().with_dry_run(cli.dry_run);
    dispatcher.register_surface(Arc::new(LocalFileSurface::new(paths.alert_log.clone())));
    if matches!(cli.command, Commands::Run(_)) {
        dispatcher.register_surface(Arc::new(ConsoleSurface::new()));
    }

    let hub = NotificationHub::open(&paths, dispatcher)?;

    if hub.config.first_launch() {
        eprintln!("Welcome to Notification Hub! Mark sources as important with `nhub prefs set <source> --important true`.");
        hub.config.set_first_launch(false)?;
    }

    match cli.command {
        Commands::Ingest(args) => handle_ingest(&hub, args)?,
        Commands::List(args) => handle_list(&hub, args)?,
        Commands::Search { query, view } => handle_search(&hub, query, view)?,
        Commands::Range(args) => handle_range(&hub, args)?,
        Commands::Read { id } => {
            if hub.summary.mark_as_read(id) {
                println!("Marked #{} as read", id);
            } else {
                println!("No unread notification #{}", id);
            }
        }
        Commands::ReadAll => {
            let count = hub.summary.mark_all_important_as_read();
            println!("Marked {} important notifications as read", count);
        }
        Commands::Prefs(command) => handle_prefs(&hub, command)?,
        Commands::Cleanup { json } => {
            let report = hub.cleanup.run_cleanup().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Deleted {} notifications ({} by age, {} by count)",
                    report.total(),
                    report.deleted_by_age,
                    report.deleted_by_count
                );
            }
        }
        Commands::Stats { json } => {
            let estimate = hub.cleanup.storage_estimate().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&estimate)?);
            } else {
                println!(
                    "{} notifications, about {}",
                    estimate.records,
                    estimate.display_size()
                );
                println!(
                    "{} unread important",
                    hub.store.unread_important_count()?
                );
            }
        }
        Commands::Config(command) => handle_config(&hub.config, command)?,
        Commands::Clear { reset_prefs } => {
            let deleted = hub.clear_all(reset_prefs)?;
            println!("Deleted {} notifications", deleted);
        }
        Commands::Run(args) => handle_run(&hub, args).await?,
    }

    Ok(())
}
