//! Ingest 命令 - 手动采集一条通知

use anyhow::Result;
use clap::Args;

use super::output::{format_output, format_record_line};
use crate::hub::NotificationHub;
use crate::notification::{EventFlags, IntakeOutcome, RawEvent};

/// Ingest 命令参数
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// 来源标识
    #[arg(long, short)]
    pub source: String,
    #[arg(long, short, default_value = "")]
    pub title: String,
    #[arg(long, short, default_value = "")]
    pub body: String,
    /// 来源显示名（首次登记时使用）
    #[arg(long)]
    pub name: Option<String>,
    /// 标记为常驻通知
    #[arg(long)]
    pub ongoing: bool,
    /// 标记为分组摘要
    #[arg(long)]
    pub group_summary: bool,
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

pub fn handle_ingest(hub: &NotificationHub, args: IngestArgs) -> Result<()> {
    if let Some(name) = &args.name {
        hub.store.register_source(&args.source, name)?;
    }

    let event = RawEvent::posted(args.source, args.title, args.body).with_flags(EventFlags {
        ongoing: args.ongoing,
        group_summary: args.group_summary,
    });

    match hub.ingest(event) {
        IntakeOutcome::Stored(record) => {
            if args.json {
                println!("{}", format_output(&record));
            } else {
                println!("Stored {}", format_record_line(&record));
            }
        }
        IntakeOutcome::Discarded(reason) => {
            if args.json {
                println!("{}", format_output(&serde_json::json!({ "discarded": reason })));
            } else {
                println!("Discarded: {:?}", reason);
            }
        }
    }
    Ok(())
}
