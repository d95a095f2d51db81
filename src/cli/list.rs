//! List / search / range 命令 - 展示视图

use anyhow::{anyhow, Result};
use chrono::DateTime;
use clap::{Args, ValueEnum};

use super::output::print_records;
use crate::hub::NotificationHub;
use crate::notification::{RecordQuery, ViewSpec};

/// 列表过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFilter {
    All,
    Important,
    Other,
    /// 未读重要
    Unread,
}

impl ListFilter {
    pub fn query(self) -> RecordQuery {
        match self {
            ListFilter::All => RecordQuery::All,
            ListFilter::Important => RecordQuery::Important,
            ListFilter::Other => RecordQuery::Other,
            ListFilter::Unread => RecordQuery::UnreadImportant,
        }
    }
}

/// 视图通用参数
#[derive(Debug, Args)]
pub struct ViewArgs {
    /// 不折叠重复通知
    #[arg(long)]
    pub raw: bool,
    /// 最多显示条数
    #[arg(long, short, default_value = "50")]
    pub limit: usize,
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// List 命令参数
#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, short, value_enum, default_value = "all")]
    pub filter: ListFilter,
    #[command(flatten)]
    pub view: ViewArgs,
}

/// Range 命令参数
#[derive(Debug, Args)]
pub struct RangeArgs {
    /// 起始时间（RFC3339 或 Unix 毫秒）
    #[arg(long)]
    pub from: String,
    /// 结束时间（RFC3339 或 Unix 毫秒），含
    #[arg(long)]
    pub to: String,
    #[command(flatten)]
    pub view: ViewArgs,
}

pub fn handle_list(hub: &NotificationHub, args: ListArgs) -> Result<()> {
    show(hub, args.filter.query(), &args.view)
}

pub fn handle_search(hub: &NotificationHub, query: String, view: ViewArgs) -> Result<()> {
    show(hub, RecordQuery::Search(query), &view)
}

pub fn handle_range(hub: &NotificationHub, args: RangeArgs) -> Result<()> {
    let start = parse_time(&args.from)?;
    let end = parse_time(&args.to)?;
    if start > end {
        return Err(anyhow!("--from must not be after --to"));
    }
    show(hub, RecordQuery::DateRange { start, end }, &args.view)
}

fn show(hub: &NotificationHub, query: RecordQuery, view: &ViewArgs) -> Result<()> {
    let mut spec = ViewSpec::new(query);
    if view.raw {
        spec = spec.raw();
    }
    let snapshot = hub.view(&spec);
    if let Some(error) = snapshot.error {
        return Err(anyhow!("[{}] {}", error.code(), error));
    }
    let records: Vec<_> = snapshot.records.into_iter().take(view.limit).collect();
    print_records(&records, view.json);
    Ok(())
}

/// 解析 RFC3339 或 Unix 毫秒
pub fn parse_time(value: &str) -> Result<i64> {
    if let Ok(ms) = value.trim().parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| anyhow!("invalid time '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_accepts_millis_and_rfc3339() {
        assert_eq!(parse_time("1700000000000").unwrap(), 1_700_000_000_000);
        assert_eq!(parse_time("1970-01-01T00:00:01Z").unwrap(), 1000);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_filter_maps_to_query() {
        assert_eq!(ListFilter::Unread.query(), RecordQuery::UnreadImportant);
        assert_eq!(ListFilter::Other.query(), RecordQuery::Other);
    }
}
