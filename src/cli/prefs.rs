//! Prefs 命令 - 管理来源重要性

use anyhow::Result;
use clap::Subcommand;

use super::output::format_output;
use crate::hub::NotificationHub;

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// 列出已登记的来源
    List {
        /// 只显示重要来源
        #[arg(long)]
        important: bool,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 设置来源重要性
    Set {
        /// 来源标识
        source: String,
        #[arg(long, action = clap::ArgAction::Set)]
        important: bool,
        /// 显示名
        #[arg(long)]
        name: Option<String>,
    },
}

pub fn handle_prefs(hub: &NotificationHub, command: PrefsCommand) -> Result<()> {
    match command {
        PrefsCommand::List { important, json } => {
            let prefs: Vec<_> = hub
                .store
                .preferences()?
                .into_iter()
                .filter(|p| !important || p.is_important)
                .collect();
            if json {
                println!("{}", format_output(&prefs));
            } else if prefs.is_empty() {
                println!("No sources registered yet");
            } else {
                for pref in &prefs {
                    let mark = if pref.is_important { "★" } else { " " };
                    println!("{} {} ({})", mark, pref.display_name, pref.source_id);
                }
                println!(
                    "\n{} of {} sources marked important",
                    hub.store.important_source_count()?,
                    prefs.len()
                );
            }
        }
        PrefsCommand::Set {
            source,
            important,
            name,
        } => {
            let pref = hub.set_importance(&source, name.as_deref(), important)?;
            println!(
                "{} is now {}",
                pref.display_name,
                if pref.is_important { "important" } else { "not important" }
            );
        }
    }
    Ok(())
}
