//! Config 命令 - 查看与修改配置

use anyhow::Result;
use clap::Subcommand;
use std::collections::BTreeMap;

use super::output::format_output;
use crate::config::{ConfigKey, ConfigStore};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// 显示全部配置（已应用默认值）
    Show {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 修改一项配置
    Set {
        /// 配置键，如 retention_days、re_alert_interval、silent_mode
        key: ConfigKey,
        value: String,
    },
}

pub fn handle_config(config: &ConfigStore, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show { json } => {
            let values: BTreeMap<&str, String> = ConfigKey::ALL
                .iter()
                .map(|key| (key.as_str(), config.get(*key)))
                .collect();
            if json {
                println!("{}", format_output(&values));
            } else {
                for (key, value) in values {
                    println!("{key:<20} {value}");
                }
            }
        }
        ConfigCommand::Set { key, value } => {
            config.set(key, &value)?;
            println!("{} = {}", key, config.get(key));
        }
    }
    Ok(())
}
