//! Run 命令 - 常驻模式，从标准输入读取宿主事件

use anyhow::Result;
use clap::Args;
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::hub::NotificationHub;
use crate::notification::{pump_lines, HostSignal};

/// Run 命令参数
#[derive(Debug, Args)]
pub struct RunArgs {
    /// 启动时不自动发送 connected 信号
    #[arg(long)]
    pub wait_for_connect: bool,
}

pub async fn handle_run(hub: &NotificationHub, args: RunArgs) -> Result<()> {
    info!(surfaces = ?hub.dispatcher.surface_names(), "Alert surfaces registered");
    let runtime = hub.start(None);

    if !args.wait_for_connect {
        runtime.intake().submit(HostSignal::Connected).await;
    }

    let mut errors = hub.errors.subscribe();
    let error_log = tokio::spawn(async move {
        while let Ok(event) = errors.recv().await {
            eprintln!("[{}] {}: {}", event.error.code(), event.component, event.error);
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        res = pump_lines(stdin, runtime.intake()) => {
            match res {
                Ok(count) => info!(count, "Host input closed"),
                Err(e) => warn!(error = %e, "Failed to read host input"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    let stats = runtime.shutdown().await;
    error_log.abort();
    println!(
        "Stored {} notifications, discarded {}, cancelled {}",
        stats.stored, stats.discarded, stats.cancelled
    );
    Ok(())
}
