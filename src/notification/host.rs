//! 宿主事件源 - 从 JSON Lines 读取宿主推送的通知与连接信号
//!
//! 每行一个 JSON 对象，`type` 字段区分：
//! ```text
//! {"type":"connected"}
//! {"type":"event","source_id":"com.bank","title":"OTP","body":"123456"}
//! {"type":"event","source_id":"com.bank","kind":"removed"}
//! {"type":"disconnected"}
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use super::intake::{HostSignal, IntakeHandle, RawEvent};
use crate::error::HubError;

/// 一行宿主消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Event(RawEvent),
    Connected,
    Disconnected,
}

impl From<HostMessage> for HostSignal {
    fn from(message: HostMessage) -> Self {
        match message {
            HostMessage::Event(event) => HostSignal::Event(event),
            HostMessage::Connected => HostSignal::Connected,
            HostMessage::Disconnected => HostSignal::Disconnected,
        }
    }
}

/// 解析一行；空行返回 None
pub fn parse_host_line(line: &str) -> Result<Option<HostSignal>, HubError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<HostMessage>(line)
        .map(|message| Some(message.into()))
        .map_err(|e| HubError::InvalidInput(format!("invalid host message: {e}")))
}

/// 逐行读取并提交给采集线程，返回提交的信号数
///
/// 无法解析的行记录警告后跳过；输入结束或采集线程退出时返回。
pub async fn pump_lines<R>(reader: R, handle: &IntakeHandle) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut submitted = 0;

    while let Some(line) = lines.next_line().await? {
        match parse_host_line(&line) {
            Ok(Some(signal)) => {
                if !handle.submit(signal).await {
                    debug!("Intake worker gone, stop reading host input");
                    break;
                }
                submitted += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Skipping malformed host line"),
        }
    }

    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::intake::EventKind;

    #[test]
    fn test_parse_connection_signals() {
        assert_eq!(
            parse_host_line(r#"{"type":"connected"}"#).unwrap(),
            Some(HostSignal::Connected)
        );
        assert_eq!(
            parse_host_line(r#"{"type":"disconnected"}"#).unwrap(),
            Some(HostSignal::Disconnected)
        );
    }

    #[test]
    fn test_parse_event_line() {
        let signal = parse_host_line(
            r#"{"type":"event","source_id":"com.bank","title":"OTP","body":"1","flags":{"ongoing":true}}"#,
        )
        .unwrap();
        match signal {
            Some(HostSignal::Event(event)) => {
                assert_eq!(event.source_id, "com.bank");
                assert_eq!(event.kind, EventKind::Posted);
                assert!(event.flags.ongoing);
                assert!(!event.flags.group_summary);
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn test_blank_and_malformed_lines() {
        assert_eq!(parse_host_line("   ").unwrap(), None);
        let err = parse_host_line("{not json").unwrap_err();
        assert_eq!(err.code(), HubError::InvalidInput(String::new()).code());
    }
}
