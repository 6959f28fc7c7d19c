//! 客户端错误类型

use crate::mode::Mode;
use plinth_driver::DriverError;
use plinth_protocol::ProtocolError;
use thiserror::Error;

/// 会话层错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 驱动层错误（传输失败、连接断开等）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 命令文本非法
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 非有限坐标或退化的表面尺寸（在任何发送之前拒绝）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Nothing to play: no pattern recorded")]
    EmptyPattern,

    #[error("Pattern playback already in progress")]
    PlaybackConflict,

    #[error("Not connected")]
    NotConnected,

    /// 该模式不能通过 `set_mode` 进入
    #[error("Mode {0} cannot be entered directly")]
    InvalidMode(Mode),
}

impl ClientError {
    /// 是否意味着连接已不可用
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            ClientError::Driver(e) => e.is_connection_fatal(),
            ClientError::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ClientError::EmptyPattern.to_string(),
            "Nothing to play: no pattern recorded"
        );
        assert_eq!(
            ClientError::InvalidMode(Mode::PatternPlay).to_string(),
            "Mode pattern-play cannot be entered directly"
        );
    }

    #[test]
    fn test_connection_fatal() {
        assert!(ClientError::NotConnected.is_connection_fatal());
        assert!(ClientError::Driver(DriverError::ConnectionLost("eof".into())).is_connection_fatal());
        assert!(!ClientError::PlaybackConflict.is_connection_fatal());
    }
}
