//! 驱动层错误类型定义

use plinth_protocol::ProtocolError;
use plinth_transport::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 命令构造错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 连接已断开（RX 线程退出或写入失败后拆除）
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 配置错误（例如未指定传输）
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DriverError {
    /// 是否意味着连接已不可用
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            DriverError::Transport(e) => e.is_fatal(),
            DriverError::ConnectionLost(_) | DriverError::IoThread(_) => true,
            DriverError::Protocol(_) | DriverError::Config(_) => false,
        }
    }
}
