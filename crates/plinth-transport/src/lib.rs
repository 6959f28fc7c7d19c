//! # Plinth Transport Layer
//!
//! 双工字节流抽象，提供统一的读写接口。
//!
//! ## 后端
//!
//! - `serial`: 本地串口（`serialport`，默认 115200 波特）
//! - `tcp`: 串口转 TCP 桥（例如 `ser2net`）
//! - `mock`: 内存模拟设备（测试用）
//!
//! ## 读语义
//!
//! ```text
//! Ok(n > 0)      收到 n 字节
//! Ok(0)          对端关闭（EOF）
//! Err(Timeout)   读超时内无数据，可以继续读
//! Err(其他)      传输错误
//! ```

use std::io;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "serial")]
pub use serial::{SerialRx, SerialTransport, SerialTx};

pub mod tcp;

pub use tcp::{TcpRx, TcpTransport, TcpTx};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockDevice, MockRx, MockTransport, MockTx};

/// 串口默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] TransportDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Transport closed")]
    Closed,
    #[error("Transport not open")]
    NotOpen,
}

impl TransportError {
    /// 是否需要拆除连接
    ///
    /// 只有超时和被信号打断的 IO 可以重试。
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Timeout => false,
            TransportError::Io(e) => e.kind() != io::ErrorKind::Interrupted,
            _ => true,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct TransportDeviceError {
    pub kind: TransportDeviceErrorKind,
    pub message: String,
}

impl TransportDeviceError {
    pub fn new(kind: TransportDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<String> for TransportDeviceError {
    fn from(message: String) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for TransportDeviceError {
    fn from(message: &str) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

/// 把 IO 错误映射到传输层语义（超时、关闭、设备错误）
pub(crate) fn map_io_error(err: io::Error) -> TransportError {
    use io::ErrorKind;
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout,
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::UnexpectedEof => TransportError::Closed,
        ErrorKind::NotFound => TransportError::Device(TransportDeviceError::new(
            TransportDeviceErrorKind::NotFound,
            err.to_string(),
        )),
        ErrorKind::PermissionDenied => TransportError::Device(TransportDeviceError::new(
            TransportDeviceErrorKind::AccessDenied,
            err.to_string(),
        )),
        _ => TransportError::Io(err),
    }
}

/// 双工字节流
pub trait Transport {
    /// 读取一块数据（语义见模块文档）
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// 写入完整的字节序列
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    /// 非阻塞读：没有数据时返回 `Ok(None)`
    fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        match self.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(TransportError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// 只读半部（由 RX 线程独占）
pub trait RxTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// 只写半部
pub trait TxTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// 关闭写半部；流式后端会让对应的读半部返回 EOF
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// 可拆分为独立读写半部的传输
pub trait SplittableTransport: Transport {
    type Rx: RxTransport;
    type Tx: TxTransport;
    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError>;
}

/// 传输配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "lowercase"))]
pub enum TransportConfig {
    /// 本地串口
    Serial { path: String, baud_rate: u32 },
    /// 串口转 TCP 桥（`host:port`）
    Tcp { addr: String },
}

impl TransportConfig {
    pub fn serial(path: impl Into<String>) -> Self {
        TransportConfig::Serial {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        TransportConfig::Tcp { addr: addr.into() }
    }

    /// 日志用的简短描述
    pub fn describe(&self) -> String {
        match self {
            TransportConfig::Serial { path, baud_rate } => format!("serial:{path}@{baud_rate}"),
            TransportConfig::Tcp { addr } => format!("tcp:{addr}"),
        }
    }
}
