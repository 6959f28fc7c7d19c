//! Builder 模式实现
//!
//! 提供链式构造 [`Driver`] 的便捷方式。

use crate::clock::{Clock, MonotonicClock};
use crate::driver::Driver;
use crate::error::DriverError;
use crate::pipeline::DriverConfig;
use plinth_transport::{DEFAULT_BAUD_RATE, TcpTransport, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// TCP 连接超时
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Driver Builder（链式构造）
///
/// ```no_run
/// use plinth_driver::{DriverBuilder, DriverConfig, TelemetryMode};
///
/// let driver = DriverBuilder::new()
///     .serial("/dev/ttyACM0")
///     .baud_rate(115_200)
///     .config(DriverConfig {
///         telemetry: TelemetryMode::Poll { interval_ms: 100, pipelined: false },
///         ..DriverConfig::default()
///     })
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct DriverBuilder {
    transport: Option<TransportConfig>,
    config: DriverConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用本地串口（默认 115200 波特）
    pub fn serial(mut self, path: impl Into<String>) -> Self {
        self.transport = Some(TransportConfig::serial(path));
        self
    }

    /// 设置串口波特率（仅对串口传输生效）
    pub fn baud_rate(mut self, baud: u32) -> Self {
        if let Some(TransportConfig::Serial { baud_rate, .. }) = self.transport.as_mut() {
            *baud_rate = baud;
        }
        self
    }

    /// 使用串口转 TCP 桥
    pub fn tcp(mut self, addr: impl Into<String>) -> Self {
        self.transport = Some(TransportConfig::tcp(addr));
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// 注入时钟（测试用）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Driver, DriverError> {
        let transport = self
            .transport
            .ok_or_else(|| DriverError::Config("no transport configured".to_string()))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let read_timeout = self.config.read_timeout();

        info!("Opening transport {}", transport.describe());
        match transport {
            TransportConfig::Serial { path, baud_rate } => {
                let baud_rate = if baud_rate == 0 { DEFAULT_BAUD_RATE } else { baud_rate };
                open_serial(&path, baud_rate, read_timeout, self.config, clock)
            },
            TransportConfig::Tcp { addr } => {
                let transport = TcpTransport::connect(&addr, TCP_CONNECT_TIMEOUT, read_timeout)?;
                Driver::with_clock(transport, self.config, clock)
            },
        }
    }
}

#[cfg(feature = "serial")]
fn open_serial(
    path: &str,
    baud_rate: u32,
    read_timeout: Duration,
    config: DriverConfig,
    clock: Arc<dyn Clock>,
) -> Result<Driver, DriverError> {
    let transport = plinth_transport::SerialTransport::open(path, baud_rate, read_timeout)?;
    Driver::with_clock(transport, config, clock)
}

#[cfg(not(feature = "serial"))]
fn open_serial(
    path: &str,
    _baud_rate: u32,
    _read_timeout: Duration,
    _config: DriverConfig,
    _clock: Arc<dyn Clock>,
) -> Result<Driver, DriverError> {
    use plinth_transport::{TransportDeviceError, TransportDeviceErrorKind, TransportError};
    Err(DriverError::Transport(TransportError::Device(TransportDeviceError::new(
        TransportDeviceErrorKind::UnsupportedConfig,
        format!("{path}: serial backend not compiled in (enable the `serial` feature)"),
    ))))
}
