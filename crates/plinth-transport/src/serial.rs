//! 本地串口后端
//!
//! 基于 `serialport`。读写半部通过 `try_clone` 共享同一个设备句柄。

use crate::{
    RxTransport, SplittableTransport, Transport, TransportDeviceError, TransportDeviceErrorKind,
    TransportError, TxTransport, map_io_error,
};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{info, trace};

fn map_serial_error(err: serialport::Error) -> TransportError {
    let kind = match err.kind() {
        serialport::ErrorKind::NoDevice => TransportDeviceErrorKind::NotFound,
        serialport::ErrorKind::InvalidInput => TransportDeviceErrorKind::UnsupportedConfig,
        serialport::ErrorKind::Io(io_kind) => {
            return map_io_error(std::io::Error::new(io_kind, err.description));
        },
        serialport::ErrorKind::Unknown => TransportDeviceErrorKind::Backend,
    };
    TransportError::Device(TransportDeviceError::new(kind, err.description))
}

/// 串口传输
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// 打开串口（8N1，无流控）
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(map_serial_error)?;
        info!("Serial port opened: {} @ {} baud", path, baud_rate);
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 列出系统中的串口
    pub fn available_ports() -> Result<Vec<String>, TransportError> {
        let ports = serialport::available_ports().map_err(map_serial_error)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport").field("path", &self.path).finish()
    }
}

fn read_port(port: &mut dyn SerialPort, buf: &mut [u8]) -> Result<usize, TransportError> {
    match port.read(buf) {
        Ok(n) => {
            trace!("serial read {} bytes", n);
            Ok(n)
        },
        Err(e) => Err(map_io_error(e)),
    }
}

fn write_port(port: &mut dyn SerialPort, bytes: &[u8]) -> Result<(), TransportError> {
    port.write_all(bytes).map_err(map_io_error)?;
    port.flush().map_err(map_io_error)
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_port(self.port.as_mut(), buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        write_port(self.port.as_mut(), bytes)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port.set_timeout(timeout).map_err(map_serial_error)
    }
}

/// 串口读半部
pub struct SerialRx {
    port: Box<dyn SerialPort>,
}

/// 串口写半部
pub struct SerialTx {
    port: Option<Box<dyn SerialPort>>,
}

impl RxTransport for SerialRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_port(self.port.as_mut(), buf)
    }
}

impl TxTransport for SerialTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.port.as_mut() {
            Some(port) => write_port(port.as_mut(), bytes),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // 串口没有半关闭；读半部依靠读超时 + is_running 退出
        self.port = None;
        Ok(())
    }
}

impl SplittableTransport for SerialTransport {
    type Rx = SerialRx;
    type Tx = SerialTx;

    fn split(self) -> Result<(SerialRx, SerialTx), TransportError> {
        let rx_port = self.port.try_clone().map_err(map_serial_error)?;
        Ok((
            SerialRx { port: rx_port },
            SerialTx {
                port: Some(self.port),
            },
        ))
    }
}
