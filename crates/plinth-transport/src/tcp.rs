//! 串口转 TCP 桥后端
//!
//! 适用于 `ser2net` 之类把设备串口暴露为 TCP 端口的桥接器。

use crate::{
    RxTransport, SplittableTransport, Transport, TransportDeviceError, TransportDeviceErrorKind,
    TransportError, TxTransport, map_io_error,
};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, trace};

/// TCP 传输
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// 连接到 `host:port`，逐个尝试解析出的地址
    pub fn connect(
        addr: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let addrs: Vec<SocketAddr> = addr.to_socket_addrs().map_err(map_io_error)?.collect();
        if addrs.is_empty() {
            return Err(TransportError::Device(TransportDeviceError::new(
                TransportDeviceErrorKind::NotFound,
                format!("{addr} did not resolve to any address"),
            )));
        }

        let mut last_err = None;
        for peer in addrs {
            match TcpStream::connect_timeout(&peer, connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(map_io_error)?;
                    stream.set_read_timeout(Some(read_timeout)).map_err(map_io_error)?;
                    info!("TCP transport connected: {}", peer);
                    return Ok(Self { stream, peer });
                },
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", peer, e);
                    last_err = Some(e);
                },
            }
        }
        Err(map_io_error(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no address to connect to")
        })))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

fn read_stream(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, TransportError> {
    match stream.read(buf) {
        Ok(n) => {
            trace!("tcp read {} bytes", n);
            Ok(n)
        },
        Err(e) => Err(map_io_error(e)),
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_stream(&mut self.stream, buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).map_err(map_io_error)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.stream.set_read_timeout(Some(timeout)).map_err(map_io_error)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        shutdown(&self.stream)
    }
}

fn shutdown(stream: &TcpStream) -> Result<(), TransportError> {
    match stream.shutdown(Shutdown::Both) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(map_io_error(e)),
    }
}

/// TCP 读半部
#[derive(Debug)]
pub struct TcpRx {
    stream: TcpStream,
}

/// TCP 写半部
#[derive(Debug)]
pub struct TcpTx {
    stream: TcpStream,
    closed: bool,
}

impl RxTransport for TcpRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_stream(&mut self.stream, buf)
    }
}

impl TxTransport for TcpTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream.write_all(bytes).map_err(map_io_error)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // 双向关闭：阻塞中的读半部立即返回 EOF
        shutdown(&self.stream)
    }
}

impl SplittableTransport for TcpTransport {
    type Rx = TcpRx;
    type Tx = TcpTx;

    fn split(self) -> Result<(TcpRx, TcpTx), TransportError> {
        let rx_stream = self.stream.try_clone().map_err(map_io_error)?;
        Ok((
            TcpRx { stream: rx_stream },
            TcpTx {
                stream: self.stream,
                closed: false,
            },
        ))
    }
}
