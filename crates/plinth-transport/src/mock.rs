//! 内存模拟设备
//!
//! [`MockTransport::pair`] 返回一端传输和一端设备句柄：
//! 测试通过 [`MockDevice`] 注入设备输出、检查写入的命令、模拟断线。

use crate::{RxTransport, SplittableTransport, Transport, TransportError, TxTransport};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Shared {
    written: Mutex<Vec<u8>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

/// 模拟传输（整体形态）
#[derive(Debug)]
pub struct MockTransport {
    rx: MockRx,
    tx: MockTx,
}

/// 模拟设备句柄
#[derive(Debug, Clone)]
pub struct MockDevice {
    inbound: Sender<Vec<u8>>,
    shared: Arc<Shared>,
}

/// 模拟读半部
#[derive(Debug)]
pub struct MockRx {
    inbound: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    read_timeout: Duration,
    shared: Arc<Shared>,
}

/// 模拟写半部
#[derive(Debug)]
pub struct MockTx {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, MockDevice) {
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::default());
        let transport = MockTransport {
            rx: MockRx {
                inbound: inbound_rx,
                pending: Vec::new(),
                read_timeout: DEFAULT_READ_TIMEOUT,
                shared: shared.clone(),
            },
            tx: MockTx {
                shared: shared.clone(),
            },
        };
        let device = MockDevice {
            inbound: inbound_tx,
            shared,
        };
        (transport, device)
    }
}

impl MockDevice {
    /// 注入一块原始字节（不追加换行）
    pub fn push_bytes(&self, bytes: &[u8]) {
        let _ = self.inbound.send(bytes.to_vec());
    }

    /// 注入一行设备输出（追加 `\n`）
    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{line}\n").as_bytes());
    }

    /// 已写入的完整行（不含结束符）
    pub fn written_lines(&self) -> Vec<String> {
        let written = self.shared.written.lock();
        split_lines(&written)
    }

    /// 取走已写入的完整行
    pub fn take_written_lines(&self) -> Vec<String> {
        let mut written = self.shared.written.lock();
        let lines = split_lines(&written);
        let consumed = written.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        written.drain(..consumed);
        lines
    }

    /// 模拟设备断开：读半部在缓冲数据读完后返回 EOF，写半部返回 `Closed`
    pub fn disconnect(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// 让后续写入返回 IO 错误
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::Release);
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    // 最后一段没有结束符
    lines.pop();
    lines
}

impl MockRx {
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

impl RxTransport for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.inbound.recv_timeout(self.read_timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => {
                    if self.shared.closed.load(Ordering::Acquire) && self.inbound.is_empty() {
                        return Ok(0);
                    }
                    return Err(TransportError::Timeout);
                },
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl TxTransport for MockTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.shared.fail_writes.load(Ordering::Acquire) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        self.shared.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.shared.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.rx.read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.tx.write_all(bytes)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.rx.set_read_timeout(timeout);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.tx.close()
    }
}

impl SplittableTransport for MockTransport {
    type Rx = MockRx;
    type Tx = MockTx;

    fn split(self) -> Result<(MockRx, MockTx), TransportError> {
        Ok((self.rx, self.tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_reads_injected_bytes_in_pieces() {
        let (mut transport, device) = MockTransport::pair();
        device.push_bytes(b"12,34\n");

        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"12,3");
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"4\n");
        assert!(matches!(transport.read(&mut buf), Err(TransportError::Timeout)));
        assert_eq!(transport.try_read(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_mock_records_written_lines() {
        let (mut transport, device) = MockTransport::pair();
        transport.write_all(b"init\n0,0\n").unwrap();
        transport.write_all(b"rem").unwrap();
        assert_eq!(device.written_lines(), vec!["init", "0,0"]);
        transport.write_all(b"ote\n").unwrap();
        assert_eq!(device.take_written_lines(), vec!["init", "0,0", "remote"]);
        assert!(device.written_lines().is_empty());
    }

    #[test]
    fn test_mock_disconnect_drains_then_eof() {
        let (transport, device) = MockTransport::pair();
        let (mut rx, mut tx) = transport.split().unwrap();
        device.push_line("bye");
        device.disconnect();

        let mut buf = [0u8; 16];
        assert_eq!(rx.read(&mut buf).unwrap(), 4);
        assert_eq!(rx.read(&mut buf).unwrap(), 0);
        assert!(matches!(tx.write_all(b"x\n"), Err(TransportError::Closed)));
    }

    #[test]
    fn test_mock_write_failure() {
        let (mut transport, device) = MockTransport::pair();
        device.set_fail_writes(true);
        assert!(matches!(transport.write_all(b"x\n"), Err(TransportError::Io(_))));
        device.set_fail_writes(false);
        transport.write_all(b"x\n").unwrap();
        assert_eq!(device.written_lines(), vec!["x"]);
    }
}
