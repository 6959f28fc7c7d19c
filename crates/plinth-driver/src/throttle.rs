//! 下行节流
//!
//! 所有写往设备的命令（指针、图案、手动命令、轮询）共用一个节流窗口：
//! 任意两次写入的派发时刻之差不小于最小间隔。
//!
//! - [`Throttle::try_send`]：尽力而为。窗口未到期返回 `Dropped(Interval)`，
//!   已有写入在途返回 `Dropped(InFlight)`，不排队。
//! - [`Throttle::send_forced`]：可靠路径（模式令牌、中位设定点、手动命令）。
//!   等待在途写入和窗口剩余时间后写入，同样遵守窗口。
//!
//! 写入失败不推进窗口。

use crate::clock::Clock;
use crate::error::DriverError;
use crate::metrics::BridgeMetrics;
use crate::state::BridgeContext;
use parking_lot::Mutex;
use plinth_protocol::Command;
use plinth_transport::{TransportError, TxTransport};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, trace};

/// 默认最小发送间隔
pub const DEFAULT_MIN_SEND_INTERVAL: Duration = Duration::from_millis(30);

/// 丢弃原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 距上次写入不足最小间隔
    Interval,
    /// 已有写入在途
    InFlight,
}

/// `try_send` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped(DropReason),
}

impl SendOutcome {
    pub fn is_sent(self) -> bool {
        self == SendOutcome::Sent
    }
}

struct Window {
    tx: Box<dyn TxTransport + Send>,
    last_send: Option<Duration>,
    closed: bool,
}

/// 节流器（每个连接一个）
pub struct Throttle {
    window: Mutex<Window>,
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    ctx: Arc<BridgeContext>,
    metrics: Arc<BridgeMetrics>,
}

impl Throttle {
    pub fn new(
        tx: Box<dyn TxTransport + Send>,
        min_interval: Duration,
        clock: Arc<dyn Clock>,
        ctx: Arc<BridgeContext>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            window: Mutex::new(Window {
                tx,
                last_send: None,
                closed: false,
            }),
            min_interval,
            clock,
            ctx,
            metrics,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 上次成功写入的派发时刻
    ///
    /// 有写入在途时会等待其完成。
    pub fn last_send(&self) -> Option<Duration> {
        self.window.lock().last_send
    }

    /// 尽力发送
    pub fn try_send(&self, command: &Command) -> Result<SendOutcome, DriverError> {
        let Some(mut window) = self.window.try_lock() else {
            self.metrics.tx_dropped_inflight.fetch_add(1, Ordering::Relaxed);
            trace!("Dropped {:?}: write in flight", command);
            return Ok(SendOutcome::Dropped(DropReason::InFlight));
        };

        let now = self.clock.now();
        if let Some(last) = window.last_send
            && now.saturating_sub(last) < self.min_interval
        {
            self.metrics.tx_dropped_interval.fetch_add(1, Ordering::Relaxed);
            trace!("Dropped {:?}: within send interval", command);
            return Ok(SendOutcome::Dropped(DropReason::Interval));
        }

        self.dispatch(&mut window, command, now)?;
        Ok(SendOutcome::Sent)
    }

    /// 可靠发送：等待在途写入和窗口剩余时间
    pub fn send_forced(&self, command: &Command) -> Result<(), DriverError> {
        let mut window = self.window.lock();
        let now = loop {
            let now = self.clock.now();
            match window.last_send {
                Some(last) if now.saturating_sub(last) < self.min_interval => {
                    self.clock.sleep(self.min_interval - now.saturating_sub(last));
                },
                _ => break now,
            }
        };

        self.dispatch(&mut window, command, now)?;
        self.metrics.tx_forced_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// 关闭写半部（幂等）
    pub fn close(&self) {
        let mut window = self.window.lock();
        if window.closed {
            return;
        }
        window.closed = true;
        if let Err(e) = window.tx.close() {
            trace!("Closing transport TX half failed: {}", e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.window.lock().closed
    }

    fn dispatch(&self, window: &mut Window, command: &Command, now: Duration) -> Result<(), DriverError> {
        if window.closed {
            return Err(DriverError::Transport(TransportError::Closed));
        }

        let line = command.encode();
        if let Err(e) = window.tx.write_all(line.as_bytes()) {
            self.metrics.device_errors.fetch_add(1, Ordering::Relaxed);
            error!("Write of {:?} failed: {}", command, e);
            return Err(e.into());
        }

        window.last_send = Some(now);
        self.metrics.tx_lines_total.fetch_add(1, Ordering::Relaxed);
        trace!("Sent {:?}", command);

        let hooks = self.ctx.hooks.read();
        hooks.trigger_all_sent(line.trim_end());
        Ok(())
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
