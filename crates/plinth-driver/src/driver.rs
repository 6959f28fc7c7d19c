//! Driver 模块
//!
//! 对外的 [`Driver`]，封装后台 IO 线程、节流窗口和遥测状态。
//! 一个 `Driver` 对应一个连接；连接断开后不可复用，需要重新构建。

use crate::clock::{Clock, MonotonicClock};
use crate::error::DriverError;
use crate::hooks::FrameCallback;
use crate::metrics::{BridgeMetrics, MetricsSnapshot};
use crate::pipeline::{self, DriverConfig, poll_schedule, tear_down};
use crate::state::{BridgeContext, TelemetrySample, TelemetryState};
use crate::tap::FrameTap;
use crate::telemetry::TelemetryReconciler;
use crate::throttle::{SendOutcome, Throttle};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use plinth_protocol::{Command, Frame};
use plinth_transport::{SplittableTransport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info, warn};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: std::marker::Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join，本线程带超时等待
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 平台驱动（对外 API）
///
/// ```rust,no_run
/// use plinth_driver::{Driver, DriverConfig};
/// use plinth_protocol::{Command, ModeToken};
/// use plinth_transport::TcpTransport;
/// use std::time::Duration;
///
/// let transport = TcpTransport::connect(
///     "192.168.1.20:4001",
///     Duration::from_secs(2),
///     Duration::from_millis(20),
/// )?;
/// let driver = Driver::new(transport, DriverConfig::default())?;
/// driver.send_forced(&Command::Mode(ModeToken::Remote))?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Driver {
    throttle: Arc<Throttle>,
    ctx: Arc<BridgeContext>,
    metrics: Arc<BridgeMetrics>,
    clock: Arc<dyn Clock>,
    /// 运行标志（RX / 轮询线程共享，清除即停止）
    is_running: Arc<AtomicBool>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
    config: DriverConfig,
}

impl Driver {
    /// 用生产时钟创建驱动
    pub fn new<T>(transport: T, config: DriverConfig) -> Result<Self, DriverError>
    where
        T: SplittableTransport,
        T::Rx: Send + 'static,
        T::Tx: Send + 'static,
    {
        Self::with_clock(transport, config, Arc::new(MonotonicClock::new()))
    }

    /// 注入时钟创建驱动
    pub fn with_clock<T>(
        transport: T,
        config: DriverConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DriverError>
    where
        T: SplittableTransport,
        T::Rx: Send + 'static,
        T::Tx: Send + 'static,
    {
        let (rx, tx) = transport.split()?;

        let ctx = Arc::new(BridgeContext::new());
        let metrics = Arc::new(BridgeMetrics::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let throttle = Arc::new(Throttle::new(
            Box::new(tx),
            config.min_send_interval(),
            clock.clone(),
            ctx.clone(),
            metrics.clone(),
        ));
        let reconciler = TelemetryReconciler::new(config.envelope, config.telemetry);
        let poll_state = reconciler.poll_state();

        let rx_thread = {
            let ctx = ctx.clone();
            let throttle = throttle.clone();
            let clock = clock.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            std::thread::Builder::new()
                .name("plinth-rx".into())
                .spawn(move || {
                    pipeline::rx_loop(rx, ctx, throttle, reconciler, clock, is_running, metrics)
                })
                .map_err(|e| DriverError::IoThread(e.to_string()))?
        };

        let poll_thread = match (poll_state, poll_schedule(&config)) {
            (Some(poll), Some(schedule)) => {
                let spawned = {
                    let ctx = ctx.clone();
                    let throttle = throttle.clone();
                    let clock = clock.clone();
                    let is_running = is_running.clone();
                    let metrics = metrics.clone();
                    std::thread::Builder::new()
                        .name("plinth-poll".into())
                        .spawn(move || {
                            pipeline::poll_loop(
                                throttle, ctx, poll, schedule, clock, is_running, metrics,
                            )
                        })
                };
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        is_running.store(false, Ordering::Release);
                        throttle.close();
                        let _ = rx_thread.join_timeout(config.join_timeout());
                        return Err(DriverError::IoThread(e.to_string()));
                    },
                }
            },
            _ => None,
        };

        info!(
            "Driver started (min interval {:?}, telemetry {:?})",
            config.min_send_interval(),
            config.telemetry
        );

        Ok(Self {
            throttle,
            ctx,
            metrics,
            clock,
            is_running,
            rx_thread: Mutex::new(Some(rx_thread)),
            poll_thread: Mutex::new(poll_thread),
            config,
        })
    }

    /// 尽力发送（受节流窗口约束，可能被丢弃）
    pub fn try_send(&self, command: &Command) -> Result<SendOutcome, DriverError> {
        self.ensure_connected()?;
        self.throttle.try_send(command).map_err(|e| self.on_write_error(e))
    }

    /// 可靠发送（等待窗口后写入）
    pub fn send_forced(&self, command: &Command) -> Result<(), DriverError> {
        self.ensure_connected()?;
        self.throttle.send_forced(command).map_err(|e| self.on_write_error(e))
    }

    /// 连接是否仍然可用
    pub fn is_connected(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 断开原因（连接仍可用时为 `None`）
    pub fn disconnect_reason(&self) -> Option<String> {
        self.ctx.disconnect_reason()
    }

    /// 遥测状态快照
    pub fn telemetry(&self) -> Arc<TelemetryState> {
        self.ctx.telemetry()
    }

    /// 最新位置样本
    pub fn latest_sample(&self) -> Option<TelemetrySample> {
        self.ctx.telemetry().sample
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// 注册帧回调
    pub fn add_hook(&self, callback: Arc<dyn FrameCallback>) {
        self.ctx.hooks.write().add_callback(callback);
    }

    /// 订阅设备输出行（有界通道，满时丢帧）
    pub fn subscribe_frames(&self, capacity: usize) -> Receiver<Frame> {
        let (tap, rx) = FrameTap::new(capacity);
        self.add_hook(Arc::new(tap));
        rx
    }

    /// 关闭连接并等待后台线程退出（幂等）
    pub fn shutdown(&self) {
        if self.ctx.record_disconnect("closed by host") {
            info!("Driver shutting down");
        }
        self.is_running.store(false, Ordering::Release);
        self.throttle.close();

        let timeout = self.config.join_timeout();
        for (name, slot) in [("RX", &self.rx_thread), ("Poll", &self.poll_thread)] {
            let Some(handle) = slot.lock().take() else {
                continue;
            };
            if handle.thread().id() == std::thread::current().id() {
                continue;
            }
            if let Err(e) = handle.join_timeout(timeout) {
                warn!("{} thread did not exit cleanly: {:?}", name, e);
            }
        }
    }

    fn ensure_connected(&self) -> Result<(), DriverError> {
        if self.is_connected() {
            return Ok(());
        }
        Err(DriverError::ConnectionLost(
            self.disconnect_reason()
                .unwrap_or_else(|| "connection closed".to_string()),
        ))
    }

    fn on_write_error(&self, err: DriverError) -> DriverError {
        if !err.is_connection_fatal() {
            return err;
        }
        if let DriverError::Transport(TransportError::Closed) = &err
            && !self.is_connected()
        {
            return DriverError::ConnectionLost(
                self.disconnect_reason()
                    .unwrap_or_else(|| "connection closed".to_string()),
            );
        }
        error!("Write failed, tearing down connection: {}", err);
        tear_down(&self.ctx, &self.throttle, &self.is_running, format!("write failed: {err}"));
        err
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("connected", &self.is_connected())
            .field("config", &self.config)
            .finish()
    }
}
