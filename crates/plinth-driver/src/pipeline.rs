//! Pipeline IO 循环模块
//!
//! 后台线程的读取、分帧、对账与轮询逻辑。
//!
//! ```text
//! Transport ─read─▶ Utf8Decoder ─▶ LineFramer ─▶ TelemetryReconciler ─▶ BridgeContext
//!                                        │
//!                                        └──▶ hooks / tracing (plinth::device)
//! ```

use crate::clock::Clock;
use crate::error::DriverError;
use crate::metrics::BridgeMetrics;
use crate::state::BridgeContext;
use crate::telemetry::{PollState, TelemetryMode, TelemetryReconciler};
use crate::throttle::{DEFAULT_MIN_SEND_INTERVAL, SendOutcome, Throttle};
use plinth_protocol::{Command, Envelope, Inbound, LineFramer, Utf8Decoder};
use plinth_transport::{RxTransport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 设备输出行的 tracing target
pub const DEVICE_TARGET: &str = "plinth::device";

const READ_BUFFER_SIZE: usize = 1024;

/// 驱动配置
///
/// ```
/// use plinth_driver::{DriverConfig, TelemetryMode};
///
/// let config = DriverConfig {
///     telemetry: TelemetryMode::Poll { interval_ms: 50, pipelined: false },
///     ..DriverConfig::default()
/// };
/// assert_eq!(config.min_send_interval_ms, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverConfig {
    /// 相邻两次写入的最小间隔（毫秒）
    pub min_send_interval_ms: u64,
    /// 传输读超时（毫秒），决定 RX 线程检查退出标志的频率
    pub read_timeout_ms: u64,
    /// 遥测钳位包络
    pub envelope: Envelope,
    /// 遥测策略
    pub telemetry: TelemetryMode,
    /// 关闭时等待后台线程的上限（毫秒）
    pub join_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            min_send_interval_ms: DEFAULT_MIN_SEND_INTERVAL.as_millis() as u64,
            read_timeout_ms: 20,
            envelope: Envelope::default(),
            telemetry: TelemetryMode::Push,
            join_timeout_ms: 2000,
        }
    }
}

impl DriverConfig {
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// 拆除连接：清除运行标志、记录原因、关闭写半部
pub(crate) fn tear_down(
    ctx: &BridgeContext,
    throttle: &Throttle,
    is_running: &AtomicBool,
    reason: impl Into<String>,
) {
    let reason = reason.into();
    if ctx.record_disconnect(reason.clone()) {
        warn!("Connection lost: {}", reason);
    }
    // Release: 看到 false 的线程必须能看到断开原因
    is_running.store(false, Ordering::Release);
    throttle.close();
}

/// 发送一次 `getPos` 并标记等待回复
fn request_position(
    throttle: &Throttle,
    poll: &PollState,
    clock: &dyn Clock,
    metrics: &BridgeMetrics,
) -> Result<SendOutcome, DriverError> {
    // 回复可能先于 try_send 返回到达
    poll.mark_requested(clock.now());
    let outcome = throttle.try_send(&Command::RequestPosition);
    match &outcome {
        Ok(SendOutcome::Sent) => {
            metrics.poll_requests.fetch_add(1, Ordering::Relaxed);
        },
        Ok(SendOutcome::Dropped(reason)) => {
            poll.clear_request();
            trace!("getPos dropped: {:?}", reason);
        },
        Err(_) => poll.clear_request(),
    }
    outcome
}

/// RX 线程主循环
///
/// 唯一的读者。读到 EOF 或致命错误时拆除连接并退出；
/// 主机关闭时通过 `is_running` 在一个读超时内退出。
pub fn rx_loop(
    mut rx: impl RxTransport,
    ctx: Arc<BridgeContext>,
    throttle: Arc<Throttle>,
    mut reconciler: TelemetryReconciler,
    clock: Arc<dyn Clock>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<BridgeMetrics>,
) {
    let mut decoder = Utf8Decoder::new();
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let poll = reconciler.poll_state();

    loop {
        // Acquire: 看到 false 时必须能看到其他线程的清理写入
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        // ============================================================
        // 1. 读取（带超时，避免阻塞）
        // ============================================================
        let n = match rx.read(&mut buf) {
            Ok(0) => {
                info!("RX thread: device closed the stream");
                if !framer.pending().is_empty() {
                    debug!(target: DEVICE_TARGET, "(incomplete) {}", framer.pending());
                }
                tear_down(&ctx, &throttle, &is_running, "end of stream");
                break;
            },
            Ok(n) => {
                metrics.rx_chunks_total.fetch_add(1, Ordering::Relaxed);
                n
            },
            Err(TransportError::Timeout) => {
                metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                metrics.device_errors.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    error!("RX thread: fatal read error: {}", e);
                    tear_down(&ctx, &throttle, &is_running, format!("read failed: {e}"));
                    break;
                }
                warn!("RX thread: read error: {}", e);
                continue;
            },
        };

        // ============================================================
        // 2. 解码 + 分帧
        // ============================================================
        let now = clock.now();
        let text = decoder.decode(&buf[..n]);
        let overflowed = framer.overflow_count();

        for frame in framer.push(&text, now.as_micros() as u64) {
            metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
            debug!(target: DEVICE_TARGET, seq = frame.seq, "{}", frame.text);

            // 3. 回调（非阻塞；锁被写者持有时跳过本次）
            if let Some(hooks) = ctx.hooks.try_read() {
                hooks.trigger_all(&frame);
            }

            // 4. 对账并发布
            let reconciled = reconciler.reconcile(&frame, now);
            match reconciled.inbound {
                Inbound::Position(_) => {
                    metrics.telemetry_samples.fetch_add(1, Ordering::Relaxed);
                    ctx.update_telemetry(|state| state.sample = reconciled.sample);
                },
                Inbound::Ack(token) => {
                    ctx.update_telemetry(|state| state.last_ack = Some(token));
                },
                Inbound::Diagnostic(line) => {
                    metrics.diagnostic_lines.fetch_add(1, Ordering::Relaxed);
                    ctx.update_telemetry(|state| state.last_diagnostic = Some(line));
                },
            }

            // 5. 流水线轮询：立即再请求
            if reconciled.reissue_request
                && let Some(poll) = poll.as_deref()
                && let Err(e) = request_position(&throttle, poll, clock.as_ref(), &metrics)
            {
                if e.is_connection_fatal() {
                    tear_down(&ctx, &throttle, &is_running, format!("write failed: {e}"));
                    break;
                }
                warn!("RX thread: pipelined getPos failed: {}", e);
            }
        }

        if framer.overflow_count() > overflowed {
            warn!("RX thread: discarded an over-long line without terminator");
        }
    }

    trace!("RX thread: loop exited");
}

/// 轮询节拍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// 两次请求之间的间隔
    pub interval: Duration,
    /// 休眠分片，关闭时在一个分片内退出
    pub slice: Duration,
}

/// 轮询线程主循环（仅 Poll 模式）
pub fn poll_loop(
    throttle: Arc<Throttle>,
    ctx: Arc<BridgeContext>,
    poll: Arc<PollState>,
    schedule: PollSchedule,
    clock: Arc<dyn Clock>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<BridgeMetrics>,
) {
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Poll thread: is_running flag is false, exiting");
            break;
        }

        if let Err(e) = request_position(&throttle, &poll, clock.as_ref(), &metrics) {
            if e.is_connection_fatal() {
                error!("Poll thread: getPos failed: {}", e);
                tear_down(&ctx, &throttle, &is_running, format!("write failed: {e}"));
                break;
            }
            warn!("Poll thread: getPos failed: {}", e);
        }

        let mut remaining = schedule.interval;
        while !remaining.is_zero() && is_running.load(Ordering::Acquire) {
            let step = remaining.min(schedule.slice);
            clock.sleep(step);
            remaining -= step;
        }
    }

    trace!("Poll thread: loop exited");
}

/// 由遥测策略得出轮询节拍（Push 返回 `None`），分片取读超时
pub(crate) fn poll_schedule(config: &DriverConfig) -> Option<PollSchedule> {
    match config.telemetry {
        TelemetryMode::Push => None,
        TelemetryMode::Poll { interval_ms, .. } => Some(PollSchedule {
            interval: Duration::from_millis(interval_ms.max(1)),
            slice: config.read_timeout(),
        }),
    }
}
