//! 桥接链路指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 链路实时指标
///
/// ```rust
/// use plinth_driver::BridgeMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = BridgeMetrics::new();
/// metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().rx_frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    /// 成功写出的命令行数
    pub tx_lines_total: AtomicU64,

    /// 其中经由可靠路径（send_forced）写出的行数
    pub tx_forced_total: AtomicU64,

    /// 因最小发送间隔被丢弃的次数
    pub tx_dropped_interval: AtomicU64,

    /// 因已有写入在途被丢弃的次数
    pub tx_dropped_inflight: AtomicU64,

    /// RX 读到的数据块数
    pub rx_chunks_total: AtomicU64,

    /// RX 分帧得到的行数
    pub rx_frames_total: AtomicU64,

    /// RX 超时次数（无数据时的正常现象）
    pub rx_timeouts: AtomicU64,

    /// 解析成功的位置报告数
    pub telemetry_samples: AtomicU64,

    /// 诊断文本行数
    pub diagnostic_lines: AtomicU64,

    /// 实际发出的 `getPos` 请求数
    pub poll_requests: AtomicU64,

    /// 传输错误次数
    pub device_errors: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tx_lines_total: self.tx_lines_total.load(Ordering::Relaxed),
            tx_forced_total: self.tx_forced_total.load(Ordering::Relaxed),
            tx_dropped_interval: self.tx_dropped_interval.load(Ordering::Relaxed),
            tx_dropped_inflight: self.tx_dropped_inflight.load(Ordering::Relaxed),
            rx_chunks_total: self.rx_chunks_total.load(Ordering::Relaxed),
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            telemetry_samples: self.telemetry_samples.load(Ordering::Relaxed),
            diagnostic_lines: self.diagnostic_lines.load(Ordering::Relaxed),
            poll_requests: self.poll_requests.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.tx_lines_total.store(0, Ordering::Relaxed);
        self.tx_forced_total.store(0, Ordering::Relaxed);
        self.tx_dropped_interval.store(0, Ordering::Relaxed);
        self.tx_dropped_inflight.store(0, Ordering::Relaxed);
        self.rx_chunks_total.store(0, Ordering::Relaxed);
        self.rx_frames_total.store(0, Ordering::Relaxed);
        self.rx_timeouts.store(0, Ordering::Relaxed);
        self.telemetry_samples.store(0, Ordering::Relaxed);
        self.diagnostic_lines.store(0, Ordering::Relaxed);
        self.poll_requests.store(0, Ordering::Relaxed);
        self.device_errors.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tx_lines_total: u64,
    pub tx_forced_total: u64,
    pub tx_dropped_interval: u64,
    pub tx_dropped_inflight: u64,
    pub rx_chunks_total: u64,
    pub rx_frames_total: u64,
    pub rx_timeouts: u64,
    pub telemetry_samples: u64,
    pub diagnostic_lines: u64,
    pub poll_requests: u64,
    pub device_errors: u64,
}

impl MetricsSnapshot {
    /// 尝试发送中被丢弃的比例（0.0 ~ 1.0）
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.tx_dropped_interval + self.tx_dropped_inflight;
        let attempts = self.tx_lines_total + dropped;
        if attempts == 0 {
            0.0
        } else {
            dropped as f64 / attempts as f64
        }
    }
}
