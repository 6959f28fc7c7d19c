//! 时间源
//!
//! 节流窗口、轮询和图案回放都通过 [`Clock`] 读时间和休眠，
//! 测试注入 [`ManualClock`] 即可在不真正等待的情况下推进时间。

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 单调时间源
pub trait Clock: Send + Sync + Debug {
    /// 自时钟原点以来的时间
    fn now(&self) -> Duration;

    /// 休眠指定时长
    fn sleep(&self, duration: Duration);

    /// 以微秒表示的当前时间（用于帧时间戳）
    fn now_us(&self) -> u64 {
        self.now().as_micros() as u64
    }
}

/// 生产用时钟：以创建时刻为原点的 `Instant`，休眠使用 `spin_sleep`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            spin_sleep::sleep(duration);
        }
    }
}

/// 手动推进的时钟
///
/// `sleep` 不会阻塞，而是把时间向前推进相应时长。
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 向前推进
    pub fn advance(&self, duration: Duration) {
        self.now_us
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// 设置绝对时间（不允许倒退）
    pub fn set(&self, now: Duration) {
        self.now_us.fetch_max(now.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
