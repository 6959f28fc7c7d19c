//! 图案回放
//!
//! 回放在独立线程中运行，只与节流器竞争写入。每个点：检查取消 → 映射 →
//! 尽力发送 → 通知呈现 → 经驱动时钟休眠一个回放间隔。第一个点紧跟
//! `remote` 令牌，走可靠路径等待窗口。
//!
//! 结束（完成或取消）时可靠发送一次中位设定点，模式停在 Remote（设备最后
//! 收到的令牌），再清除回放标志。被模式切换抢占时不发中位点，由切换自己
//! 发送。

use crate::mapping::{SetpointMapper, SurfacePoint};
use crate::mode::{AtomicMode, Mode};
use crate::presenter::Presenter;
use plinth_driver::{Clock, Driver, SendOutcome};
use plinth_protocol::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 回放结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// 全部点已处理
    Completed,
    /// 被 `stop_pattern` 取消
    Cancelled,
    /// 被模式切换抢占
    Superseded,
    /// 写入失败，连接已拆除
    Failed(String),
}

/// 回放报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    /// 图案总点数
    pub total: usize,
    /// 实际写出的设定点数
    pub sent: usize,
    /// 被节流窗口丢弃的点数
    pub dropped: usize,
    pub outcome: PlaybackOutcome,
}

/// 回放控制标志（会话与回放线程共享）
#[derive(Debug)]
pub struct PlaybackControl {
    cancel: AtomicBool,
    superseded: AtomicBool,
    playing: AtomicBool,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Self {
            cancel: AtomicBool::new(false),
            superseded: AtomicBool::new(false),
            playing: AtomicBool::new(true),
        }
    }

    /// 请求停止（在下一个点之前生效）
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// 请求停止且不发送中位点
    pub fn supersede(&self) {
        self.superseded.store(true, Ordering::Release);
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn finish(&self) {
        self.playing.store(false, Ordering::Release);
    }
}

impl Default for PlaybackControl {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次回放所需的全部输入
pub(crate) struct PlaybackJob {
    pub points: Vec<SurfacePoint>,
    pub mapper: SetpointMapper,
    pub interval: Duration,
    pub driver: Arc<Driver>,
    pub presenter: Arc<dyn Presenter>,
    pub mode: Arc<AtomicMode>,
    pub control: Arc<PlaybackControl>,
}

/// 正在运行（或刚结束）的回放
pub(crate) struct PlaybackTask {
    pub control: Arc<PlaybackControl>,
    pub handle: JoinHandle<PlaybackReport>,
}

impl PlaybackTask {
    pub fn spawn(job: PlaybackJob) -> std::io::Result<Self> {
        let control = job.control.clone();
        let handle = std::thread::Builder::new()
            .name("plinth-playback".into())
            .spawn(move || run(job))?;
        Ok(Self { control, handle })
    }

    /// 等待回放线程退出
    pub fn join(self) -> Option<PlaybackReport> {
        match self.handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("Playback thread panicked");
                None
            },
        }
    }
}

pub(crate) fn run(job: PlaybackJob) -> PlaybackReport {
    let PlaybackJob {
        points,
        mapper,
        interval,
        driver,
        presenter,
        mode,
        control,
    } = job;
    let clock: Arc<dyn Clock> = driver.clock();

    info!("Pattern playback started: {} points", points.len());
    let mut sent = 0;
    let mut dropped = 0;
    let mut failure = None;
    let mut interrupted = false;
    let mut first = true;

    for (index, point) in points.iter().enumerate() {
        if control.is_cancelled() {
            interrupted = true;
            break;
        }

        let setpoint = match mapper.map(*point) {
            Ok(setpoint) => setpoint,
            Err(e) => {
                warn!("Skipping pattern point {}: {}", index, e);
                continue;
            },
        };

        let command = Command::Setpoint(setpoint);
        // 第一个点与 `remote` 落在同一窗口内
        let result = if first {
            first = false;
            driver.send_forced(&command).map(|()| SendOutcome::Sent)
        } else {
            driver.try_send(&command)
        };
        match result {
            Ok(SendOutcome::Sent) => sent += 1,
            Ok(SendOutcome::Dropped(reason)) => {
                trace!("Pattern point {} dropped: {:?}", index, reason);
                dropped += 1;
            },
            Err(e) => {
                error!("Pattern playback aborted: {}", e);
                failure = Some(e.to_string());
                break;
            },
        }
        presenter.position_changed(*point);

        clock.sleep(interval);
    }

    let outcome = match failure {
        Some(reason) => PlaybackOutcome::Failed(reason),
        None if control.is_superseded() => PlaybackOutcome::Superseded,
        None if interrupted => PlaybackOutcome::Cancelled,
        None => PlaybackOutcome::Completed,
    };

    let restore = match outcome {
        PlaybackOutcome::Failed(_) => Mode::Init,
        PlaybackOutcome::Superseded => Mode::Remote,
        PlaybackOutcome::Completed | PlaybackOutcome::Cancelled => {
            match driver.send_forced(&Command::neutral()) {
                Ok(()) => {
                    presenter.position_changed(mapper.center());
                    Mode::Remote
                },
                Err(e) => {
                    error!("Failed to center after playback: {}", e);
                    Mode::Init
                },
            }
        },
    };

    // 期间发生的模式切换优先
    if mode.compare_exchange(Mode::PatternPlay, restore).is_err() {
        debug!("Mode changed during playback, keeping it instead of {}", restore);
    }
    control.finish();

    let report = PlaybackReport {
        total: points.len(),
        sent,
        dropped,
        outcome,
    };
    info!(
        "Pattern playback finished: {:?} ({} sent, {} dropped of {})",
        report.outcome, report.sent, report.dropped, report.total
    );
    report
}
