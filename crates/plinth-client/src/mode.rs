//! 工作模式定义
//!
//! 会话同一时刻只处于一个模式。模式只由显式命令切换，从不根据设备输出推断。

use plinth_protocol::ModeToken;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 会话工作模式
///
/// - **Init / Standalone / Pause**：设备自主或停止，主机不驱动；进入时发送令牌和一次中位设定点
/// - **Remote**：指针移动经映射、节流后驱动平台
/// - **PatternRecord**：记录指针轨迹，不发送任何命令
/// - **PatternPlay**：按固定节奏回放已记录的轨迹
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Mode {
    /// 初始模式（不驱动）
    #[default]
    Init = 0,
    Standalone = 1,
    Pause = 2,
    Remote = 3,
    PatternRecord = 4,
    PatternPlay = 5,
}

impl Mode {
    /// 从 u8 转换，无效值视为 Init
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Standalone,
            2 => Self::Pause,
            3 => Self::Remote,
            4 => Self::PatternRecord,
            5 => Self::PatternPlay,
            _ => Self::Init,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 直接对应的设备令牌（图案模式没有）
    pub fn token(self) -> Option<ModeToken> {
        match self {
            Mode::Init => Some(ModeToken::Init),
            Mode::Standalone => Some(ModeToken::Standalone),
            Mode::Pause => Some(ModeToken::Pause),
            Mode::Remote => Some(ModeToken::Remote),
            Mode::PatternRecord | Mode::PatternPlay => None,
        }
    }

    /// 进入该模式时是否在令牌后补发中位设定点
    pub fn requires_neutral(self) -> bool {
        matches!(self, Mode::Init | Mode::Standalone | Mode::Pause)
    }

    /// 指针移动是否驱动平台
    pub fn drives_pointer(self) -> bool {
        self == Mode::Remote
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, Mode::PatternRecord | Mode::PatternPlay)
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Init => "init",
            Mode::Standalone => "standalone",
            Mode::Pause => "pause",
            Mode::Remote => "remote",
            Mode::PatternRecord => "pattern-record",
            Mode::PatternPlay => "pattern-play",
        }
    }
}

impl From<ModeToken> for Mode {
    fn from(token: ModeToken) -> Self {
        match token {
            ModeToken::Init => Mode::Init,
            ModeToken::Standalone => Mode::Standalone,
            ModeToken::Pause => Mode::Pause,
            ModeToken::Remote => Mode::Remote,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 模式（原子版本，用于线程间共享）
///
/// 回放线程结束时通过 `compare_exchange` 恢复模式，避免覆盖期间发生的切换。
#[derive(Debug)]
pub struct AtomicMode {
    inner: AtomicU8,
}

impl AtomicMode {
    pub fn new(mode: Mode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn get(&self) -> Mode {
        Mode::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, mode: Mode) {
        self.inner.store(mode.as_u8(), Ordering::Release);
    }

    /// 仅当当前模式为 `current` 时切换到 `new`
    pub fn compare_exchange(&self, current: Mode, new: Mode) -> Result<Mode, Mode> {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(Mode::from_u8)
            .map_err(Mode::from_u8)
    }
}

impl Default for AtomicMode {
    fn default() -> Self {
        Self::new(Mode::Init)
    }
}
