//! 下行命令
//!
//! 所有写往设备的内容都由 [`Command`] 表示，[`Command::encode`] 负责加上行结束符。

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// 轮询位置请求的线格式
pub const GET_POSITION: &str = "getPos";

/// 模式令牌（设备固件识别的小写关键字）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ModeToken {
    Init,
    Standalone,
    Pause,
    Remote,
}

impl ModeToken {
    pub const ALL: [ModeToken; 4] = [
        ModeToken::Init,
        ModeToken::Standalone,
        ModeToken::Pause,
        ModeToken::Remote,
    ];

    /// 线格式字符串
    pub fn as_str(self) -> &'static str {
        match self {
            ModeToken::Init => "init",
            ModeToken::Standalone => "standalone",
            ModeToken::Pause => "pause",
            ModeToken::Remote => "remote",
        }
    }

    /// 按令牌解析（忽略大小写与首尾空白）
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL.into_iter().find(|token| token.as_str().eq_ignore_ascii_case(text))
    }
}

impl fmt::Display for ModeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeToken {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ProtocolError::UnknownModeToken(s.to_string()))
    }
}

/// 设备坐标系下的设定点
///
/// 唯一会作为控制命令写往设备的数据，线格式为 `"<x>,<y>"`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Setpoint {
    pub x: i32,
    pub y: i32,
}

impl Setpoint {
    /// 中位（平台居中）
    pub const NEUTRAL: Setpoint = Setpoint { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Setpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// 平台安全包络（设备坐标，每轴 `[-half_range, +half_range]`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    pub half_range: i32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self { half_range: 500 }
    }
}

impl Envelope {
    pub const fn new(half_range: i32) -> Self {
        Self { half_range }
    }

    /// 四舍五入到最近整数并钳位到包络内
    ///
    /// 调用方保证 `value` 是有限值。
    pub fn clamp(&self, value: f64) -> i32 {
        let half = f64::from(self.half_range.abs());
        value.round().clamp(-half, half) as i32
    }

    pub fn clamp_setpoint(&self, setpoint: Setpoint) -> Setpoint {
        let half = self.half_range.abs();
        Setpoint {
            x: setpoint.x.clamp(-half, half),
            y: setpoint.y.clamp(-half, half),
        }
    }

    pub fn contains(&self, setpoint: Setpoint) -> bool {
        self.clamp_setpoint(setpoint) == setpoint
    }
}

/// 下行命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 模式令牌
    Mode(ModeToken),
    /// 设定点
    Setpoint(Setpoint),
    /// 轮询位置（`getPos`）
    RequestPosition,
    /// 手动调试命令（已校验，不含换行）
    Raw(String),
}

impl Command {
    /// 构造手动命令
    ///
    /// 去除首尾空白；空命令和内嵌换行都会被拒绝。
    pub fn raw(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        if line.contains(['\n', '\r']) {
            return Err(ProtocolError::EmbeddedLineBreak(line.to_string()));
        }
        Ok(Command::Raw(line.to_string()))
    }

    /// 中位设定点
    pub fn neutral() -> Self {
        Command::Setpoint(Setpoint::NEUTRAL)
    }

    /// 编码为线格式（带 `\n` 结束符）
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Mode(token) => f.write_str(token.as_str()),
            Command::Setpoint(setpoint) => write!(f, "{setpoint}"),
            Command::RequestPosition => f.write_str(GET_POSITION),
            Command::Raw(line) => f.write_str(line),
        }
    }
}

impl From<ModeToken> for Command {
    fn from(token: ModeToken) -> Self {
        Command::Mode(token)
    }
}

impl From<Setpoint> for Command {
    fn from(setpoint: Setpoint) -> Self {
        Command::Setpoint(setpoint)
    }
}
