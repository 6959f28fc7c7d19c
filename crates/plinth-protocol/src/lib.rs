//! # Plinth Protocol
//!
//! 平台串口线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 下行命令（模式令牌、设定点、轮询请求、手动命令）
//! - `decode`: 流式 UTF-8 解码（跨块携带不完整的多字节序列）
//! - `framer`: 行分帧器（`\n` / `\r\n` 分隔，跨读取携带残余数据）
//! - `telemetry`: 上行行分类（位置报告 / 模式回显 / 诊断文本）
//!
//! ## 线格式
//!
//! 每条命令都是一行 UTF-8 文本，以 `\n` 结尾：
//!
//! ```text
//! init | standalone | pause | remote     模式令牌
//! <x>,<y>                               设定点（有符号整数）
//! getPos                                轮询位置请求
//! ```
//!
//! 设备回复同样按行分隔，两数报告（逗号或空白分隔）即位置遥测，
//! 其余一律视为诊断文本。

pub mod command;
pub mod decode;
pub mod framer;
pub mod telemetry;

// 重新导出常用类型
pub use command::*;
pub use decode::Utf8Decoder;
pub use framer::{Frame, Frames, LineFramer};
pub use telemetry::{Inbound, PositionReport, classify, parse_position};

use thiserror::Error;

/// 协议错误类型
///
/// 只覆盖下行命令文本的构造错误。上行行不匹配遥测语法并不是错误，
/// 而是诊断文本（见 [`telemetry::classify`]）。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Command must not contain line breaks: {0:?}")]
    EmbeddedLineBreak(String),

    #[error("Command is empty")]
    EmptyCommand,

    #[error("Unknown mode token: {0:?}")]
    UnknownModeToken(String),
}
