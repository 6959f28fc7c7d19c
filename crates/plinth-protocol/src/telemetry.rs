//! 上行行分类
//!
//! 设备回复只有一种结构化格式：两数位置报告。
//!
//! ```text
//! 12,-34        逗号分隔（两侧可有空白）
//! 12.5 -34      空白分隔
//! +3 , 4.25     可带符号与小数
//! ```
//!
//! 与模式令牌相同的行（忽略大小写）视为模式回显，其余都是诊断文本。
//! 不匹配语法从来不是错误。

use crate::command::{Envelope, ModeToken, Setpoint};
use regex::Regex;
use std::sync::LazyLock;

static POSITION_REPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?\d+(?:\.\d+)?)(?:\s*,\s*|\s+)([+-]?\d+(?:\.\d+)?)$")
        .expect("position report grammar is a valid regex")
});

/// 设备上报的位置（原始实数值）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub x: f64,
    pub y: f64,
}

impl PositionReport {
    /// 四舍五入并钳位到包络内
    pub fn to_setpoint(&self, envelope: Envelope) -> Setpoint {
        Setpoint {
            x: envelope.clamp(self.x),
            y: envelope.clamp(self.y),
        }
    }
}

/// 一行上行文本的分类结果
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// 位置报告
    Position(PositionReport),
    /// 设备回显的模式令牌
    Ack(ModeToken),
    /// 其他文本
    Diagnostic(String),
}

/// 按位置报告语法解析一行（调用方已去除首尾空白也可以，这里会再裁一次）
pub fn parse_position(text: &str) -> Option<PositionReport> {
    let caps = POSITION_REPORT.captures(text.trim())?;
    let x = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let y = caps.get(2)?.as_str().parse::<f64>().ok()?;
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some(PositionReport { x, y })
}

/// 分类一行上行文本
pub fn classify(text: &str) -> Inbound {
    if let Some(report) = parse_position(text) {
        return Inbound::Position(report);
    }
    if let Some(token) = ModeToken::parse(text) {
        return Inbound::Ack(token);
    }
    Inbound::Diagnostic(text.trim().to_string())
}
