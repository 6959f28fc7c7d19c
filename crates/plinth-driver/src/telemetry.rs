//! 遥测对账
//!
//! 把分帧后的每一行归类（位置 / 模式回显 / 诊断），位置报告钳位到包络后
//! 生成 [`TelemetrySample`]。
//!
//! 两种策略，每个连接只用一种：
//!
//! - **Push**：设备主动上报位置，这里只解析
//! - **Poll**：轮询线程按固定间隔经节流器发送 `getPos`，下一条位置报告视为回复，
//!   记录往返时间；`pipelined` 时 RX 线程每解析出一条回复立即再发一次请求

use crate::state::TelemetrySample;
use plinth_protocol::{Envelope, Frame, Inbound, classify};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// 遥测策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "lowercase"))]
pub enum TelemetryMode {
    /// 设备主动上报
    #[default]
    Push,
    /// 主机轮询
    Poll {
        /// 轮询间隔（毫秒）
        interval_ms: u64,
        /// 每收到一条回复立即再请求
        pipelined: bool,
    },
}

impl TelemetryMode {
    pub fn poll(interval: Duration, pipelined: bool) -> Self {
        TelemetryMode::Poll {
            interval_ms: interval.as_millis() as u64,
            pipelined,
        }
    }

    pub fn is_poll(&self) -> bool {
        matches!(self, TelemetryMode::Poll { .. })
    }
}

/// 轮询请求的在途状态（轮询线程与 RX 线程共享）
#[derive(Debug)]
pub struct PollState {
    pipelined: bool,
    awaiting: AtomicBool,
    requested_at_us: AtomicU64,
}

impl PollState {
    fn new(pipelined: bool) -> Self {
        Self {
            pipelined,
            awaiting: AtomicBool::new(false),
            requested_at_us: AtomicU64::new(0),
        }
    }

    pub fn is_pipelined(&self) -> bool {
        self.pipelined
    }

    /// `getPos` 已写出
    pub fn mark_requested(&self, now: Duration) {
        self.requested_at_us
            .store(now.as_micros() as u64, Ordering::Release);
        self.awaiting.store(true, Ordering::Release);
    }

    /// 请求未能写出
    pub fn clear_request(&self) {
        self.awaiting.store(false, Ordering::Release);
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting.load(Ordering::Acquire)
    }

    /// 收到回复：结束等待并返回往返时间
    fn take_response(&self, now: Duration) -> Option<Duration> {
        if !self.awaiting.swap(false, Ordering::AcqRel) {
            return None;
        }
        let requested = Duration::from_micros(self.requested_at_us.load(Ordering::Acquire));
        Some(now.saturating_sub(requested))
    }
}

/// 一行的对账结果
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub inbound: Inbound,
    /// 位置报告生成的新样本
    pub sample: Option<TelemetrySample>,
    /// 流水线轮询：需要立即再发一次 `getPos`
    pub reissue_request: bool,
}

/// 遥测对账器（由 RX 线程独占）
#[derive(Debug)]
pub struct TelemetryReconciler {
    envelope: Envelope,
    poll: Option<Arc<PollState>>,
    next_seq: u64,
}

impl TelemetryReconciler {
    pub fn new(envelope: Envelope, mode: TelemetryMode) -> Self {
        let poll = match mode {
            TelemetryMode::Push => None,
            TelemetryMode::Poll { pipelined, .. } => Some(Arc::new(PollState::new(pipelined))),
        };
        Self {
            envelope,
            poll,
            next_seq: 1,
        }
    }

    /// 轮询模式下与轮询线程共享的状态
    pub fn poll_state(&self) -> Option<Arc<PollState>> {
        self.poll.clone()
    }

    pub fn reconcile(&mut self, frame: &Frame, now: Duration) -> Reconciled {
        let report = match classify(&frame.text) {
            Inbound::Position(report) => report,
            other => {
                return Reconciled {
                    inbound: other,
                    sample: None,
                    reissue_request: false,
                };
            },
        };

        let round_trip = self.poll.as_ref().and_then(|poll| poll.take_response(now));
        let sample = TelemetrySample {
            seq: self.next_seq,
            position: report.to_setpoint(self.envelope),
            received_at: now,
            round_trip,
        };
        self.next_seq += 1;

        Reconciled {
            inbound: Inbound::Position(report),
            sample: Some(sample),
            reissue_request: self.poll.as_ref().is_some_and(|poll| poll.is_pipelined()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_protocol::{ModeToken, Setpoint};

    fn frame(text: &str) -> Frame {
        Frame {
            text: text.to_string(),
            seq: 0,
            timestamp_us: 0,
        }
    }

    #[test]
    fn test_push_mode_produces_clamped_samples() {
        let mut reconciler = TelemetryReconciler::new(Envelope::default(), TelemetryMode::Push);
        assert!(reconciler.poll_state().is_none());

        let r = reconciler.reconcile(&frame("12.6 -700"), Duration::from_millis(5));
        let sample = r.sample.unwrap();
        assert_eq!(sample.seq, 1);
        assert_eq!(sample.position, Setpoint::new(13, -500));
        assert_eq!(sample.received_at, Duration::from_millis(5));
        assert_eq!(sample.round_trip, None);
        assert!(!r.reissue_request);

        let r = reconciler.reconcile(&frame("1,2"), Duration::from_millis(6));
        assert_eq!(r.sample.unwrap().seq, 2);
    }

    #[test]
    fn test_non_position_lines_produce_no_sample() {
        let mut reconciler = TelemetryReconciler::new(Envelope::default(), TelemetryMode::Push);
        let r = reconciler.reconcile(&frame("Remote"), Duration::ZERO);
        assert_eq!(r.inbound, Inbound::Ack(ModeToken::Remote));
        assert!(r.sample.is_none());

        let r = reconciler.reconcile(&frame("calibrating..."), Duration::ZERO);
        assert!(matches!(r.inbound, Inbound::Diagnostic(_)));
        assert!(r.sample.is_none());
    }

    #[test]
    fn test_poll_mode_measures_round_trip() {
        let mut reconciler = TelemetryReconciler::new(
            Envelope::default(),
            TelemetryMode::poll(Duration::from_millis(50), false),
        );
        let poll = reconciler.poll_state().unwrap();

        // 未请求时的报告没有往返时间
        let r = reconciler.reconcile(&frame("0,0"), Duration::from_millis(1));
        assert_eq!(r.sample.unwrap().round_trip, None);

        poll.mark_requested(Duration::from_millis(10));
        assert!(poll.is_awaiting());
        let r = reconciler.reconcile(&frame("3,4"), Duration::from_millis(22));
        assert_eq!(r.sample.unwrap().round_trip, Some(Duration::from_millis(12)));
        assert!(!poll.is_awaiting());
        assert!(!r.reissue_request);
    }

    #[test]
    fn test_pipelined_poll_requests_reissue() {
        let mut reconciler = TelemetryReconciler::new(
            Envelope::default(),
            TelemetryMode::poll(Duration::from_millis(50), true),
        );
        let r = reconciler.reconcile(&frame("3,4"), Duration::ZERO);
        assert!(r.reissue_request);
        let r = reconciler.reconcile(&frame("ok"), Duration::ZERO);
        assert!(!r.reissue_request);
    }
}
