//! 通道式帧监听
//!
//! [`FrameTap`] 把设备输出复制到有界通道，供 CLI 监视器、日志记录等消费者在
//! 其他线程处理。队列满时丢帧，不阻塞 RX 线程。

use crate::hooks::FrameCallback;
use crossbeam_channel::{Receiver, Sender, bounded};
use plinth_protocol::Frame;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 默认队列容量
pub const DEFAULT_TAP_CAPACITY: usize = 1024;

/// 通道式帧监听钩子
pub struct FrameTap {
    tx: Sender<Frame>,
    dropped: Arc<AtomicU64>,
    forwarded: Arc<AtomicU64>,
}

impl FrameTap {
    /// 创建监听钩子及其接收端
    pub fn new(capacity: usize) -> (Self, Receiver<Frame>) {
        let (tx, rx) = bounded(capacity.max(1));
        let tap = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            forwarded: Arc::new(AtomicU64::new(0)),
        };
        (tap, rx)
    }

    /// 丢帧计数器
    pub fn dropped_frames(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }

    /// 已转发计数器
    pub fn forwarded_frames(&self) -> &Arc<AtomicU64> {
        &self.forwarded
    }
}

impl FrameCallback for FrameTap {
    fn on_frame_received(&self, frame: &Frame) {
        if self.tx.try_send(frame.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> Frame {
        Frame {
            text: format!("line {seq}"),
            seq,
            timestamp_us: seq * 10,
        }
    }

    #[test]
    fn test_tap_forwards_until_full() {
        let (tap, rx) = FrameTap::new(2);
        let dropped = tap.dropped_frames().clone();
        let forwarded = tap.forwarded_frames().clone();

        for seq in 0..5 {
            tap.on_frame_received(&frame(seq));
        }

        assert_eq!(forwarded.load(Ordering::Relaxed), 2);
        assert_eq!(dropped.load(Ordering::Relaxed), 3);
        assert_eq!(rx.try_recv().unwrap().seq, 0);
        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert!(rx.try_recv().is_err());
    }
}
