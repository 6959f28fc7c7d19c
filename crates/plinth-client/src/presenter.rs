//! 呈现协作者
//!
//! 核心只通过这两个事件向外推送状态，不直接持有任何界面对象。

use crate::mapping::SurfacePoint;
use crossbeam_channel::{Receiver, Sender, unbounded};

/// 呈现回调
///
/// 回调在调用方线程或回放线程中执行，必须快速返回。
pub trait Presenter: Send + Sync {
    /// 执行器位置（表面坐标）已更新
    fn position_changed(&self, position: SurfacePoint);

    /// 已记录的图案已更新
    fn pattern_updated(&self, points: &[SurfacePoint]);
}

/// 丢弃所有事件
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn position_changed(&self, _position: SurfacePoint) {}

    fn pattern_updated(&self, _points: &[SurfacePoint]) {}
}

/// 呈现事件
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    Position(SurfacePoint),
    Pattern(Vec<SurfacePoint>),
}

/// 把事件转发到通道（CLI 与测试使用）
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: Sender<PresentationEvent>,
}

impl ChannelPresenter {
    pub fn new() -> (Self, Receiver<PresentationEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Presenter for ChannelPresenter {
    fn position_changed(&self, position: SurfacePoint) {
        let _ = self.tx.send(PresentationEvent::Position(position));
    }

    fn pattern_updated(&self, points: &[SurfacePoint]) {
        let _ = self.tx.send(PresentationEvent::Pattern(points.to_vec()));
    }
}
