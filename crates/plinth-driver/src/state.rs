//! 共享状态
//!
//! RX 线程是遥测状态的唯一写者，通过 `ArcSwap` 整体发布；
//! 读者（会话、CLI 监视器）无锁读取最新快照。

use crate::hooks::HookManager;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use plinth_protocol::{ModeToken, Setpoint};
use std::sync::Arc;
use std::time::Duration;

/// 一次位置遥测
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySample {
    /// 连接内单调递增的样本序号（从 1 开始）
    pub seq: u64,
    /// 钳位到包络内的设备坐标
    pub position: Setpoint,
    /// 该行到达时刻（驱动时钟）
    pub received_at: Duration,
    /// 轮询模式下 `getPos` 到回复的往返时间
    pub round_trip: Option<Duration>,
}

/// 遥测状态快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryState {
    /// 最新位置样本
    pub sample: Option<TelemetrySample>,
    /// 设备最近回显的模式令牌
    pub last_ack: Option<ModeToken>,
    /// 最近一行诊断文本
    pub last_diagnostic: Option<String>,
}

/// 驱动上下文
#[derive(Debug)]
pub struct BridgeContext {
    /// 遥测状态（RX 线程写，任意线程读）
    pub telemetry: ArcSwap<TelemetryState>,
    /// 帧钩子
    pub hooks: RwLock<HookManager>,
    /// 连接断开原因（首次记录后不再覆盖）
    disconnect_reason: Mutex<Option<String>>,
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeContext {
    pub fn new() -> Self {
        Self {
            telemetry: ArcSwap::from_pointee(TelemetryState::default()),
            hooks: RwLock::new(HookManager::new()),
            disconnect_reason: Mutex::new(None),
        }
    }

    /// 读取遥测快照
    pub fn telemetry(&self) -> Arc<TelemetryState> {
        self.telemetry.load_full()
    }

    /// 在当前快照基础上修改并发布（仅 RX 线程调用）
    pub(crate) fn update_telemetry(&self, update: impl FnOnce(&mut TelemetryState)) {
        let mut next = TelemetryState::clone(&self.telemetry.load());
        update(&mut next);
        self.telemetry.store(Arc::new(next));
    }

    /// 记录断开原因，返回是否为首次记录
    pub(crate) fn record_disconnect(&self, reason: impl Into<String>) -> bool {
        let mut slot = self.disconnect_reason.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason.into());
        true
    }

    pub fn disconnect_reason(&self) -> Option<String> {
        self.disconnect_reason.lock().clone()
    }
}
