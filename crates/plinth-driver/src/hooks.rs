//! 钩子系统
//!
//! 每一行设备输出（无论是否匹配遥测语法）都会原样交给已注册的回调，
//! 每一条成功写出的命令也会通知回调。
//!
//! ```rust
//! use plinth_driver::hooks::{FrameCallback, HookManager};
//! use plinth_driver::tap::FrameTap;
//! use plinth_protocol::Frame;
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (tap, rx) = FrameTap::new(16);
//! hooks.add_callback(Arc::new(tap));
//!
//! let frame = Frame { text: "ready".into(), seq: 0, timestamp_us: 0 };
//! hooks.trigger_all(&frame);
//! assert_eq!(rx.try_recv().unwrap().text, "ready");
//! ```

use plinth_protocol::Frame;
use std::sync::Arc;

/// 帧回调
///
/// 在 RX 线程中同步调用，实现必须非阻塞（推荐 `try_send` 到通道）。
pub trait FrameCallback: Send + Sync {
    /// 收到一行设备输出
    fn on_frame_received(&self, frame: &Frame);

    /// 一条命令写出成功后调用（不含结束符）
    fn on_line_sent(&self, line: &str) {
        let _ = line;
    }
}

/// 钩子管理器
///
/// 回调列表本身不做同步，由 `BridgeContext` 中的 `RwLock` 保护。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn FrameCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn FrameCallback>) {
        self.callbacks.push(callback);
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// 触发所有 RX 回调（在 rx_loop 中调用）
    pub fn trigger_all(&self, frame: &Frame) {
        for callback in self.callbacks.iter() {
            callback.on_frame_received(frame);
        }
    }

    /// 触发所有 TX 回调（写出成功后调用）
    pub fn trigger_all_sent(&self, line: &str) {
        for callback in self.callbacks.iter() {
            callback.on_line_sent(line);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
