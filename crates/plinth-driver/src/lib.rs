//! # Plinth Driver
//!
//! IO 线程管理、下行节流与遥测对账。
//!
//! ## 线程模型
//!
//! - **RX 线程**：唯一读者，读 → UTF-8 解码 → 分帧 → 对账 → 发布
//! - **轮询线程**（仅 Poll 模式）：固定间隔经节流器发送 `getPos`
//! - 调用方线程：经 [`Throttle`] 直接写（`try_send` / `send_forced`）
//!
//! 所有写入共用一个节流窗口；所有休眠都经注入的 [`Clock`]。
//!
//! ## 模块
//!
//! - `driver`: 对外 [`Driver`] 及生命周期
//! - `builder`: 按 [`plinth_transport::TransportConfig`] 打开传输
//! - `throttle`: 节流窗口
//! - `telemetry`: 遥测对账与轮询状态
//! - `pipeline`: RX / 轮询线程主循环与 [`DriverConfig`]
//! - `hooks` / `tap`: 设备输出旁路
//! - `metrics`: 原子计数器

pub mod builder;
pub mod clock;
pub mod driver;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
pub mod state;
pub mod tap;
pub mod telemetry;
pub mod throttle;

pub use builder::DriverBuilder;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use driver::Driver;
pub use error::DriverError;
pub use hooks::{FrameCallback, HookManager};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use pipeline::{DEVICE_TARGET, DriverConfig};
pub use state::{BridgeContext, TelemetrySample, TelemetryState};
pub use tap::FrameTap;
pub use telemetry::{PollState, TelemetryMode, TelemetryReconciler};
pub use throttle::{DEFAULT_MIN_SEND_INTERVAL, DropReason, SendOutcome, Throttle};
