//! 会话层接口
//!
//! 本 crate 在 [`plinth_driver`] 之上提供面向操作者的 [`Session`]：
//! - 模式状态机（Init / Standalone / Pause / Remote / PatternRecord / PatternPlay）
//! - 表面坐标到设备设定点的映射
//! - 图案记录与定速回放
//! - 呈现协作者（[`Presenter`]）事件
//!
//! # 使用场景
//!
//! CLI 或任何前端只需要持有一个 `Session`，把指针事件和模式命令转给它。
//! 需要直接控制下行节奏或观察原始设备输出时，使用 [`plinth_driver::Driver`]。

pub mod config;
pub mod error;
pub mod mapping;
pub mod mode;
pub mod pattern;
pub mod playback;
pub mod presenter;
pub mod session;

// 重新导出常用类型
pub use config::SessionConfig;
pub use error::ClientError;
pub use mapping::{MapperConfig, SetpointMapper, SurfaceBounds, SurfacePoint};
pub use mode::{AtomicMode, Mode};
pub use pattern::{PatternConfig, PatternRecorder};
pub use playback::{PlaybackControl, PlaybackOutcome, PlaybackReport};
pub use presenter::{ChannelPresenter, NullPresenter, PresentationEvent, Presenter};
pub use session::Session;
