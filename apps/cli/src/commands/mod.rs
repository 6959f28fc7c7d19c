//! 命令定义和实现

pub mod config;
pub mod mode;
pub mod monitor;
#[cfg(feature = "serial")]
pub mod ports;
pub mod send;

pub use config::ConfigCommand;
pub use mode::ModeCommand;
pub use monitor::MonitorCommand;
pub use send::SendCommand;
