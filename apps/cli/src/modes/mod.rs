//! 运行模式
//!
//! 一次性子命令每次独立连接（见 `commands`）；REPL 模式保持会话和连接。

pub mod repl;
