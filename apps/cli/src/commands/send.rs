//! 发送单条命令

use crate::config::CliConfig;
use crate::connection::{ConnectArgs, open_driver};
use anyhow::Result;
use clap::Args;
use plinth_protocol::Command;
use std::time::{Duration, Instant};

/// 发送命令参数
#[derive(Args, Debug)]
pub struct SendCommand {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// 原样发送的命令行（如 `getPos`、`120,-40`）
    pub line: String,

    /// 发送后打印设备输出的时长（毫秒）
    #[arg(short, long, default_value_t = 300)]
    pub wait_ms: u64,
}

impl SendCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let command = Command::raw(&self.line)?;
        let transport = self.connect.resolve(config)?;
        let driver = open_driver(&transport, config.driver.clone())?;
        let frames = driver.subscribe_frames(256);

        driver.send_forced(&command)?;
        println!("➡️  {}", command);

        let deadline = Instant::now() + Duration::from_millis(self.wait_ms);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match frames.recv_timeout(remaining) {
                Ok(frame) => println!("⬅️  {}", frame.text),
                Err(_) => break,
            }
        }

        driver.shutdown();
        Ok(())
    }
}
