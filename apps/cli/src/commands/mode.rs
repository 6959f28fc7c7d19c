//! 切换设备模式

use crate::config::CliConfig;
use crate::connection::{ConnectArgs, open_driver};
use anyhow::Result;
use clap::{Args, ValueEnum};
use plinth_client::{Mode, Session};

/// 可直接进入的模式
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Init,
    Standalone,
    Pause,
    Remote,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Init => Mode::Init,
            ModeArg::Standalone => Mode::Standalone,
            ModeArg::Pause => Mode::Pause,
            ModeArg::Remote => Mode::Remote,
        }
    }
}

/// 模式命令参数
#[derive(Args, Debug)]
pub struct ModeCommand {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// 目标模式
    #[arg(value_enum)]
    pub mode: ModeArg,
}

impl ModeCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let transport = self.connect.resolve(config)?;
        let session = Session::new(config.session)?;
        session.connect(open_driver(&transport, config.driver.clone())?);

        let mode = Mode::from(self.mode);
        session.set_mode(mode)?;
        println!("✅ 模式: {}", mode);

        session.disconnect();
        Ok(())
    }
}
