//! # Plinth CLI
//!
//! Command-line interface for Plinth platform control.
//!
//! ## 双模式架构
//!
//! ### One-shot 模式（推荐用于脚本）
//!
//! ```bash
//! # 配置默认设备
//! plinth-cli config set --port /dev/ttyACM0
//!
//! # 执行操作（内部：连接 -> 发送 -> 断开）
//! plinth-cli mode pause
//! plinth-cli send getPos
//! plinth-cli monitor --poll 50
//! ```
//!
//! ### REPL 模式（推荐用于调试）
//!
//! ```bash
//! $ plinth-cli shell
//! plinth> connect /dev/ttyACM0
//! plinth> remote
//! plinth> move 120 80
//! plinth> pattern
//! plinth> press 100 100
//! plinth> move 300 120
//! plinth> release
//! plinth> pattern
//! plinth> play
//! plinth> exit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod connection;
mod modes;

use commands::{ConfigCommand, ModeCommand, MonitorCommand, SendCommand};
use config::CliConfig;
use modes::repl::run_repl;

/// Plinth CLI - 平台命令行工具
#[derive(Parser, Debug)]
#[command(name = "plinth-cli")]
#[command(about = "Command-line interface for Plinth platform control", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/plinth/config.toml）
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// 输出设备原始行和调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 原样发送一行命令
    Send {
        #[command(flatten)]
        args: SendCommand,
    },

    /// 切换设备模式
    Mode {
        #[command(flatten)]
        args: ModeCommand,
    },

    /// 监视设备输出与遥测
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 列出本机串口
    #[cfg(feature = "serial")]
    Ports,

    /// 启动交互式 Shell（REPL 模式）
    Shell,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let directive = if cli.verbose { "plinth=debug" } else { "plinth=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let config_path = config::resolve_path(cli.config_file.as_deref())?;

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config_path),

        Commands::Send { args } => args.execute(&CliConfig::load(&config_path)?),

        Commands::Mode { args } => args.execute(&CliConfig::load(&config_path)?),

        Commands::Monitor { args } => args.execute(&CliConfig::load(&config_path)?),

        #[cfg(feature = "serial")]
        Commands::Ports => commands::ports::execute(),

        Commands::Shell => run_repl(CliConfig::load(&config_path)?),
    }
}
