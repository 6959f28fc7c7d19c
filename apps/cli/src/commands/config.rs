//! 配置管理命令
//!
//! 读写 CLI 配置文件（默认设备、节流、遥测、映射参数）

use crate::config::CliConfig;
use anyhow::Result;
use clap::Subcommand;
use plinth_client::SetpointMapper;
use plinth_driver::TelemetryMode;
use plinth_transport::{DEFAULT_BAUD_RATE, TransportConfig};
use std::path::Path;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 默认串口设备
        #[arg(short, long, conflicts_with = "tcp")]
        port: Option<String>,

        /// 波特率
        #[arg(short, long)]
        baud: Option<u32>,

        /// 默认串口转 TCP 桥地址
        #[arg(long)]
        tcp: Option<String>,

        /// 最小发送间隔（毫秒）
        #[arg(long)]
        min_interval_ms: Option<u64>,

        /// 轮询遥测间隔（毫秒）
        #[arg(long, conflicts_with = "push")]
        poll_ms: Option<u64>,

        /// 轮询时每收到回复立即再请求
        #[arg(long, requires = "poll_ms")]
        pipelined: bool,

        /// 使用设备主动上报的遥测
        #[arg(long)]
        push: bool,

        /// 反转 Y 轴
        #[arg(long)]
        invert_y: Option<bool>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（transport / driver / session / all）
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                port,
                baud,
                tcp,
                min_interval_ms,
                poll_ms,
                pipelined,
                push,
                invert_y,
            } => {
                let mut config = CliConfig::load(path)?;

                if let Some(addr) = tcp {
                    println!("✅ 设置默认设备: tcp:{}", addr);
                    config.transport = Some(TransportConfig::tcp(addr));
                } else if let Some(port) = port {
                    let transport = TransportConfig::Serial {
                        path: port,
                        baud_rate: baud.unwrap_or(DEFAULT_BAUD_RATE),
                    };
                    println!("✅ 设置默认设备: {}", transport.describe());
                    config.transport = Some(transport);
                } else if let Some(baud_rate) = baud {
                    match config.transport.as_mut() {
                        Some(TransportConfig::Serial { baud_rate: b, .. }) => *b = baud_rate,
                        _ => anyhow::bail!("--baud 需要串口设备，请同时指定 --port"),
                    }
                    println!("✅ 设置波特率: {}", baud_rate);
                }

                if let Some(ms) = min_interval_ms {
                    config.driver.min_send_interval_ms = ms;
                    println!("✅ 设置最小发送间隔: {} ms", ms);
                }

                if let Some(interval_ms) = poll_ms {
                    config.driver.telemetry = TelemetryMode::Poll {
                        interval_ms,
                        pipelined,
                    };
                    println!("✅ 设置遥测: 轮询 {} ms (pipelined: {})", interval_ms, pipelined);
                } else if push {
                    config.driver.telemetry = TelemetryMode::Push;
                    println!("✅ 设置遥测: 设备上报");
                }

                if let Some(invert) = invert_y {
                    config.session.mapper.invert_y = invert;
                    println!("✅ 设置 Y 轴反转: {}", invert);
                }

                config.save(path)?;
                Ok(())
            },

            ConfigCommand::Get { key } => {
                let config = CliConfig::load(path)?;
                match key.as_str() {
                    "transport" => match &config.transport {
                        Some(transport) => println!("{}", transport.describe()),
                        None => println!("(未设置)"),
                    },
                    "driver" => println!("{:#?}", config.driver),
                    "session" => println!("{:#?}", config.session),
                    "all" => print!("{}", config.to_toml()?),
                    other => anyhow::bail!("未知配置项: {}", other),
                }
                Ok(())
            },

            ConfigCommand::Check => {
                println!("配置文件: {}", path.display());
                let config = CliConfig::load(path)?;
                SetpointMapper::new(config.session.mapper)?;
                match &config.transport {
                    Some(transport) => println!("  设备: {}", transport.describe()),
                    None => println!("  设备: (未设置)"),
                }
                println!("  最小发送间隔: {:?}", config.driver.min_send_interval());
                println!("  遥测: {:?}", config.driver.telemetry);
                println!("  回放间隔: {:?}", config.session.pattern.playback_interval());
                println!("✅ 配置有效");
                Ok(())
            },
        }
    }
}
