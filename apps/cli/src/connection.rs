//! 连接参数与打开驱动

use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use plinth_driver::{Driver, DriverBuilder, DriverConfig};
use plinth_transport::{DEFAULT_BAUD_RATE, TransportConfig};

/// 连接参数（覆盖配置文件）
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectArgs {
    /// 串口设备（如 /dev/ttyACM0、COM3）
    #[arg(short, long, conflicts_with = "tcp")]
    pub port: Option<String>,

    /// 波特率
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// 串口转 TCP 桥地址（host:port）
    #[arg(long)]
    pub tcp: Option<String>,
}

impl ConnectArgs {
    /// 命令行参数优先，其次配置文件
    pub fn resolve(&self, config: &CliConfig) -> Result<TransportConfig> {
        if let Some(addr) = &self.tcp {
            return Ok(TransportConfig::tcp(addr.clone()));
        }
        if let Some(path) = &self.port {
            return Ok(TransportConfig::Serial {
                path: path.clone(),
                baud_rate: self.baud.unwrap_or(DEFAULT_BAUD_RATE),
            });
        }
        match (config.transport.clone(), self.baud) {
            (Some(TransportConfig::Serial { path, .. }), Some(baud_rate)) => {
                Ok(TransportConfig::Serial { path, baud_rate })
            },
            (Some(transport), _) => Ok(transport),
            (None, _) => anyhow::bail!(
                "未指定设备：使用 --port / --tcp，或 'plinth-cli config set --port <PORT>'"
            ),
        }
    }
}

/// 打开驱动
pub fn open_driver(transport: &TransportConfig, config: DriverConfig) -> Result<Driver> {
    println!("🔌 连接到 {}...", transport.describe());
    let driver = DriverBuilder::new()
        .transport(transport.clone())
        .config(config)
        .build()
        .with_context(|| format!("无法打开 {}", transport.describe()))?;
    println!("✅ 已连接");
    Ok(driver)
}
