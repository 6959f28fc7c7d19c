//! CLI 配置文件
//!
//! TOML 格式，默认位于 `<config_dir>/plinth/config.toml`，可用 `--config` 覆盖。

use anyhow::{Context, Result};
use plinth_client::SessionConfig;
use plinth_driver::DriverConfig;
use plinth_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("plinth");
    path.push("config.toml");
    Ok(path)
}

/// 解析配置文件路径（命令行优先）
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_path(),
    }
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// 默认传输
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,

    /// 驱动参数（节流、遥测）
    pub driver: DriverConfig,

    /// 会话参数（映射、图案）
    pub session: SessionConfig,
}

impl CliConfig {
    /// 加载配置（文件不存在时返回默认值）
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        fs::write(path, self.to_toml()?).context("写入配置文件失败")?;
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("# Plinth CLI Configuration\n\n{body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_driver::TelemetryMode;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CliConfig {
            transport: Some(TransportConfig::serial("/dev/ttyUSB0")),
            ..CliConfig::default()
        };
        config.driver.telemetry = TelemetryMode::Poll {
            interval_ms: 50,
            pipelined: true,
        };
        config.session.mapper.invert_y = true;
        config.save(&path).unwrap();

        assert_eq!(CliConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = CliConfig::from_toml(
            r#"
[transport]
kind = "tcp"
addr = "10.0.0.2:4001"

[driver]
min_send_interval_ms = 50
"#,
        )
        .unwrap();
        assert_eq!(config.transport, Some(TransportConfig::tcp("10.0.0.2:4001")));
        assert_eq!(config.driver.min_send_interval_ms, 50);
        assert_eq!(config.driver.read_timeout_ms, 20);
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_invalid_file_is_reported() {
        assert!(CliConfig::from_toml("driver = 3").is_err());
    }
}
