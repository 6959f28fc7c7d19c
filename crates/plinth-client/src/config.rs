//! 会话配置

use crate::mapping::MapperConfig;
use crate::pattern::PatternConfig;

/// 会话配置
///
/// ```
/// use plinth_client::SessionConfig;
///
/// let config = SessionConfig::default();
/// assert_eq!(config.mapper.radius, 40.0);
/// assert_eq!(config.pattern.playback_interval_ms, 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    pub mapper: MapperConfig,
    pub pattern: PatternConfig,
}
