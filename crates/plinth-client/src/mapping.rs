//! 设定点映射
//!
//! 把呈现表面上的指针坐标映射为设备空间设定点：先把每个轴钳位到
//! `[radius, dim - radius]`（执行器指示圆不越出表面），再仿射缩放到
//! `[-half, +half]` 并取整。

use crate::error::ClientError;
use plinth_protocol::{Envelope, Setpoint};

/// 执行器指示圆默认半径（表面单位）
pub const DEFAULT_INDICATOR_RADIUS: f64 = 40.0;

/// 表面坐标
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfacePoint {
    pub x: f64,
    pub y: f64,
}

impl SurfacePoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &SurfacePoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// 表面尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceBounds {
    pub width: f64,
    pub height: f64,
}

impl SurfaceBounds {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for SurfaceBounds {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

/// 映射配置
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MapperConfig {
    pub surface: SurfaceBounds,
    /// 指示圆半径
    pub radius: f64,
    pub envelope: Envelope,
    /// 设备 Y 轴与表面 Y 轴方向相反
    pub invert_y: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            surface: SurfaceBounds::default(),
            radius: DEFAULT_INDICATOR_RADIUS,
            envelope: Envelope::default(),
            invert_y: false,
        }
    }
}

/// 设定点映射器（纯函数，构造时校验配置）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointMapper {
    config: MapperConfig,
}

impl SetpointMapper {
    /// 校验配置并创建映射器
    ///
    /// 尺寸必须有限且大于两倍半径，否则返回 [`ClientError::InvalidInput`]。
    pub fn new(config: MapperConfig) -> Result<Self, ClientError> {
        let MapperConfig {
            surface, radius, ..
        } = config;
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(ClientError::InvalidInput(format!(
                "indicator radius must be finite and non-negative, got {radius}"
            )));
        }
        for (axis, dim) in [("width", surface.width), ("height", surface.height)] {
            if !dim.is_finite() || dim <= 2.0 * radius {
                return Err(ClientError::InvalidInput(format!(
                    "surface {axis} {dim} leaves no room for an indicator of radius {radius}"
                )));
            }
        }
        if config.envelope.half_range <= 0 {
            return Err(ClientError::InvalidInput(format!(
                "envelope half range must be positive, got {}",
                config.envelope.half_range
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// 表面坐标 → 设定点
    ///
    /// ```
    /// use plinth_client::{MapperConfig, SetpointMapper, SurfacePoint};
    /// use plinth_protocol::Setpoint;
    ///
    /// let mapper = SetpointMapper::new(MapperConfig::default())?;
    /// assert_eq!(mapper.map(SurfacePoint::new(0.0, 0.0))?, Setpoint::new(-500, -500));
    /// assert_eq!(mapper.map(SurfacePoint::new(400.0, 300.0))?, Setpoint::NEUTRAL);
    /// # Ok::<(), plinth_client::ClientError>(())
    /// ```
    pub fn map(&self, point: SurfacePoint) -> Result<Setpoint, ClientError> {
        if !point.is_finite() {
            return Err(ClientError::InvalidInput(format!(
                "non-finite surface position ({}, {})",
                point.x, point.y
            )));
        }
        let x = self.scale_axis(point.x, self.config.surface.width);
        let y = self.scale_axis(point.y, self.config.surface.height);
        let y = if self.config.invert_y { -y } else { y };
        Ok(self.config.envelope.clamp_setpoint(Setpoint::new(x, y)))
    }

    /// 设定点 → 表面坐标（用于在表面上绘制遥测位置）
    pub fn to_surface(&self, setpoint: Setpoint) -> SurfacePoint {
        let setpoint = self.config.envelope.clamp_setpoint(setpoint);
        let y = if self.config.invert_y {
            -setpoint.y
        } else {
            setpoint.y
        };
        SurfacePoint::new(
            self.unscale_axis(setpoint.x, self.config.surface.width),
            self.unscale_axis(y, self.config.surface.height),
        )
    }

    /// 映射到中位设定点的表面坐标
    pub fn center(&self) -> SurfacePoint {
        SurfacePoint::new(
            self.config.surface.width / 2.0,
            self.config.surface.height / 2.0,
        )
    }

    fn scale_axis(&self, value: f64, dim: f64) -> i32 {
        let r = self.config.radius;
        let half = f64::from(self.config.envelope.half_range);
        let t = (value.clamp(r, dim - r) - r) / (dim - 2.0 * r);
        ((2.0 * t - 1.0) * half).round() as i32
    }

    fn unscale_axis(&self, value: i32, dim: f64) -> f64 {
        let r = self.config.radius;
        let half = f64::from(self.config.envelope.half_range);
        let t = (f64::from(value) / half + 1.0) / 2.0;
        r + t * (dim - 2.0 * r)
    }
}
