//! 图案记录
//!
//! 按下开始一条新路径（替换旧路径），拖动时按最小距离过滤追加，松开结束。
//! 图案只保存在内存中，连接断开后仍保留。

use crate::mapping::SurfacePoint;
use std::time::Duration;
use tracing::{debug, info};

/// 相邻记录点的默认最小距离（表面单位）
pub const DEFAULT_MIN_DISTANCE: f64 = 5.0;

/// 默认回放间隔（10 Hz）
pub const DEFAULT_PLAYBACK_INTERVAL: Duration = Duration::from_millis(100);

/// 图案配置
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PatternConfig {
    /// 相邻记录点的最小欧氏距离
    pub min_distance: f64,
    /// 回放时相邻两点的间隔（毫秒）
    pub playback_interval_ms: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_distance: DEFAULT_MIN_DISTANCE,
            playback_interval_ms: DEFAULT_PLAYBACK_INTERVAL.as_millis() as u64,
        }
    }
}

impl PatternConfig {
    pub fn playback_interval(&self) -> Duration {
        Duration::from_millis(self.playback_interval_ms)
    }
}

/// 图案记录器
#[derive(Debug, Clone, Default)]
pub struct PatternRecorder {
    min_distance: f64,
    points: Vec<SurfacePoint>,
    gesture_active: bool,
}

impl PatternRecorder {
    pub fn new(min_distance: f64) -> Self {
        Self {
            min_distance: min_distance.max(0.0),
            points: Vec::new(),
            gesture_active: false,
        }
    }

    /// 按下：清空旧路径并无条件记录第一个点
    pub fn begin_gesture(&mut self, point: SurfacePoint) {
        self.points.clear();
        self.points.push(point);
        self.gesture_active = true;
        debug!("Pattern gesture started at ({:.1}, {:.1})", point.x, point.y);
    }

    /// 拖动：与上一个记录点距离足够时追加，返回是否追加
    pub fn extend(&mut self, point: SurfacePoint) -> bool {
        if !self.gesture_active {
            return false;
        }
        let far_enough = self
            .points
            .last()
            .is_none_or(|last| last.distance(&point) >= self.min_distance);
        if far_enough {
            self.points.push(point);
        }
        far_enough
    }

    /// 松开：结束手势，返回保留的点数
    pub fn end_gesture(&mut self) -> usize {
        if self.gesture_active {
            self.gesture_active = false;
            info!("Pattern recorded: {} points", self.points.len());
        }
        self.points.len()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.gesture_active = false;
    }

    pub fn is_recording(&self) -> bool {
        self.gesture_active
    }

    pub fn points(&self) -> &[SurfacePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_duplicates_collapse() {
        let mut recorder = PatternRecorder::new(DEFAULT_MIN_DISTANCE);
        recorder.begin_gesture(SurfacePoint::new(100.0, 100.0));
        for _ in 0..50 {
            assert!(!recorder.extend(SurfacePoint::new(101.0, 101.0)));
        }
        assert!(recorder.extend(SurfacePoint::new(110.0, 100.0)));
        assert_eq!(recorder.end_gesture(), 2);
    }

    #[test]
    fn test_press_replaces_previous_path() {
        let mut recorder = PatternRecorder::new(DEFAULT_MIN_DISTANCE);
        recorder.begin_gesture(SurfacePoint::new(0.0, 0.0));
        recorder.extend(SurfacePoint::new(50.0, 0.0));
        recorder.end_gesture();

        recorder.begin_gesture(SurfacePoint::new(10.0, 10.0));
        assert_eq!(recorder.points(), &[SurfacePoint::new(10.0, 10.0)]);
    }

    #[test]
    fn test_moves_without_gesture_are_ignored() {
        let mut recorder = PatternRecorder::new(DEFAULT_MIN_DISTANCE);
        assert!(!recorder.extend(SurfacePoint::new(10.0, 10.0)));
        assert!(recorder.is_empty());
        assert_eq!(recorder.end_gesture(), 0);
    }

    #[test]
    fn test_playback_interval_default() {
        assert_eq!(
            PatternConfig::default().playback_interval(),
            Duration::from_millis(100)
        );
    }

    proptest! {
        #[test]
        fn prop_consecutive_points_respect_min_distance(
            moves in prop::collection::vec((0.0f64..800.0, 0.0f64..600.0), 1..200),
            threshold in 0.5f64..20.0,
        ) {
            let mut recorder = PatternRecorder::new(threshold);
            recorder.begin_gesture(SurfacePoint::new(400.0, 300.0));
            for (x, y) in moves {
                recorder.extend(SurfacePoint::new(x, y));
            }
            for pair in recorder.points().windows(2) {
                prop_assert!(pair[0].distance(&pair[1]) >= threshold);
            }
        }
    }
}
