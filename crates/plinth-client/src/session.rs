//! 会话（模式状态机）
//!
//! [`Session`] 持有当前模式、已记录的图案、回放任务和当前连接。所有操作
//! 接受 `&self`，可以在 CLI 输入线程和 Ctrl-C 处理器之间共享。
//!
//! 模式切换：
//!
//! | 目标 | 下行 |
//! |------|------|
//! | Init / Standalone / Pause | 令牌 + 一次 `0,0`（都可靠发送） |
//! | Remote | `remote`，之后指针移动经节流器驱动 |
//! | PatternRecord | 无 |
//! | PatternPlay | `remote`，回放，结束时一次 `0,0`，停在 Remote |
//!
//! 连接在任一路径上出现传输失败时被拆除，模式回到 Init，图案保留。
//! 回放与节流窗口共用驱动的时钟（[`Driver::clock`]）。

use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::mapping::{SetpointMapper, SurfacePoint};
use crate::mode::{AtomicMode, Mode};
use crate::pattern::PatternRecorder;
use crate::playback::{PlaybackControl, PlaybackJob, PlaybackReport, PlaybackTask};
use crate::presenter::{NullPresenter, Presenter};
use parking_lot::{Mutex, RwLock};
use plinth_driver::{Driver, DriverError, SendOutcome, TelemetrySample};
use plinth_protocol::{Command, ModeToken, Setpoint};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 控制会话
///
/// ```rust,no_run
/// use plinth_client::{Mode, Session, SessionConfig, SurfacePoint};
/// use plinth_driver::DriverBuilder;
///
/// let session = Session::new(SessionConfig::default())?;
/// session.connect(DriverBuilder::new().serial("/dev/ttyACM0").build()?);
/// session.set_mode(Mode::Remote)?;
/// session.pointer_moved(SurfacePoint::new(120.0, 80.0))?;
/// session.pointer_left()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Session {
    config: SessionConfig,
    mapper: SetpointMapper,
    mode: Arc<AtomicMode>,
    /// 进入 PatternRecord 之前的模式
    resume_mode: Mutex<Mode>,
    /// 串行化模式切换与回放启动
    transition: Mutex<()>,
    driver: RwLock<Option<Arc<Driver>>>,
    recorder: Mutex<PatternRecorder>,
    playback: Mutex<Option<PlaybackTask>>,
    presenter: Arc<dyn Presenter>,
    /// Remote 模式下最近一次写出的指针设定点
    last_pointer_setpoint: Mutex<Option<Setpoint>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, ClientError> {
        Self::with_presenter(config, Arc::new(NullPresenter))
    }

    /// 注入呈现协作者
    pub fn with_presenter(
        config: SessionConfig,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Self, ClientError> {
        let mapper = SetpointMapper::new(config.mapper)?;
        Ok(Self {
            config,
            mapper,
            mode: Arc::new(AtomicMode::default()),
            resume_mode: Mutex::new(Mode::Init),
            transition: Mutex::new(()),
            driver: RwLock::new(None),
            recorder: Mutex::new(PatternRecorder::new(config.pattern.min_distance)),
            playback: Mutex::new(None),
            presenter,
            last_pointer_setpoint: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mapper(&self) -> &SetpointMapper {
        &self.mapper
    }

    // ============================================================
    // 连接
    // ============================================================

    /// 挂接连接（替换并关闭已有连接）
    ///
    /// 新设备尚未收到任何令牌，模式回到 Init；正在录制时保持 PatternRecord。
    pub fn connect(&self, driver: Driver) {
        let _guard = self.transition.lock();
        self.stop_playback_for_teardown();
        if let Some(old) = self.driver.write().replace(Arc::new(driver)) {
            info!("Replacing existing connection");
            old.shutdown();
        }
        if self.mode.get() != Mode::PatternRecord {
            self.mode.set(Mode::Init);
        }
        *self.last_pointer_setpoint.lock() = None;
        info!("Session connected (mode {})", self.mode.get());
    }

    /// 关闭连接，模式回到 Init；图案保留
    pub fn disconnect(&self) {
        let _guard = self.transition.lock();
        self.stop_playback_for_teardown();
        if let Some(driver) = self.driver.write().take() {
            driver.shutdown();
            info!("Session disconnected");
        }
        self.mode.set(Mode::Init);
    }

    /// 当前连接（已断开的连接会先被回收）
    pub fn driver(&self) -> Option<Arc<Driver>> {
        self.reap_lost_connection();
        self.driver.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.driver().is_some()
    }

    // ============================================================
    // 模式
    // ============================================================

    pub fn mode(&self) -> Mode {
        self.reap_lost_connection();
        self.mode.get()
    }

    /// 切换到 Init / Standalone / Pause / Remote
    ///
    /// 回放中的切换先抢占回放：目标需要中位点时回放不再发送中位点。
    pub fn set_mode(&self, target: Mode) -> Result<(), ClientError> {
        if target.is_pattern() {
            return Err(ClientError::InvalidMode(target));
        }
        let _guard = self.transition.lock();
        self.reap_lost_connection();
        self.interrupt_playback(target.requires_neutral());
        if self.mode.get() == Mode::PatternRecord {
            self.recorder.lock().end_gesture();
        }
        self.enter(target)
    }

    /// 进入或离开 PatternRecord，返回切换后的模式
    ///
    /// 进入时清空图案且不发送任何命令；离开时以完整切换回到进入前的模式。
    /// 未连接时离开只在主机侧回到 Init。
    pub fn toggle_pattern_mode(&self) -> Result<Mode, ClientError> {
        let _guard = self.transition.lock();
        self.reap_lost_connection();

        if self.mode.get() == Mode::PatternRecord {
            let kept = self.recorder.lock().end_gesture();
            let resume = *self.resume_mode.lock();
            info!("Leaving pattern recording ({} points), back to {}", kept, resume);
            if self.driver.read().is_some() {
                self.enter(resume)?;
            } else {
                self.mode.set(Mode::Init);
            }
            return Ok(self.mode.get());
        }

        self.interrupt_playback(false);
        let previous = match self.mode.get() {
            Mode::PatternPlay | Mode::PatternRecord => Mode::Init,
            mode => mode,
        };
        *self.resume_mode.lock() = previous;
        self.recorder.lock().clear();
        self.presenter.pattern_updated(&[]);
        self.mode.set(Mode::PatternRecord);
        info!("Pattern recording started (was {})", previous);
        Ok(Mode::PatternRecord)
    }

    /// 执行一次完整切换（调用方持有 `transition`）
    fn enter(&self, target: Mode) -> Result<(), ClientError> {
        let Some(token) = target.token() else {
            return Err(ClientError::InvalidMode(target));
        };
        let driver = self.connected_driver()?;

        if target.requires_neutral() {
            // 先关闭指针驱动，再发令牌
            self.mode.set(target);
            self.send_forced(&driver, &Command::Mode(token))?;
            self.send_forced(&driver, &Command::neutral())?;
            *self.last_pointer_setpoint.lock() = Some(Setpoint::NEUTRAL);
            self.presenter.position_changed(self.mapper.center());
        } else {
            self.send_forced(&driver, &Command::Mode(token))?;
            *self.last_pointer_setpoint.lock() = None;
            self.mode.set(target);
        }
        info!("Mode -> {}", target);
        Ok(())
    }

    // ============================================================
    // 指针
    // ============================================================

    /// 按下：PatternRecord 中开始新路径，Remote 中等同移动
    pub fn pointer_pressed(&self, point: SurfacePoint) -> Result<(), ClientError> {
        validate(point)?;
        match self.mode() {
            Mode::PatternRecord => {
                let mut recorder = self.recorder.lock();
                recorder.begin_gesture(point);
                self.presenter.pattern_updated(recorder.points());
                Ok(())
            },
            mode if mode.drives_pointer() => self.drive_pointer(point).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// 移动：Remote 中尽力发送映射后的设定点，PatternRecord 中按距离记录
    ///
    /// 返回 Remote 模式下的发送结果；与上次写出的设定点相同时不发送，返回 `None`。
    pub fn pointer_moved(&self, point: SurfacePoint) -> Result<Option<SendOutcome>, ClientError> {
        validate(point)?;
        match self.mode() {
            mode if mode.drives_pointer() => self.drive_pointer(point),
            Mode::PatternRecord => {
                let mut recorder = self.recorder.lock();
                if recorder.extend(point) {
                    self.presenter.pattern_updated(recorder.points());
                }
                Ok(None)
            },
            _ => Ok(None),
        }
    }

    /// 松开：结束手势
    pub fn pointer_released(&self) {
        if self.mode() != Mode::PatternRecord {
            return;
        }
        let mut recorder = self.recorder.lock();
        if recorder.is_recording() {
            recorder.end_gesture();
            self.presenter.pattern_updated(recorder.points());
        }
    }

    /// 指针离开表面：Remote 中立即可靠发送中位点
    pub fn pointer_left(&self) -> Result<(), ClientError> {
        match self.mode() {
            mode if mode.drives_pointer() => {
                let driver = self.connected_driver()?;
                self.send_forced(&driver, &Command::neutral())?;
                *self.last_pointer_setpoint.lock() = Some(Setpoint::NEUTRAL);
                self.presenter.position_changed(self.mapper.center());
                Ok(())
            },
            Mode::PatternRecord => {
                self.recorder.lock().end_gesture();
                Ok(())
            },
            _ => Ok(()),
        }
    }

    fn drive_pointer(&self, point: SurfacePoint) -> Result<Option<SendOutcome>, ClientError> {
        let setpoint = self.mapper.map(point)?;
        if *self.last_pointer_setpoint.lock() == Some(setpoint) {
            return Ok(None);
        }
        let driver = self.connected_driver()?;
        let outcome = driver
            .try_send(&Command::Setpoint(setpoint))
            .map_err(|e| self.on_driver_error(e))?;
        if outcome.is_sent() {
            *self.last_pointer_setpoint.lock() = Some(setpoint);
            self.presenter
                .position_changed(self.mapper.to_surface(setpoint));
        }
        Ok(Some(outcome))
    }

    // ============================================================
    // 图案
    // ============================================================

    /// 开始回放已记录的图案
    pub fn play_pattern(&self) -> Result<(), ClientError> {
        let _guard = self.transition.lock();
        self.reap_lost_connection();

        if self.is_playing() {
            warn!("Pattern playback already in progress, ignoring request");
            return Err(ClientError::PlaybackConflict);
        }
        let points = {
            let mut recorder = self.recorder.lock();
            recorder.end_gesture();
            recorder.points().to_vec()
        };
        if points.is_empty() {
            warn!("Nothing to play: no pattern recorded");
            return Err(ClientError::EmptyPattern);
        }
        let driver = self.connected_driver()?;

        // 回收上一次已结束的回放
        let previous = self.playback.lock().take();
        if let Some(previous) = previous {
            previous.join();
        }

        self.send_forced(&driver, &Command::Mode(ModeToken::Remote))?;
        *self.last_pointer_setpoint.lock() = None;
        self.mode.set(Mode::PatternPlay);

        let job = PlaybackJob {
            points,
            mapper: self.mapper,
            interval: self.config.pattern.playback_interval(),
            driver,
            presenter: self.presenter.clone(),
            mode: self.mode.clone(),
            control: Arc::new(PlaybackControl::new()),
        };
        match PlaybackTask::spawn(job) {
            Ok(task) => {
                *self.playback.lock() = Some(task);
                Ok(())
            },
            Err(e) => {
                self.mode.set(Mode::Remote);
                Err(ClientError::Driver(DriverError::IoThread(e.to_string())))
            },
        }
    }

    /// 请求停止回放（不等待），返回是否有回放在进行
    pub fn stop_pattern(&self) -> bool {
        let playback = self.playback.lock();
        match playback.as_ref() {
            Some(task) if task.control.is_playing() => {
                task.control.cancel();
                info!("Pattern playback stop requested");
                true
            },
            _ => false,
        }
    }

    /// 等待当前回放结束并取回报告
    pub fn wait_playback(&self) -> Option<PlaybackReport> {
        let task = self.playback.lock().take()?;
        task.join()
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .lock()
            .as_ref()
            .is_some_and(|task| task.control.is_playing())
    }

    /// 已记录图案的副本
    pub fn pattern(&self) -> Vec<SurfacePoint> {
        self.recorder.lock().points().to_vec()
    }

    // ============================================================
    // 其他
    // ============================================================

    /// 手动调试命令（可靠发送，不改变模式）
    pub fn send_raw(&self, line: &str) -> Result<(), ClientError> {
        let command = Command::raw(line)?;
        let driver = self.connected_driver()?;
        self.send_forced(&driver, &command)
    }

    /// 最新遥测样本
    pub fn telemetry(&self) -> Option<TelemetrySample> {
        self.driver().and_then(|driver| driver.latest_sample())
    }

    /// 最新遥测位置（表面坐标）
    pub fn telemetry_surface(&self) -> Option<SurfacePoint> {
        self.telemetry()
            .map(|sample| self.mapper.to_surface(sample.position))
    }

    // ============================================================
    // 内部
    // ============================================================

    fn connected_driver(&self) -> Result<Arc<Driver>, ClientError> {
        self.reap_lost_connection();
        self.driver.read().clone().ok_or(ClientError::NotConnected)
    }

    fn send_forced(&self, driver: &Driver, command: &Command) -> Result<(), ClientError> {
        driver
            .send_forced(command)
            .map_err(|e| self.on_driver_error(e))
    }

    fn on_driver_error(&self, err: DriverError) -> ClientError {
        if err.is_connection_fatal() {
            self.reap_lost_connection();
        }
        ClientError::Driver(err)
    }

    /// 回收已断开的连接：关闭驱动，模式回到 Init，图案保留
    fn reap_lost_connection(&self) -> bool {
        let lost = self
            .driver
            .read()
            .as_ref()
            .is_some_and(|driver| !driver.is_connected());
        if !lost {
            return false;
        }
        let Some(driver) = self.driver.write().take_if(|driver| !driver.is_connected()) else {
            return false;
        };

        warn!(
            "Connection lost ({}), mode reset to init",
            driver
                .disconnect_reason()
                .unwrap_or_else(|| "unknown".to_string())
        );
        if let Some(task) = self.playback.lock().as_ref() {
            task.control.supersede();
        }
        self.mode.set(Mode::Init);
        *self.last_pointer_setpoint.lock() = None;
        driver.shutdown();
        true
    }

    /// 停止正在进行的回放并等待线程退出
    fn interrupt_playback(&self, superseded: bool) {
        let Some(task) = self.playback.lock().take() else {
            return;
        };
        if task.control.is_playing() {
            if superseded {
                debug!("Playback superseded by mode transition");
                task.control.supersede();
            } else {
                task.control.cancel();
            }
        }
        task.join();
    }

    fn stop_playback_for_teardown(&self) {
        self.interrupt_playback(true);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_playback_for_teardown();
        if let Some(driver) = self.driver.get_mut().take() {
            driver.shutdown();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode.get())
            .field("connected", &self.driver.read().is_some())
            .field("pattern_len", &self.recorder.lock().len())
            .finish()
    }
}

fn validate(point: SurfacePoint) -> Result<(), ClientError> {
    if point.is_finite() {
        Ok(())
    } else {
        Err(ClientError::InvalidInput(format!(
            "non-finite surface position ({}, {})",
            point.x, point.y
        )))
    }
}
