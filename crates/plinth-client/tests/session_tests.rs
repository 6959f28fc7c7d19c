//! Session 集成测试（MockTransport + 驱动与回放共用的可控时钟）

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use plinth_client::{
    ChannelPresenter, ClientError, Mode, PlaybackOutcome, PresentationEvent, Session,
    SessionConfig, SurfacePoint,
};
use plinth_driver::{
    Clock, DEFAULT_MIN_SEND_INTERVAL, DropReason, Driver, DriverConfig, ManualClock, SendOutcome,
};
use plinth_transport::{MockDevice, MockTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 回放间隔
const PLAYBACK_INTERVAL: Duration = Duration::from_millis(100);

/// 手动时钟：达到回放间隔的 `sleep` 通知测试并等待放行，`open` 后不再阻塞；
/// 更短的休眠（节流窗口）只推进时间
#[derive(Debug)]
struct GatedClock {
    inner: ManualClock,
    sleeping: Sender<Duration>,
    permits: Receiver<()>,
    open: AtomicBool,
}

struct Gate {
    clock: Arc<GatedClock>,
    sleeping: Receiver<Duration>,
    permits: Sender<()>,
}

impl Gate {
    fn new() -> Self {
        let (sleeping_tx, sleeping_rx) = unbounded();
        let (permit_tx, permit_rx) = bounded(16);
        Self {
            clock: Arc::new(GatedClock {
                inner: ManualClock::new(),
                sleeping: sleeping_tx,
                permits: permit_rx,
                open: AtomicBool::new(false),
            }),
            sleeping: sleeping_rx,
            permits: permit_tx,
        }
    }

    fn opened() -> Self {
        let gate = Self::new();
        gate.clock.open.store(true, Ordering::Release);
        gate
    }

    fn wait_sleeping(&self) -> Duration {
        self.sleeping
            .recv_timeout(Duration::from_secs(2))
            .expect("playback never slept")
    }

    fn release(&self) {
        self.permits.send(()).unwrap();
    }

    fn advance(&self, duration: Duration) {
        self.clock.inner.advance(duration);
    }
}

impl Clock for GatedClock {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) {
        self.inner.advance(duration);
        if duration < PLAYBACK_INTERVAL || self.open.load(Ordering::Acquire) {
            return;
        }
        let _ = self.sleeping.send(duration);
        let _ = self.permits.recv_timeout(Duration::from_secs(5));
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn connected(gate: &Gate) -> (Session, MockDevice) {
    let (transport, device) = MockTransport::pair();
    let driver =
        Driver::with_clock(transport, DriverConfig::default(), gate.clock.clone()).unwrap();
    let session = Session::new(SessionConfig::default()).unwrap();
    session.connect(driver);
    (session, device)
}

/// 记录一条手势（停留在 PatternRecord）
fn record(session: &Session, points: &[(f64, f64)]) {
    assert_eq!(session.toggle_pattern_mode().unwrap(), Mode::PatternRecord);
    let (x, y) = points[0];
    session.pointer_pressed(SurfacePoint::new(x, y)).unwrap();
    for &(x, y) in &points[1..] {
        session.pointer_moved(SurfacePoint::new(x, y)).unwrap();
    }
    session.pointer_released();
}

const CORNERS: [(f64, f64); 3] = [(40.0, 40.0), (760.0, 560.0), (400.0, 40.0)];

/// 记录三个角点后回到 Remote，并清空已写出的行
fn remote_with_pattern(session: &Session, device: &MockDevice) {
    session.set_mode(Mode::Remote).unwrap();
    record(session, &CORNERS);
    assert_eq!(session.toggle_pattern_mode().unwrap(), Mode::Remote);
    device.take_written_lines();
}

#[test]
fn test_non_driving_modes_send_one_neutral_after_token() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);

    session.set_mode(Mode::Init).unwrap();
    session.set_mode(Mode::Standalone).unwrap();
    session.set_mode(Mode::Pause).unwrap();

    assert_eq!(
        device.written_lines(),
        vec!["init", "0,0", "standalone", "0,0", "pause", "0,0"]
    );
    assert_eq!(session.mode(), Mode::Pause);
}

#[test]
fn test_pattern_modes_cannot_be_set_directly() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);
    assert!(matches!(
        session.set_mode(Mode::PatternPlay),
        Err(ClientError::InvalidMode(Mode::PatternPlay))
    ));
    assert!(device.written_lines().is_empty());
}

#[test]
fn test_remote_pointer_drives_platform() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);

    // Init 中指针不驱动
    assert_eq!(session.pointer_moved(SurfacePoint::new(0.0, 0.0)).unwrap(), None);

    session.set_mode(Mode::Remote).unwrap();
    // 仍在 `remote` 打开的窗口内
    assert_eq!(
        session.pointer_moved(SurfacePoint::new(0.0, 0.0)).unwrap(),
        Some(SendOutcome::Dropped(DropReason::Interval))
    );
    gate.advance(DEFAULT_MIN_SEND_INTERVAL);
    assert_eq!(
        session.pointer_moved(SurfacePoint::new(0.0, 0.0)).unwrap(),
        Some(SendOutcome::Sent)
    );
    // 与上次写出的设定点相同
    assert_eq!(session.pointer_moved(SurfacePoint::new(10.0, 5.0)).unwrap(), None);
    assert!(matches!(
        session.pointer_moved(SurfacePoint::new(f64::NAN, 0.0)),
        Err(ClientError::InvalidInput(_))
    ));
    session.pointer_left().unwrap();

    assert_eq!(device.written_lines(), vec!["remote", "-500,-500", "0,0"]);
}

#[test]
fn test_play_empty_pattern_sends_nothing() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);
    session.set_mode(Mode::Remote).unwrap();
    device.take_written_lines();

    assert!(matches!(session.play_pattern(), Err(ClientError::EmptyPattern)));
    assert!(device.written_lines().is_empty());
    assert!(!session.is_playing());
    assert_eq!(session.mode(), Mode::Remote);
}

#[test]
fn test_playback_completes_and_stays_remote() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);
    remote_with_pattern(&session, &device);

    session.play_pattern().unwrap();
    let report = session.wait_playback().unwrap();

    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!((report.total, report.sent, report.dropped), (3, 3, 0));
    assert_eq!(
        device.written_lines(),
        vec!["remote", "-500,-500", "500,500", "0,-500", "0,0"]
    );
    assert_eq!(session.mode(), Mode::Remote);
    assert!(!session.is_playing());
}

#[test]
fn test_cancel_mid_playback_sends_one_neutral() {
    let gate = Gate::new();
    let (session, device) = connected(&gate);
    remote_with_pattern(&session, &device);
    let recorded = session.pattern();

    session.play_pattern().unwrap();
    assert_eq!(session.mode(), Mode::PatternPlay);
    assert_eq!(gate.wait_sleeping(), PLAYBACK_INTERVAL);

    assert!(session.stop_pattern());
    gate.release();
    let report = session.wait_playback().unwrap();

    assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(report.sent, 1);
    let lines = device.written_lines();
    assert_eq!(lines, vec!["remote", "-500,-500", "0,0"]);
    assert_eq!(lines.iter().filter(|l| l.as_str() == "0,0").count(), 1);
    assert_eq!(session.pattern(), recorded);
    assert_eq!(session.mode(), Mode::Remote);
}

#[test]
fn test_mode_change_supersedes_playback() {
    let gate = Gate::new();
    let (session, device) = connected(&gate);
    remote_with_pattern(&session, &device);

    session.play_pattern().unwrap();
    gate.wait_sleeping();

    std::thread::scope(|s| {
        let handle = s.spawn(|| session.set_mode(Mode::Pause));
        std::thread::sleep(Duration::from_millis(50));
        gate.release();
        handle.join().unwrap().unwrap();
    });

    // 回放不发中位点，由切换发送
    assert_eq!(
        device.written_lines(),
        vec!["remote", "-500,-500", "pause", "0,0"]
    );
    assert_eq!(session.mode(), Mode::Pause);
    assert!(!session.is_playing());
}

#[test]
fn test_second_play_request_is_rejected() {
    let gate = Gate::new();
    let (session, device) = connected(&gate);
    remote_with_pattern(&session, &device);

    session.play_pattern().unwrap();
    gate.wait_sleeping();
    assert!(matches!(session.play_pattern(), Err(ClientError::PlaybackConflict)));

    session.stop_pattern();
    gate.release();
    let report = session.wait_playback().unwrap();
    assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
    assert_eq!(
        device
            .written_lines()
            .iter()
            .filter(|l| l.as_str() == "remote")
            .count(),
        1
    );
}

#[test]
fn test_end_of_stream_resets_mode_and_keeps_pattern() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);
    remote_with_pattern(&session, &device);
    assert_eq!(session.pattern().len(), 3);

    device.disconnect();

    assert!(wait_until(Duration::from_secs(2), || session.mode() == Mode::Init));
    assert!(!session.is_connected());
    assert_eq!(session.pattern().len(), 3);
    assert!(matches!(session.play_pattern(), Err(ClientError::NotConnected)));
}

#[test]
fn test_write_failure_resets_mode() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);
    device.set_fail_writes(true);

    assert!(matches!(
        session.set_mode(Mode::Remote),
        Err(ClientError::Driver(_))
    ));
    assert_eq!(session.mode(), Mode::Init);
    assert!(!session.is_connected());
}

#[test]
fn test_recording_offline_and_leaving_without_connection() {
    let session = Session::new(SessionConfig::default()).unwrap();
    assert!(matches!(
        session.set_mode(Mode::Remote),
        Err(ClientError::NotConnected)
    ));

    record(&session, &[(100.0, 100.0), (101.0, 101.0), (150.0, 100.0)]);
    assert_eq!(session.pattern().len(), 2);
    assert_eq!(session.toggle_pattern_mode().unwrap(), Mode::Init);
    assert_eq!(session.pattern().len(), 2);
}

#[test]
fn test_raw_command_validation() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);

    assert!(matches!(
        session.send_raw("init\nremote"),
        Err(ClientError::Protocol(_))
    ));
    session.send_raw("  getPos ").unwrap();
    assert_eq!(device.written_lines(), vec!["getPos"]);
    assert_eq!(session.mode(), Mode::Init);
}

#[test]
fn test_presenter_sees_pattern_and_positions() {
    let (presenter, events) = ChannelPresenter::new();
    let session = Session::with_presenter(SessionConfig::default(), Arc::new(presenter)).unwrap();

    record(&session, &[(100.0, 100.0), (200.0, 100.0)]);
    let patterns: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            PresentationEvent::Pattern(points) => Some(points.len()),
            PresentationEvent::Position(_) => None,
        })
        .collect();
    // 清空、按下、拖动、松开
    assert_eq!(patterns, vec![0, 1, 2, 2]);
}

#[test]
fn test_telemetry_is_mapped_to_surface() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);
    assert_eq!(session.telemetry_surface(), None);

    device.push_line("-500 -500");
    assert!(wait_until(Duration::from_secs(2), || session.telemetry().is_some()));
    let point = session.telemetry_surface().unwrap();
    assert!((point.x - 40.0).abs() < 1e-9);
    assert!((point.y - 40.0).abs() < 1e-9);
}

#[test]
fn test_playback_from_pause_leaves_platform_in_remote() {
    let gate = Gate::opened();
    let (session, device) = connected(&gate);
    session.set_mode(Mode::Pause).unwrap();
    record(&session, &CORNERS);
    assert_eq!(session.toggle_pattern_mode().unwrap(), Mode::Pause);
    device.take_written_lines();

    session.play_pattern().unwrap();
    let report = session.wait_playback().unwrap();

    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!(
        device.written_lines(),
        vec!["remote", "-500,-500", "500,500", "0,-500", "0,0"]
    );
    // 设备最后收到的令牌是 `remote`
    assert_eq!(session.mode(), Mode::Remote);
}

#[test]
fn test_playback_with_real_clock_sends_every_point() {
    let (transport, device) = MockTransport::pair();
    let driver = Driver::new(transport, DriverConfig::default()).unwrap();
    let session = Session::new(SessionConfig::default()).unwrap();
    session.connect(driver);
    remote_with_pattern(&session, &device);

    session.play_pattern().unwrap();
    let report = session.wait_playback().unwrap();

    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!((report.total, report.sent, report.dropped), (3, 3, 0));
    assert_eq!(
        device.written_lines(),
        vec!["remote", "-500,-500", "500,500", "0,-500", "0,0"]
    );
}

#[test]
fn test_new_connection_starts_in_init() {
    let gate = Gate::opened();
    let (session, _device) = connected(&gate);
    session.set_mode(Mode::Remote).unwrap();

    let (transport, device) = MockTransport::pair();
    let driver =
        Driver::with_clock(transport, DriverConfig::default(), gate.clock.clone()).unwrap();
    session.connect(driver);

    assert_eq!(session.mode(), Mode::Init);
    assert!(device.written_lines().is_empty());
    assert_eq!(session.pointer_moved(SurfacePoint::new(0.0, 0.0)).unwrap(), None);
}
