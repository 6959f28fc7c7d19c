//! Driver 集成测试（MockTransport）

use parking_lot::Mutex;
use plinth_driver::{
    Clock, Driver, DriverConfig, DriverError, MonotonicClock, SendOutcome, TelemetryMode,
};
use plinth_protocol::{Command, ModeToken, Setpoint};
use plinth_transport::{MockDevice, MockTransport};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 记录每次休眠时长的真实时钟
#[derive(Debug, Default)]
struct RecordingClock {
    inner: MonotonicClock,
    sleeps: Mutex<Vec<Duration>>,
}

impl Clock for RecordingClock {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.inner.sleep(duration);
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

fn connect(config: DriverConfig) -> (Driver, MockDevice) {
    let (transport, device) = MockTransport::pair();
    let driver = Driver::new(transport, config).unwrap();
    (driver, device)
}

#[test]
fn test_push_telemetry_is_published() {
    let (driver, device) = connect(DriverConfig::default());
    assert!(driver.latest_sample().is_none());

    device.push_bytes(b"12.4, -80");
    device.push_bytes(b"0\r\nready\n");

    assert!(wait_until(Duration::from_secs(2), || {
        driver.telemetry().last_diagnostic.is_some()
    }));
    let sample = driver.latest_sample().unwrap();
    assert_eq!(sample.seq, 1);
    assert_eq!(sample.position, Setpoint::new(12, -500));
    assert_eq!(driver.telemetry().last_diagnostic.as_deref(), Some("ready"));

    let metrics = driver.metrics();
    assert_eq!(metrics.telemetry_samples, 1);
    assert_eq!(metrics.diagnostic_lines, 1);
}

#[test]
fn test_mode_echo_is_recorded_as_ack() {
    let (driver, device) = connect(DriverConfig::default());
    device.push_line("REMOTE");
    assert!(wait_until(Duration::from_secs(2), || {
        driver.telemetry().last_ack == Some(ModeToken::Remote)
    }));
}

#[test]
fn test_subscribers_see_every_line_verbatim() {
    let (driver, device) = connect(DriverConfig::default());
    let frames = driver.subscribe_frames(16);

    device.push_line("1 2");
    device.push_line("   ");
    device.push_line("  motor fault  ");

    let first = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    let second = frames.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.text, "1 2");
    assert_eq!(second.text, "motor fault");
    assert!(second.seq > first.seq);
}

#[test]
fn test_writes_reach_device_with_terminator() {
    let (driver, device) = connect(DriverConfig::default());
    driver.send_forced(&Command::Mode(ModeToken::Init)).unwrap();
    driver.send_forced(&Command::neutral()).unwrap();
    assert_eq!(device.written_lines(), vec!["init", "0,0"]);

    // 刚写过，尽力发送会被窗口丢弃
    let outcome = driver
        .try_send(&Command::Setpoint(Setpoint::new(1, 1)))
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Dropped(_)));
    assert_eq!(driver.metrics().tx_lines_total, 2);
}

#[test]
fn test_end_of_stream_tears_down_connection() {
    let (driver, device) = connect(DriverConfig::default());
    device.push_line("bye");
    device.disconnect();

    assert!(wait_until(Duration::from_secs(2), || !driver.is_connected()));
    assert_eq!(driver.disconnect_reason().as_deref(), Some("end of stream"));
    assert!(matches!(
        driver.send_forced(&Command::neutral()),
        Err(DriverError::ConnectionLost(_))
    ));
}

#[test]
fn test_write_failure_tears_down_connection() {
    let (driver, device) = connect(DriverConfig::default());
    device.set_fail_writes(true);

    let err = driver.send_forced(&Command::neutral()).unwrap_err();
    assert!(matches!(err, DriverError::Transport(_)));
    assert!(!driver.is_connected());
    assert!(driver.disconnect_reason().unwrap().starts_with("write failed"));
    assert_eq!(driver.metrics().device_errors, 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let (driver, _device) = connect(DriverConfig::default());
    driver.shutdown();
    driver.shutdown();
    assert!(!driver.is_connected());
    assert_eq!(driver.disconnect_reason().as_deref(), Some("closed by host"));
}

#[test]
fn test_poll_mode_requests_and_measures_round_trip() {
    let config = DriverConfig {
        telemetry: TelemetryMode::Poll {
            interval_ms: 20,
            pipelined: false,
        },
        join_timeout_ms: 500,
        ..DriverConfig::default()
    };
    let (driver, device) = connect(config);

    assert!(wait_until(Duration::from_secs(2), || {
        device.written_lines().iter().any(|l| l == "getPos")
    }));
    device.push_line("3,4");

    assert!(wait_until(Duration::from_secs(2), || driver.latest_sample().is_some()));
    let sample = driver.latest_sample().unwrap();
    assert_eq!(sample.position, Setpoint::new(3, 4));
    assert!(sample.round_trip.is_some());
    assert!(driver.metrics().poll_requests >= 1);
}

#[test]
fn test_pipelined_poll_reissues_after_reply() {
    let config = DriverConfig {
        min_send_interval_ms: 0,
        telemetry: TelemetryMode::Poll {
            interval_ms: 2_000,
            pipelined: true,
        },
        join_timeout_ms: 50,
        ..DriverConfig::default()
    };
    let (driver, device) = connect(config);

    let count = |device: &MockDevice| {
        device
            .written_lines()
            .iter()
            .filter(|l| l.as_str() == "getPos")
            .count()
    };
    assert!(wait_until(Duration::from_secs(1), || count(&device) == 1));

    device.push_line("1,1");
    assert!(wait_until(Duration::from_secs(1), || count(&device) == 2));
    device.push_line("2,2");
    assert!(wait_until(Duration::from_secs(1), || count(&device) == 3));
    assert_eq!(driver.latest_sample().unwrap().seq, 2);
}

#[test]
fn test_long_poll_interval_does_not_delay_shutdown() {
    let clock = Arc::new(RecordingClock::default());
    let config = DriverConfig {
        telemetry: TelemetryMode::Poll {
            interval_ms: 2_000,
            pipelined: false,
        },
        join_timeout_ms: 500,
        ..DriverConfig::default()
    };
    let (transport, device) = MockTransport::pair();
    let driver = Driver::with_clock(transport, config, clock.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(1), || {
        device.written_lines().iter().any(|l| l == "getPos")
    }));
    assert!(wait_until(Duration::from_secs(1), || clock.sleeps.lock().len() >= 2));

    // 轮询线程按读超时分片休眠，关闭不必等满间隔或 join 超时
    let started = Instant::now();
    driver.shutdown();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(
        clock
            .sleeps
            .lock()
            .iter()
            .all(|sleep| *sleep <= Duration::from_millis(20))
    );
}
