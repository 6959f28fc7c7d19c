//! 监视设备输出与遥测

use crate::config::CliConfig;
use crate::connection::{ConnectArgs, open_driver};
use anyhow::Result;
use clap::Args;
use plinth_driver::TelemetryMode;
use plinth_protocol::{Inbound, classify};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 监视命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// 以该间隔（毫秒）轮询位置，覆盖配置
    #[arg(long)]
    pub poll: Option<u64>,

    /// 轮询时每收到回复立即再请求
    #[arg(long, requires = "poll")]
    pub pipelined: bool,

    /// 运行时长（秒），默认直到 Ctrl+C
    #[arg(short, long)]
    pub duration: Option<u64>,
}

impl MonitorCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let transport = self.connect.resolve(config)?;
        let mut driver_config = config.driver.clone();
        if let Some(interval_ms) = self.poll {
            driver_config.telemetry = TelemetryMode::Poll {
                interval_ms,
                pipelined: self.pipelined,
            };
        }

        let driver = open_driver(&transport, driver_config)?;
        let frames = driver.subscribe_frames(1024);

        let running = Arc::new(AtomicBool::new(true));
        {
            let running = running.clone();
            ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
        }

        println!("📡 监视中（Ctrl+C 退出）");
        let deadline = self
            .duration
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let envelope = driver.config().envelope;

        while running.load(Ordering::SeqCst) && driver.is_connected() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            let Ok(frame) = frames.recv_timeout(Duration::from_millis(100)) else {
                continue;
            };
            match classify(&frame.text) {
                Inbound::Position(report) => {
                    let position = report.to_setpoint(envelope);
                    println!("📍 #{:<6} {:>5},{:<5}", frame.seq, position.x, position.y);
                },
                Inbound::Ack(token) => println!("🔁 {}", token),
                Inbound::Diagnostic(text) => println!("💬 {}", text),
            }
        }

        if driver.config().telemetry.is_poll()
            && let Some(rtt) = driver.latest_sample().and_then(|sample| sample.round_trip)
        {
            println!("⏱️  最近往返时间 {:.1} ms", rtt.as_secs_f64() * 1000.0);
        }
        if let Some(reason) = driver.disconnect_reason() {
            eprintln!("⚠️  连接已断开: {}", reason);
        }
        let metrics = driver.metrics();
        driver.shutdown();

        println!(
            "📊 {} 行, {} 个位置样本, {} 次轮询, 丢弃率 {:.1}%",
            metrics.rx_frames_total,
            metrics.telemetry_samples,
            metrics.poll_requests,
            metrics.drop_rate() * 100.0
        );
        Ok(())
    }
}
