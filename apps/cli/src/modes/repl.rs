//! REPL 模式（交互式 Shell）
//!
//! 专用输入线程 + crossbeam 通道：rustyline 在输入线程中运行并保留历史，
//! 主线程执行命令。命令与 [`Session`] 操作一一对应。

use crate::config::CliConfig;
use crate::connection::{ConnectArgs, open_driver};
use anyhow::Result;
use crossbeam_channel::{Receiver, bounded};
use plinth_client::{
    ChannelPresenter, Mode, PlaybackReport, PresentationEvent, Session, SurfacePoint,
};
use plinth_driver::SendOutcome;
use rustyline::Editor;
use std::sync::Arc;
use std::thread;
use tracing::trace;

/// Shell 命令
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Connect(ConnectArgs),
    Disconnect,
    /// 原样发送一行
    Send(String),
    Mode(Mode),
    /// 进入 / 离开图案记录
    Pattern,
    Press(SurfacePoint),
    Move(SurfacePoint),
    Release,
    Leave,
    Play,
    Stop,
    /// 等待回放结束并打印报告
    Wait,
    Status,
    Telemetry,
    Help,
    Exit,
}

/// 解析一行 Shell 输入
pub fn parse_shell_command(line: &str) -> Result<ShellCommand> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "connect" => ShellCommand::Connect(parse_connect(rest)?),
        "disconnect" => ShellCommand::Disconnect,
        "send" => {
            if rest.is_empty() {
                anyhow::bail!("send 需要一行命令文本");
            }
            ShellCommand::Send(rest.to_string())
        },
        "init" => ShellCommand::Mode(Mode::Init),
        "standalone" => ShellCommand::Mode(Mode::Standalone),
        "pause" => ShellCommand::Mode(Mode::Pause),
        "remote" => ShellCommand::Mode(Mode::Remote),
        "pattern" => ShellCommand::Pattern,
        "press" => ShellCommand::Press(parse_point(rest)?),
        "move" => ShellCommand::Move(parse_point(rest)?),
        "release" => ShellCommand::Release,
        "leave" => ShellCommand::Leave,
        "play" => ShellCommand::Play,
        "stop" => ShellCommand::Stop,
        "wait" => ShellCommand::Wait,
        "status" => ShellCommand::Status,
        "telemetry" | "pos" => ShellCommand::Telemetry,
        "help" | "?" => ShellCommand::Help,
        "exit" | "quit" => ShellCommand::Exit,
        "" => anyhow::bail!("空命令"),
        other => anyhow::bail!("未知命令: {}", other),
    };
    Ok(command)
}

/// `connect` / `connect <port> [baud]` / `connect tcp <host:port>`
fn parse_connect(rest: &str) -> Result<ConnectArgs> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    match parts.as_slice() {
        [] => Ok(ConnectArgs::default()),
        ["tcp", addr] => Ok(ConnectArgs {
            tcp: Some((*addr).to_string()),
            ..ConnectArgs::default()
        }),
        [port] => Ok(ConnectArgs {
            port: Some((*port).to_string()),
            ..ConnectArgs::default()
        }),
        [port, baud] => Ok(ConnectArgs {
            port: Some((*port).to_string()),
            baud: Some(baud.parse().map_err(|_| anyhow::anyhow!("无效的波特率: {}", baud))?),
            tcp: None,
        }),
        _ => anyhow::bail!("用法: connect [<port> [baud] | tcp <host:port>]"),
    }
}

/// `x y` 或 `x,y`
fn parse_point(rest: &str) -> Result<SurfacePoint> {
    let fields: Vec<&str> = rest
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    let [x, y] = fields.as_slice() else {
        anyhow::bail!("需要两个坐标，如 'move 120 80'");
    };
    let parse = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| anyhow::anyhow!("无效的坐标: {}", s))
    };
    Ok(SurfacePoint::new(parse(x)?, parse(y)?))
}

/// 输入线程发往主线程的事件
#[derive(Debug)]
enum ShellInput {
    Line(String),
    /// 读行时按下 Ctrl+C
    Interrupt,
}

/// REPL 输入（专用输入线程）
struct ReplInput {
    input_rx: Receiver<ShellInput>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl ReplInput {
    /// 创建专用输入线程（保留历史记录）
    fn new() -> Self {
        let (input_tx, input_rx) = bounded::<ShellInput>(10);

        // Editor 在输入线程内创建，生命周期 = REPL 会话
        let input_thread = thread::spawn(move || {
            use rustyline::history::DefaultHistory;

            let mut rl = Editor::<(), DefaultHistory>::new()
                .map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;

            let history_path = ".plinth_history";
            rl.load_history(history_path).ok();

            println!("Plinth CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
            println!("输入 'help' 查看帮助，'exit' 退出");
            println!();

            loop {
                match rl.readline("plinth> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        let _ = rl.add_history_entry(line.clone());
                        let exit = matches!(line.as_str(), "exit" | "quit");
                        if input_tx.send(ShellInput::Line(line)).is_err() || exit {
                            break;
                        }
                    },

                    Err(rustyline::error::ReadlineError::Interrupted) => {
                        println!("^C");
                        let _ = input_tx.send(ShellInput::Interrupt);
                    },

                    Err(rustyline::error::ReadlineError::Eof) => break,

                    Err(err) => {
                        eprintln!("Error: {:?}", err);
                        break;
                    },
                }
            }

            rl.save_history(history_path).ok();
            Ok(())
        });

        Self {
            input_rx,
            _input_thread: input_thread,
        }
    }

    /// 阻塞等待输入；输入线程退出后返回 `None`
    fn recv(&self) -> Option<ShellInput> {
        self.input_rx.recv().ok()
    }
}

/// 运行 REPL 模式
pub fn run_repl(config: CliConfig) -> Result<()> {
    let (presenter, events) = ChannelPresenter::new();
    let session = Arc::new(Session::with_presenter(config.session, Arc::new(presenter))?);
    let input = ReplInput::new();

    println!();
    println!("💡 提示: 使用 'connect' 连接设备，然后 'remote' 进入远程控制");
    println!();

    // 执行命令期间的 Ctrl+C
    {
        let session = session.clone();
        ctrlc::set_handler(move || emergency_pause(&session))?;
    }

    while let Some(input) = input.recv() {
        for event in events.try_iter() {
            log_presentation(&event);
        }

        let line = match input {
            ShellInput::Interrupt => {
                emergency_pause(&session);
                continue;
            },
            ShellInput::Line(line) => line,
        };

        match parse_shell_command(&line) {
            Ok(ShellCommand::Exit) => {
                println!("👋 再见！");
                break;
            },
            Ok(command) => {
                if let Err(err) = execute(&session, &config, command) {
                    eprintln!("❌ Error: {:#}", err);
                    print_help_hint(&line);
                }
            },
            Err(err) => {
                eprintln!("❌ {}", err);
                print_help_hint(&line);
            },
        }
    }

    session.disconnect();
    Ok(())
}

/// Ctrl+C：停止回放，已连接时进入 Pause
fn emergency_pause(session: &Session) {
    eprintln!("\n🛑 停止回放并暂停");
    if !session.is_connected() {
        session.stop_pattern();
        return;
    }
    if let Err(err) = session.set_mode(Mode::Pause) {
        eprintln!("❌ 暂停失败: {}", err);
    }
}

fn log_presentation(event: &PresentationEvent) {
    match event {
        PresentationEvent::Position(point) => {
            trace!("indicator at ({:.1}, {:.1})", point.x, point.y)
        },
        PresentationEvent::Pattern(points) => trace!("pattern now {} points", points.len()),
    }
}

fn execute(session: &Session, config: &CliConfig, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Connect(args) => {
            let transport = args.resolve(config)?;
            session.connect(open_driver(&transport, config.driver.clone())?);
        },

        ShellCommand::Disconnect => {
            session.disconnect();
            println!("✅ 已断开");
        },

        ShellCommand::Send(line) => {
            session.send_raw(&line)?;
            println!("➡️  {}", line.trim());
        },

        ShellCommand::Mode(mode) => {
            session.set_mode(mode)?;
            println!("✅ 模式: {}", mode);
        },

        ShellCommand::Pattern => {
            let mode = session.toggle_pattern_mode()?;
            if mode == Mode::PatternRecord {
                println!("⏺️  记录图案：press / move / release 绘制，再次 'pattern' 结束");
            } else {
                println!("✅ 图案 {} 点，模式: {}", session.pattern().len(), mode);
            }
        },

        ShellCommand::Press(point) => session.pointer_pressed(point)?,

        ShellCommand::Move(point) => match session.pointer_moved(point)? {
            Some(SendOutcome::Sent) => println!("➡️  已发送"),
            Some(SendOutcome::Dropped(reason)) => println!("⏭️  已丢弃 ({:?})", reason),
            None => {},
        },

        ShellCommand::Release => session.pointer_released(),

        ShellCommand::Leave => session.pointer_left()?,

        ShellCommand::Play => {
            session.play_pattern()?;
            println!("▶️  回放 {} 点（'stop' 停止，'wait' 等待结束）", session.pattern().len());
        },

        ShellCommand::Stop => {
            if session.stop_pattern() {
                println!("⏹️  停止回放");
            } else {
                println!("⚠️  没有正在进行的回放");
            }
        },

        ShellCommand::Wait => match session.wait_playback() {
            Some(report) => print_report(&report),
            None => println!("⚠️  没有回放"),
        },

        ShellCommand::Status => print_status(session),

        ShellCommand::Telemetry => match session.telemetry() {
            Some(sample) => {
                println!(
                    "📍 #{} 设备 {},{}",
                    sample.seq, sample.position.x, sample.position.y
                );
                if let Some(point) = session.telemetry_surface() {
                    println!("   表面 ({:.1}, {:.1})", point.x, point.y);
                }
                if let Some(rtt) = sample.round_trip {
                    println!("   往返 {:.1} ms", rtt.as_secs_f64() * 1000.0);
                }
            },
            None => println!("(暂无遥测)"),
        },

        ShellCommand::Help => print_help(),

        ShellCommand::Exit => {},
    }
    Ok(())
}

fn print_report(report: &PlaybackReport) {
    println!(
        "📊 回放 {:?}: {} / {} 点已发送，{} 点被节流丢弃",
        report.outcome, report.sent, report.total, report.dropped
    );
}

fn print_status(session: &Session) {
    println!("📊 状态:");
    println!("  模式: {}", session.mode());
    println!("  图案: {} 点", session.pattern().len());
    println!("  回放中: {}", session.is_playing());
    match session.driver() {
        Some(driver) => {
            let metrics = driver.metrics();
            println!("  连接: 已连接");
            println!(
                "  下行: {} 行（可靠 {}），丢弃 {} / {}",
                metrics.tx_lines_total,
                metrics.tx_forced_total,
                metrics.tx_dropped_interval,
                metrics.tx_dropped_inflight
            );
            println!(
                "  上行: {} 行，{} 个位置样本，{} 行诊断",
                metrics.rx_frames_total, metrics.telemetry_samples, metrics.diagnostic_lines
            );
            if let Some(ack) = driver.telemetry().last_ack {
                println!("  设备回显模式: {}", ack);
            }
        },
        None => println!("  连接: 未连接"),
    }
}

/// 打印帮助信息
fn print_help() {
    println!("可用命令:");
    println!("  connect [port [baud]]         连接串口（省略时使用配置）");
    println!("  connect tcp <host:port>       连接串口转 TCP 桥");
    println!("  disconnect                    断开连接");
    println!("  init | standalone | pause     切换模式（发送令牌和中位点）");
    println!("  remote                        远程控制模式");
    println!("  move <x> <y>                  指针移动（表面坐标）");
    println!("  press <x> <y> / release       按下 / 松开");
    println!("  leave                         指针离开（回中位）");
    println!("  pattern                       进入 / 离开图案记录");
    println!("  play / stop / wait            回放图案 / 停止 / 等待结束");
    println!("  send <line>                   原样发送一行");
    println!("  telemetry                     最新位置");
    println!("  status                        显示状态");
    println!("  help                          显示帮助");
    println!("  exit / quit                   退出");
    println!();
    println!("快捷键:");
    println!("  Ctrl+C                        停止回放并暂停");
    println!("  Ctrl+D                        退出");
    println!();
}

/// 提供基于错误的帮助提示
fn print_help_hint(command: &str) {
    if command.starts_with("move") || command.starts_with("press") {
        eprintln!("💡 提示: 使用 'move 120 80' 或 'move 120,80'");
    } else if command.starts_with("connect") {
        eprintln!("💡 提示: 使用 'connect /dev/ttyACM0' 或 'connect tcp 10.0.0.2:4001'");
    } else if command.starts_with("play") {
        eprintln!("💡 提示: 先用 'pattern' 记录图案，并确保已连接");
    } else {
        eprintln!("💡 提示: 输入 'help' 查看所有命令");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes_and_simple_commands() {
        assert_eq!(parse_shell_command("init").unwrap(), ShellCommand::Mode(Mode::Init));
        assert_eq!(parse_shell_command("REMOTE").unwrap(), ShellCommand::Mode(Mode::Remote));
        assert_eq!(parse_shell_command(" play ").unwrap(), ShellCommand::Play);
        assert_eq!(parse_shell_command("quit").unwrap(), ShellCommand::Exit);
        assert_eq!(parse_shell_command("pattern").unwrap(), ShellCommand::Pattern);
    }

    #[test]
    fn test_parse_points() {
        assert_eq!(
            parse_shell_command("move 120 80").unwrap(),
            ShellCommand::Move(SurfacePoint::new(120.0, 80.0))
        );
        assert_eq!(
            parse_shell_command("press 1.5, -2").unwrap(),
            ShellCommand::Press(SurfacePoint::new(1.5, -2.0))
        );
        assert!(parse_shell_command("move 1").is_err());
        assert!(parse_shell_command("move a b").is_err());
    }

    #[test]
    fn test_parse_connect() {
        assert_eq!(
            parse_shell_command("connect").unwrap(),
            ShellCommand::Connect(ConnectArgs::default())
        );
        assert_eq!(
            parse_shell_command("connect tcp 10.0.0.2:4001").unwrap(),
            ShellCommand::Connect(ConnectArgs {
                tcp: Some("10.0.0.2:4001".into()),
                ..ConnectArgs::default()
            })
        );
        assert_eq!(
            parse_shell_command("connect /dev/ttyACM0 9600").unwrap(),
            ShellCommand::Connect(ConnectArgs {
                port: Some("/dev/ttyACM0".into()),
                baud: Some(9600),
                tcp: None,
            })
        );
        assert!(parse_shell_command("connect /dev/ttyACM0 fast").is_err());
    }

    #[test]
    fn test_send_keeps_rest_of_line() {
        assert_eq!(
            parse_shell_command("send 120, -40").unwrap(),
            ShellCommand::Send("120, -40".into())
        );
        assert!(parse_shell_command("send").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_shell_command("launch").is_err());
    }
}
