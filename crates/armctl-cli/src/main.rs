//! `armctl` – interactive controller for the 5-DOF arm.
//!
//! The binary:
//!
//! 1. Initialises logging (`RUST_LOG`, `ARMCTL_LOG_FORMAT`, optional OTLP).
//! 2. Loads `~/.armctl/config.toml`; on first run, asks a couple of questions
//!    and saves the answers.
//! 3. Builds an [`ArmSession`] on a Tokio runtime, backed by the loopback
//!    actuator (optionally echoing every command as a state push).
//! 4. Drops the operator into the slash-command REPL.
//! 5. Intercepts **Ctrl-C** to cancel any playback and exit cleanly.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use armctl_middleware::{EventBus, LoopbackActuator, Topic};
use armctl_runtime::{ArmSession, PlaybackEvent, PlaybackOutcome, TracingRenderer};
use armctl_types::{Event, EventPayload};

fn main() {
    let telemetry = armctl_runtime::init_tracing("armctl");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    let _enter = rt.enter();

    // ── Plumbing ──────────────────────────────────────────────────────────
    let bus = EventBus::default();
    spawn_frame_logger(&bus);
    spawn_alert_printer(&bus);

    let actuator = Arc::new(LoopbackActuator::new(Arc::new(bus.clone())).with_echo(cfg.echo_state));

    let db_path = cfg.resolved_db_path();
    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %e, "could not create library directory");
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut session = match ArmSession::new(cfg.session_config(), actuator.clone(), Some(bus.clone())) {
        Ok(session) => session.with_playback_events(events_tx),
        Err(e) => {
            eprintln!("{}: {}", "Failed to start arm session".red(), e);
            std::process::exit(1);
        }
    };
    rt.block_on(session.listen_for_pushes());
    session.attach_renderer(TracingRenderer::new(cfg.geometry, cfg.calibration));
    spawn_playback_printer(events_rx);

    println!("  Motion library at {}", db_path.dimmed());
    println!(
        "  Hardware echo {}",
        if actuator.echoes_state() { "on".green() } else { "off".yellow() }
    );
    if telemetry.exporting() {
        println!("  Exporting spans over OTLP");
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    let cancel = session.shutdown_token();
    let alert_bus = bus.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping playback …".yellow().bold());
        cancel.cancel();
        let stop = Event::new(
            "armctl-cli",
            EventPayload::Alert {
                component: "cli".to_string(),
                message: "operator interrupt".to_string(),
            },
        );
        let _ = alert_bus.publish_to(Topic::SystemAlerts, stop);
        println!("{}", "  ✓ Exiting armctl.".green());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop playback");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&rt, &mut session, shutdown);

    rt.block_on(session.shutdown());
}

// ─────────────────────────────────────────────────────────────────────────────
// Background printers
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_frame_logger(bus: &EventBus) {
    let mut frames = bus.subscribe_to(Topic::HardwareCommands);
    tokio::spawn(async move {
        while let Ok(event) = frames.recv().await {
            if let EventPayload::CommandFrame(frame) = event.payload {
                debug!(%frame, "controller frame");
            }
        }
    });
}

fn spawn_alert_printer(bus: &EventBus) {
    let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
    tokio::spawn(async move {
        while let Ok(event) = alerts.recv().await {
            if let EventPayload::Alert { component, message } = event.payload {
                println!("\n  {} [{}] {}", "⚠".yellow(), component, message.yellow());
            }
        }
    });
}

fn spawn_playback_printer(mut events: mpsc::UnboundedReceiver<PlaybackEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PlaybackEvent::Countdown { remaining, .. } => {
                    println!("  {} {}", "playback in".dimmed(), remaining.to_string().bold());
                }
                PlaybackEvent::Step { index, total, step, .. } => {
                    println!("  ▶ step {}/{}: {}", index + 1, total, step.pose);
                }
                PlaybackEvent::Finished(report) => match report.outcome {
                    PlaybackOutcome::Completed => println!(
                        "  {} '{}' finished ({} steps)",
                        "✓".green(),
                        report.sequence.bold(),
                        report.steps_applied
                    ),
                    PlaybackOutcome::Cancelled => println!(
                        "  {} '{}' cancelled after {} steps",
                        "■".yellow(),
                        report.sequence.bold(),
                        report.steps_applied
                    ),
                },
            }
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       armctl First-Run Setup         ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found. Press Enter to accept each default.\n");

    let mut cfg = config::Config::default();

    let speed = prompt_line(
        &format!("  Starting speed 0-100 [{}]: ", cfg.default_speed),
        &cfg.default_speed.to_string(),
    );
    if let Ok(v) = speed.parse::<u8>() {
        cfg.default_speed = v.min(armctl_types::MAX_SPEED);
    }

    let countdown = prompt_line(
        &format!("  Playback countdown in seconds [{}]: ", cfg.countdown_from),
        &cfg.countdown_from.to_string(),
    );
    if let Ok(v) = countdown.parse::<u32>() {
        cfg.countdown_from = v;
    }

    let echo = prompt_line("  Simulate hardware state echo? [Y/n]: ", "y");
    cfg.echo_state = !echo.eq_ignore_ascii_case("n");

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____ __________ ___  _____/ /_/ /"#.bold().cyan());
    println!("{}", r#"  / __ `/ ___/ __ `__ \/ ___/ __/ / "#.bold().cyan());
    println!("{}", r#" / /_/ / /  / / / / / / /__/ /_/ /  "#.bold().cyan());
    println!("{}", r#" \__,_/_/  /_/ /_/ /_/\___/\__/_/   "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "armctl".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  5-DOF arm controller");
    println!();
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
