//! REPL – the interactive `armctl>` shell over an [`ArmSession`].
//!
//! Input is parsed into a [`Command`] first so the grammar can be tested
//! without a session. Type `/help` for the command list.

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use armctl_runtime::{ArmSession, Axis, PushOutcome};
use armctl_types::{ActuatorPose, ArmError, CHANNEL_COUNT, CartesianTarget, PoseSnapshot};
use tokio::runtime::Runtime;

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Status { json: bool },
    Target(CartesianTarget),
    Jog(Axis, f64),
    Joint { index: usize, value: i32 },
    Gripper(GripperAction),
    Speed(u8),
    Home,
    Drag(bool),
    Push(PoseSnapshot),
    Record,
    Steps,
    DropStep(usize),
    Clear,
    Save(String),
    Sequences,
    Delete(String),
    Play(String),
    Stop,
    Wait,
    GoTo { name: String, index: usize },
    PointSave(String),
    PointLoad(String),
    PointDelete(String),
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperAction {
    Open,
    Close,
    Value(i32),
}

/// Parse one input line. Errors carry a usage hint.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let cmd = match (head, args.as_slice()) {
        ("/help", []) => Command::Help,
        ("/quit" | "/exit", []) => Command::Quit,
        ("/status", []) => Command::Status { json: false },
        ("/status", ["json"]) => Command::Status { json: true },
        ("/target", [x, y, z, pitch, roll]) => Command::Target(CartesianTarget::new(
            number(x)?,
            number(y)?,
            number(z)?,
            number(pitch)?,
            number(roll)?,
        )),
        ("/target", _) => return Err("usage: /target <x> <y> <z> <pitch> <roll>".to_string()),
        ("/jog", [axis, delta]) => {
            let axis = Axis::parse(axis).ok_or_else(|| format!("unknown axis '{axis}'"))?;
            Command::Jog(axis, number(delta)?)
        }
        ("/jog", _) => return Err("usage: /jog <x|y|z|pitch|roll> <delta>".to_string()),
        ("/joint", [index, value]) => Command::Joint {
            index: integer(index)?,
            value: integer(value)?,
        },
        ("/joint", _) => return Err("usage: /joint <0-5> <value>".to_string()),
        ("/gripper", ["open"]) => Command::Gripper(GripperAction::Open),
        ("/gripper", ["close"]) => Command::Gripper(GripperAction::Close),
        ("/gripper", [value]) => Command::Gripper(GripperAction::Value(integer(value)?)),
        ("/gripper", _) => return Err("usage: /gripper <open|close|value>".to_string()),
        ("/speed", [value]) => Command::Speed(integer(value)?),
        ("/speed", _) => return Err("usage: /speed <0-100>".to_string()),
        ("/home", []) => Command::Home,
        ("/drag", ["start" | "begin"]) => Command::Drag(true),
        ("/drag", ["end" | "stop"]) => Command::Drag(false),
        ("/drag", _) => return Err("usage: /drag <start|end>".to_string()),
        ("/push", values) if values.len() == CHANNEL_COUNT + 1 => {
            let mut servos = [0i32; CHANNEL_COUNT];
            for (slot, raw) in servos.iter_mut().zip(values.iter()) {
                *slot = integer(raw)?;
            }
            let speed = integer(values[CHANNEL_COUNT])?;
            Command::Push(PoseSnapshot::new(ActuatorPose::new(servos), speed))
        }
        ("/push", _) => return Err("usage: /push <s1> … <s6> <speed>".to_string()),
        ("/record", []) => Command::Record,
        ("/steps", []) => Command::Steps,
        ("/drop", [index]) => Command::DropStep(integer(index)?),
        ("/clear", []) => Command::Clear,
        ("/save", [name]) => Command::Save(name.to_string()),
        ("/sequences", []) => Command::Sequences,
        ("/delete", [name]) => Command::Delete(name.to_string()),
        ("/play", [name]) => Command::Play(name.to_string()),
        ("/stop", []) => Command::Stop,
        ("/wait", []) => Command::Wait,
        ("/goto", [name, index]) => Command::GoTo {
            name: name.to_string(),
            index: integer(index)?,
        },
        ("/point", ["save", name]) => Command::PointSave(name.to_string()),
        ("/point", ["load", name]) => Command::PointLoad(name.to_string()),
        ("/point", ["delete", name]) => Command::PointDelete(name.to_string()),
        ("/point", _) => return Err("usage: /point <save|load|delete> <name>".to_string()),
        ("/points", []) => Command::Points,
        (other, _) => return Err(format!("unknown command '{other}'")),
    };
    Ok(cmd)
}

fn number(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("'{raw}' is not a number"))
}

fn integer<T: std::str::FromStr>(raw: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| format!("'{raw}' is not a valid integer here"))
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(rt: &Runtime, session: &mut ArmSession, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "armctl>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(cmd) => execute(rt, session, cmd),
            Err(msg) => println!(
                "{} {}. Type {} for available commands.",
                "✗".red(),
                msg.yellow(),
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn execute(rt: &Runtime, session: &mut ArmSession, cmd: Command) {
    let result: Result<(), ArmError> = match cmd {
        Command::Help => {
            cmd_help();
            Ok(())
        }
        Command::Quit => Ok(()),
        Command::Status { json } => {
            cmd_status(session, json);
            Ok(())
        }
        Command::Target(target) => session.set_target(target).map(print_pose),
        Command::Jog(axis, delta) => session.jog(axis, delta).map(print_pose),
        Command::Joint { index, value } => session.set_joint(index, value).map(print_pose),
        Command::Gripper(action) => {
            let moved = match action {
                GripperAction::Open => session.open_gripper(),
                GripperAction::Close => session.close_gripper(),
                GripperAction::Value(v) => session.set_gripper(v),
            };
            moved.map(print_pose)
        }
        Command::Speed(speed) => session
            .set_speed(speed)
            .map(|s| println!("  speed {}", s.to_string().bold())),
        Command::Home => session.home().map(print_pose),
        Command::Drag(true) => session
            .begin_drag()
            .map(|()| println!("  {}", "drag lock held; hardware pushes ignored".yellow())),
        Command::Drag(false) => session
            .end_drag()
            .map(|()| println!("  {}", "drag lock released".green())),
        Command::Push(push) => {
            match session.apply_push(push) {
                PushOutcome::Applied => println!("  push applied: {}", push.pose),
                PushOutcome::Discarded(owner) => {
                    println!("  push discarded (lock held by {})", owner.to_string().yellow())
                }
                PushOutcome::Rejected => println!("  {}", "push rejected: out of range".red()),
            }
            Ok(())
        }
        Command::Record => session
            .record_step()
            .map(|i| println!("  recorded step {}", i.to_string().bold())),
        Command::Steps => {
            print_steps(session);
            Ok(())
        }
        Command::DropStep(index) => session
            .remove_step(index)
            .map(|step| println!("  removed step {index}: {}", step.pose)),
        Command::Clear => {
            session.clear_steps();
            println!("  recording cleared");
            Ok(())
        }
        Command::Save(name) => session.save_sequence(&name).map(|seq| {
            println!(
                "  {} saved '{}' ({} steps)",
                "✓".green(),
                seq.name.bold(),
                seq.len()
            )
        }),
        Command::Sequences => session.list_sequences().map(|all| {
            if all.is_empty() {
                println!("  (no sequences)");
            }
            for seq in all {
                println!("  • {} ({} steps)", seq.name.bold(), seq.len());
            }
        }),
        Command::Delete(name) => session.delete_sequence(&name).map(|found| {
            if found {
                println!("  deleted '{name}'");
            } else {
                println!("  no sequence named '{name}'");
            }
        }),
        Command::Play(name) => session
            .play_sequence(&name)
            .map(|run| println!("  playing '{}' (run {run}); /stop to cancel", name.bold())),
        Command::Stop => {
            if session.stop_playback() {
                println!("  stopping playback");
            } else {
                println!("  nothing is playing");
            }
            Ok(())
        }
        Command::Wait => rt.block_on(session.wait_playback()).map(|report| match report {
            Some(r) => println!(
                "  run {} {:?}: {} steps applied",
                r.run, r.outcome, r.steps_applied
            ),
            None => println!("  nothing is playing"),
        }),
        Command::GoTo { name, index } => session
            .go_to_step(&name, index)
            .map(|step| print_pose(step.pose)),
        Command::PointSave(name) => session.save_point(&name).map(|p| {
            println!(
                "  {} point '{}' at ({:.1}, {:.1}, {:.1})",
                "✓".green(),
                p.name.bold(),
                p.target.x,
                p.target.y,
                p.target.z
            )
        }),
        Command::PointLoad(name) => session.load_point(&name).map(print_pose),
        Command::PointDelete(name) => session.delete_point(&name).map(|found| {
            if found {
                println!("  deleted point '{name}'");
            } else {
                println!("  no point named '{name}'");
            }
        }),
        Command::Points => session.list_points().map(|points| {
            if points.is_empty() {
                println!("  (no points)");
            }
            for p in points {
                println!(
                    "  • {} ({:.1}, {:.1}, {:.1}, pitch {:.1}, roll {:.1})",
                    p.name.bold(),
                    p.target.x,
                    p.target.y,
                    p.target.z,
                    p.target.pitch_deg,
                    p.target.roll_deg
                );
            }
        }),
    };

    if let Err(e) = result {
        println!("  {} {}", "✗".red(), e.to_string().red());
    }
}

fn cmd_help() {
    println!();
    println!("{}", "armctl Commands".bold().underline());
    let rows = [
        ("/target x y z pitch roll", "solve and move to a Cartesian pose"),
        ("/jog <axis> <delta>", "nudge the target along x, y, z, pitch or roll"),
        ("/joint <i> <value>", "set one actuator channel directly"),
        ("/gripper open|close|<v>", "drive the gripper"),
        ("/speed <0-100>", "speed for following moves"),
        ("/home", "all joints to 90 at speed 50"),
        ("/drag start|end", "hold or release the operator lock"),
        ("/push s1..s6 speed", "inject a hardware state push"),
        ("/record  /steps  /drop <i>  /clear", "edit the recording"),
        ("/save <name>", "store the recording as a sequence"),
        ("/sequences  /delete <name>", "browse the library"),
        ("/play <name>  /stop  /wait", "sequence playback"),
        ("/goto <name> <i>", "move to one step of a sequence"),
        ("/point save|load|delete <name>  /points", "named Cartesian points"),
        ("/status [json]", "current state"),
        ("/quit  /exit", "leave the shell"),
    ];
    for (usage, what) in rows {
        println!("  {:<42} {}", usage.bold().cyan(), what);
    }
    println!();
}

fn cmd_status(session: &ArmSession, json: bool) {
    let status = session.status();
    if json {
        match serde_json::to_string_pretty(&status) {
            Ok(s) => println!("{s}"),
            Err(e) => println!("{}: {}", "Serialization error".red(), e),
        }
        return;
    }
    println!("{}", "Arm Status".bold().underline());
    println!("  phase     : {:?}", status.phase);
    println!("  committed : {}", status.committed.to_string().bold());
    match status.preview {
        Some(p) => println!("  preview   : {}", p.to_string().yellow()),
        None => println!("  preview   : {}", "-".dimmed()),
    }
    match status.lock {
        Some(owner) => println!("  lock      : {}", owner.to_string().yellow()),
        None => println!("  lock      : {}", "free".green()),
    }
    println!("  speed     : {}", status.speed);
    println!(
        "  tool      : ({:.1}, {:.1}, {:.1}) pitch {:.1} roll {:.1}",
        status.tool.x, status.tool.y, status.tool.z, status.tool.pitch_deg, status.tool.roll_deg
    );
    println!("  recording : {} steps", status.recorded_steps);
    if let Some(run) = status.playing {
        println!("  playing   : run {run}");
    }
    let d = status.dispatch;
    println!(
        "  dispatch  : {} sent, {} coalesced, {} failed, {} refused, {} preempted",
        d.sent, d.coalesced, d.failed, d.refused, d.preempted
    );
}

fn print_pose(pose: ActuatorPose) {
    println!("  → {}", pose.to_string().bold());
}

fn print_steps(session: &ArmSession) {
    let steps = session.recorded_steps();
    if steps.is_empty() {
        println!("  (no recorded steps)");
    }
    for (i, step) in steps.iter().enumerate() {
        println!("  {:>3}. {} @ {}", i, step.pose, step.speed);
    }
}
