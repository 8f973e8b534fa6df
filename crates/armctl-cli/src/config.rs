//! Configuration – reads/writes `~/.armctl/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use armctl_kinematics::{ElbowConfiguration, ServoCalibration};
use armctl_runtime::{DispatcherConfig, PlaybackConfig, SessionConfig};
use armctl_types::{ActuatorPose, ArmGeometry, DEFAULT_SPEED, MAX_SPEED, PoseSnapshot};

/// Persisted operator configuration stored in `~/.armctl/config.toml`.
///
/// Scalar fields come first so the file serialises with every table at the
/// end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Quiet period before a pose command is sent.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Pause after each playback step.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// How long a single send may take before it counts as failed.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Seconds counted down before playback starts (0 disables).
    #[serde(default = "default_countdown")]
    pub countdown_from: u32,

    /// Speed the arm starts with (0–100).
    #[serde(default = "default_speed")]
    pub default_speed: u8,

    #[serde(default = "default_gripper_open")]
    pub gripper_open: i32,

    #[serde(default = "default_gripper_closed")]
    pub gripper_closed: i32,

    /// Lowest z reachable by jogging, in mm.
    #[serde(default = "default_jog_z_floor")]
    pub jog_z_floor: f64,

    /// Echo every command back as a state push (simulated hardware).
    #[serde(default = "default_echo_state")]
    pub echo_state: bool,

    /// SQLite file for sequences and points. Defaults to
    /// `~/.armctl/library.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,

    #[serde(default)]
    pub elbow: ElbowConfiguration,

    #[serde(default)]
    pub geometry: ArmGeometry,

    #[serde(default)]
    pub calibration: ServoCalibration,
}

fn default_debounce_ms() -> u64 {
    100
}
fn default_settle_ms() -> u64 {
    550
}
fn default_send_timeout_ms() -> u64 {
    2_000
}
fn default_countdown() -> u32 {
    3
}
fn default_speed() -> u8 {
    DEFAULT_SPEED
}
fn default_gripper_open() -> i32 {
    90
}
fn default_gripper_closed() -> i32 {
    120
}
fn default_jog_z_floor() -> f64 {
    -50.0
}
fn default_echo_state() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            countdown_from: default_countdown(),
            default_speed: default_speed(),
            gripper_open: default_gripper_open(),
            gripper_closed: default_gripper_closed(),
            jog_z_floor: default_jog_z_floor(),
            echo_state: default_echo_state(),
            db_path: None,
            elbow: ElbowConfiguration::default(),
            geometry: ArmGeometry::default(),
            calibration: ServoCalibration::default(),
        }
    }
}

impl Config {
    /// The library file actually used.
    pub fn resolved_db_path(&self) -> String {
        self.db_path.clone().unwrap_or_else(|| {
            armctl_dir(&home_dir())
                .join("library.db")
                .to_string_lossy()
                .to_string()
        })
    }

    /// Translate into the runtime's session settings.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            geometry: self.geometry,
            calibration: self.calibration,
            elbow: self.elbow,
            dispatcher: DispatcherConfig {
                debounce: Duration::from_millis(self.debounce_ms),
                send_timeout: Duration::from_millis(self.send_timeout_ms),
            },
            playback: PlaybackConfig {
                settle: Duration::from_millis(self.settle_ms),
                countdown_from: self.countdown_from,
                ..PlaybackConfig::default()
            },
            gripper_open: self.gripper_open,
            gripper_closed: self.gripper_closed,
            jog_z_floor: self.jog_z_floor,
            initial: PoseSnapshot::new(ActuatorPose::home(), self.default_speed),
            persistence_path: Some(self.resolved_db_path()),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn armctl_dir(home: &str) -> PathBuf {
    PathBuf::from(home).join(".armctl")
}

/// Return the path to `~/.armctl/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    armctl_dir(home).join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ARMCTL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ARMCTL_DEBOUNCE_MS` | `debounce_ms` |
/// | `ARMCTL_SETTLE_MS` | `settle_ms` |
/// | `ARMCTL_DB_PATH` | `db_path` |
/// | `ARMCTL_DEFAULT_SPEED` | `default_speed` (clamped to 100) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ARMCTL_DEBOUNCE_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.debounce_ms = ms;
    }
    if let Ok(v) = std::env::var("ARMCTL_SETTLE_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.settle_ms = ms;
    }
    if let Ok(v) = std::env::var("ARMCTL_DB_PATH")
        && !v.trim().is_empty()
    {
        cfg.db_path = Some(v);
    }
    if let Ok(v) = std::env::var("ARMCTL_DEFAULT_SPEED")
        && let Ok(speed) = v.parse::<u8>()
    {
        cfg.default_speed = speed.min(MAX_SPEED);
    }
}

/// Save the config to disk, creating `~/.armctl/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------); the library database lives here too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
