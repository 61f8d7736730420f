//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";
const APP_NAME: &str = "reflex";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Connection recovery (reconnect state machine) settings.
    pub recovery: RecoveryConfig,
    /// Outbound message priority settings.
    pub priority: PriorityConfig,
    /// Optimistic prediction settings.
    pub prediction: PredictionConfig,
    /// Network health monitor settings.
    pub monitor: MonitorConfig,
    /// Last-known server settings.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Connection recovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Master switch. When off, recoverable errors park the controller in `Disabled`.
    pub enabled: bool,
    /// Attempts per episode before giving up.
    pub max_attempts: u32,
    /// Delay before the first attempt, and the floor for every jittered delay.
    pub base_delay_ms: u64,
    /// Upper bound on the un-jittered delay.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// Symmetric jitter, in percent of the computed delay (0-50).
    pub jitter_pct: u32,
    /// A connection stable for this long resets the attempt counter.
    pub stable_reset_secs: u64,
    /// Silence on the inbound stream longer than this is reported as a read timeout.
    pub read_timeout_secs: u64,
    /// How long a started reconnect may go unanswered before it counts as failed.
    pub connect_timeout_secs: u64,
}

impl RecoveryConfig {
    /// Base delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Maximum delay as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Stability window as a [`Duration`].
    pub fn stable_reset(&self) -> Duration {
        Duration::from_secs(self.stable_reset_secs)
    }

    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Connect deadline as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// One of the three outbound priority classes, ordered `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityTier {
    /// Latency-critical traffic: movement, attacks, placements.
    High,
    /// Interactive but tolerant traffic.
    Medium,
    /// Bulk or cosmetic traffic.
    Low,
}

impl PriorityTier {
    /// All tiers in drain order.
    pub const ALL: [PriorityTier; 3] = [PriorityTier::High, PriorityTier::Medium, PriorityTier::Low];

    fn rank(self) -> u8 {
        match self {
            PriorityTier::High => 2,
            PriorityTier::Medium => 1,
            PriorityTier::Low => 0,
        }
    }
}

impl PartialOrd for PriorityTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Tier assignment per outbound message category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PriorityConfig {
    /// When off, every category maps to the medium tier, so the dispatch
    /// queue keeps its backpressure but sends in arrival order.
    pub enabled: bool,
    /// Player movement and input.
    pub movement: PriorityTier,
    /// Attacks and hand swings.
    pub attack: PriorityTier,
    /// Block placement.
    pub block_place: PriorityTier,
    /// Entity interaction.
    pub interact: PriorityTier,
    /// Inventory clicks.
    pub inventory: PriorityTier,
    /// Chat messages and commands.
    pub chat: PriorityTier,
    /// Client keep-alive replies.
    pub keep_alive: PriorityTier,
}

/// How aggressively speculative state is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMode {
    /// No predictions are made.
    Off,
    /// Predictions are tracked but only used for visuals.
    Safe,
    /// Predictions also suppress collision and targeting.
    Aggressive,
}

/// Settings for one prediction kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredictionKindConfig {
    /// Whether the module for this kind is active.
    pub enabled: bool,
    /// How long an unconfirmed prediction lives before it expires.
    pub timeout_ms: u64,
}

impl Default for PredictionKindConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 500,
        }
    }
}

/// Optimistic prediction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredictionConfig {
    /// Global prediction mode.
    pub mode: PredictionMode,
    /// End crystal detonation.
    pub crystal: PredictionKindConfig,
    /// Bed explosion.
    pub bed: PredictionKindConfig,
    /// Respawn anchor explosion.
    pub anchor: PredictionKindConfig,
    /// TNT minecart detonation.
    pub tnt_minecart: PredictionKindConfig,
}

impl PredictionConfig {
    /// Look up the settings for a prediction kind tag.
    pub fn kind(&self, tag: &str) -> Option<&PredictionKindConfig> {
        match tag {
            "crystal" => Some(&self.crystal),
            "bed" => Some(&self.bed),
            "anchor" => Some(&self.anchor),
            "tnt_minecart" => Some(&self.tnt_minecart),
            _ => None,
        }
    }
}

/// Network health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Number of round-trip samples kept for statistics.
    pub ping_history_size: usize,
    /// Window used for packet-rate statistics.
    pub stats_window_secs: u64,
}

/// Last-known server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server address, optionally with `:port`.
    pub server_address: String,
    /// Port used when the address carries none.
    pub server_port: u16,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 8,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 1.5,
            jitter_pct: 10,
            stable_reset_secs: 30,
            read_timeout_secs: 45,
            connect_timeout_secs: 15,
        }
    }
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            movement: PriorityTier::High,
            attack: PriorityTier::High,
            block_place: PriorityTier::High,
            interact: PriorityTier::Medium,
            inventory: PriorityTier::Low,
            chat: PriorityTier::Low,
            keep_alive: PriorityTier::Medium,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            mode: PredictionMode::Safe,
            crystal: PredictionKindConfig {
                enabled: true,
                timeout_ms: 500,
            },
            bed: PredictionKindConfig {
                enabled: true,
                timeout_ms: 400,
            },
            anchor: PredictionKindConfig {
                enabled: true,
                timeout_ms: 400,
            },
            tnt_minecart: PredictionKindConfig {
                enabled: true,
                timeout_ms: 500,
            },
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_history_size: 100,
            stats_window_secs: 10,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 25565,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Normalization ---

impl Config {
    /// Return a copy with every numeric knob clamped into its valid range.
    pub fn normalized(mut self) -> Self {
        let r = &mut self.recovery;
        r.max_attempts = r.max_attempts.clamp(1, 50);
        r.base_delay_ms = r.base_delay_ms.clamp(100, 10_000);
        r.max_delay_ms = r.max_delay_ms.clamp(r.base_delay_ms, 120_000);
        r.multiplier = if r.multiplier.is_finite() {
            r.multiplier.clamp(1.0, 5.0)
        } else {
            RecoveryConfig::default().multiplier
        };
        r.jitter_pct = r.jitter_pct.min(50);
        r.stable_reset_secs = r.stable_reset_secs.clamp(5, 300);
        r.read_timeout_secs = r.read_timeout_secs.clamp(10, 180);
        r.connect_timeout_secs = r.connect_timeout_secs.clamp(1, 120);

        let p = &mut self.prediction;
        for kind in [
            &mut p.crystal,
            &mut p.bed,
            &mut p.anchor,
            &mut p.tnt_minecart,
        ] {
            kind.timeout_ms = kind.timeout_ms.clamp(100, 5000);
        }

        let m = &mut self.monitor;
        m.ping_history_size = m.ping_history_size.clamp(10, 1000);
        m.stats_window_secs = m.stats_window_secs.clamp(1, 60);

        self
    }
}

// --- Load / Save / Reload ---

/// Platform configuration directory for this application, if the OS has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }

        let config = read_config(&path)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write this config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .struct_names(false);
        let text = ron::ser::to_string_pretty(self, pretty)?;

        let path = config_dir.join(CONFIG_FILE);
        std::fs::write(&path, text).map_err(|source| ConfigError::Write { path, source })
    }

    /// Re-read the file. `Some` only if the normalized result differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Config file changed, reloading");
        Ok(Some(fresh))
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = ron::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(config.normalized())
}
