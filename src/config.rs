use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "SONAR_CAR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to deserialize config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub sim: Sim,
    pub agent: Agent,
    pub obstacles: Obstacles,
    pub decoys: Decoys,
    pub viewer: Viewer,
    pub driver: Driver,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Penalty ticks run inside `step`.
    Blocking,
    /// `step` returns right after the reset; the driver runs the penalty ticks.
    Deferred,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Sim {
    pub width: f32,
    pub height: f32,
    pub timestep: f32,
    /// Fraction of velocity kept after one simulated second.
    pub damping: f32,
    /// `None` seeds from entropy.
    pub seed: Option<u64>,
    pub recovery: RecoveryMode,
    pub penalty_ticks: u32,
    pub obstacle_period: u64,
    pub decoy_period: u64,
}

impl Default for Sim {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 700.0,
            timestep: 0.1,
            damping: 0.8,
            seed: None,
            recovery: RecoveryMode::Blocking,
            penalty_ticks: 10,
            obstacle_period: 100,
            decoy_period: 5,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Agent {
    pub spawn: [f32; 2],
    pub heading: f32,
    pub radius: f32,
    pub mass: f32,
    pub turn: f32,
    pub impulse: f32,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            spawn: [100.0, 100.0],
            heading: 0.5,
            radius: 25.0,
            mass: 50.0,
            turn: 0.2,
            impulse: 200.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Obstacles {
    pub bodies: Vec<Circle>,
    pub mass: f32,
    pub min_speed: u32,
    pub max_speed: u32,
    /// Max whole radians the drift direction strays from the agent heading.
    pub spread: i32,
}

impl Default for Obstacles {
    fn default() -> Self {
        Self {
            bodies: vec![
                Circle {
                    x: 200.0,
                    y: 350.0,
                    radius: 100.0,
                },
                Circle {
                    x: 700.0,
                    y: 200.0,
                    radius: 125.0,
                },
                Circle {
                    x: 600.0,
                    y: 600.0,
                    radius: 35.0,
                },
            ],
            mass: 1000.0,
            min_speed: 1,
            max_speed: 5,
            spread: 2,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Decoys {
    pub positions: Vec<[f32; 2]>,
    pub radius: f32,
    pub mass: f32,
    pub impulse: f32,
}

impl Default for Decoys {
    fn default() -> Self {
        Self {
            positions: vec![[300.0, 400.0], [400.0, 300.0], [150.0, 150.0]],
            radius: 30.0,
            mass: 30.0,
            impulse: 500.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Viewer {
    pub target_fps: u32,
    pub steps_per_frame: u32,
    pub show_sensors: bool,
    pub draw_screen: bool,
}

impl Default for Viewer {
    fn default() -> Self {
        Self {
            target_fps: 60,
            steps_per_frame: 1,
            show_sensors: true,
            draw_screen: true,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Keyboard,
    Random,
    Network,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Driver {
    pub policy: PolicyKind,
    pub hidden_size: usize,
    pub epsilon: f32,
    pub report_every: u64,
    pub reward_window: usize,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Random,
            hidden_size: 32,
            epsilon: 0.0,
            report_every: 1000,
            reward_window: 128,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        log::debug!("Loaded config: {:#?}", config);
        Ok(config)
    }

    /// Path from `SONAR_CAR_CONFIG`, else `config.toml` in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };
        let sim = &self.sim;
        if !(sim.width > 0.0 && sim.height > 0.0) {
            return invalid(format!("arena must be positive, got {}x{}", sim.width, sim.height));
        }
        if !(sim.timestep > 0.0) {
            return invalid(format!("timestep must be positive, got {}", sim.timestep));
        }
        if !(sim.damping > 0.0 && sim.damping <= 1.0) {
            return invalid(format!("damping must be in (0, 1], got {}", sim.damping));
        }
        if sim.obstacle_period == 0 || sim.decoy_period == 0 {
            return invalid("perturbation periods must be non-zero".to_string());
        }
        let [x, y] = self.agent.spawn;
        if x <= 0.0 || y <= 0.0 || x >= sim.width || y >= sim.height {
            return invalid(format!("spawn ({x}, {y}) is outside the arena"));
        }
        if !(self.agent.radius > 0.0 && self.agent.mass > 0.0) {
            return invalid("agent radius and mass must be positive".to_string());
        }
        if self.obstacles.bodies.iter().any(|c| !(c.radius > 0.0)) || !(self.decoys.radius > 0.0)
        {
            return invalid("body radii must be positive".to_string());
        }
        if self.obstacles.min_speed > self.obstacles.max_speed {
            return invalid(format!(
                "obstacle speed range {}..={} is empty",
                self.obstacles.min_speed, self.obstacles.max_speed
            ));
        }
        if self.obstacles.spread < 0 {
            return invalid(format!("obstacle spread must be >= 0, got {}", self.obstacles.spread));
        }
        Ok(())
    }
}

/// Watches a config file and keeps the latest successfully parsed copy.
///
/// The notify callback runs on its own thread; the driver polls with [`ConfigWatcher::latest`].
pub struct ConfigWatcher {
    current: Arc<Mutex<Config>>,
    updated: Arc<AtomicBool>,
    _watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(path: impl AsRef<Path>, initial: Config) -> notify::Result<Self> {
        use notify::{RecursiveMode::NonRecursive, Watcher};

        let path = path.as_ref().to_path_buf();
        let current = Arc::new(Mutex::new(initial));
        let updated = Arc::new(AtomicBool::new(false));

        let watched = path.clone();
        let shared = Arc::clone(&current);
        let flag = Arc::clone(&updated);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(_) => match Config::load(&watched) {
                    Ok(config) => {
                        log::info!("Loaded new config");
                        if let Ok(mut slot) = shared.lock() {
                            *slot = config;
                        }
                        flag.store(true, Ordering::Release);
                    }
                    Err(e) => log::warn!("Ignoring config change: {}", e),
                },
                Err(e) => log::warn!("Failed to watch config file: {:?}", e),
            }
        })?;
        watcher.watch(&path, NonRecursive)?;

        Ok(Self {
            current,
            updated,
            _watcher: watcher,
        })
    }

    /// Returns the new config if the file changed since the last call.
    pub fn latest(&self) -> Option<Config> {
        if !self.updated.swap(false, Ordering::AcqRel) {
            return None;
        }
        self.current.lock().ok().map(|config| config.clone())
    }
}
