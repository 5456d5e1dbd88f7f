//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Highest tick rate whose period is still a whole microsecond
const MAX_FPS: u32 = 1_000_000;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines (LOG_FORMAT=json)
    pub log_json: bool,
    /// Bearer key guarding the match control routes. Control routes are not
    /// mounted when unset.
    pub internal_api_key: Option<String>,
    /// Simulation tuning shared by every match
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            log_json: env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            internal_api_key: env::var("INTERNAL_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),

            game: GameConfig::from_env()?,
        })
    }
}

/// How the ball is launched when a countdown expires
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaunchAngle {
    /// Uniform angle in [0, 2π) drawn from the match RNG
    Random,
    /// Fixed angle in radians
    Fixed(f64),
}

impl FromStr for LaunchAngle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("random") {
            return Ok(Self::Random);
        }
        s.parse::<f64>()
            .ok()
            .filter(|angle| angle.is_finite())
            .map(Self::Fixed)
            .ok_or(ConfigError::Invalid {
                name: "LAUNCH_ANGLE",
                value: s.to_string(),
            })
    }
}

/// Simulation tuning for a match
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Ticks per second
    pub fps: u32,
    /// Half the paddle length, as a fraction of a seat
    pub paddle_half_width: f64,
    /// Constant ball speed while playing (arena units per second)
    pub ball_speed: f64,
    /// Two-player arena: distance from centre to the top/bottom walls
    pub field_half_height: f64,
    /// Two-player arena: distance from centre to each paddle line
    pub field_half_width: f64,
    /// Two-player arena: how far past the paddle line the goal line sits
    pub goal_line_offset: f64,
    /// Countdown before each serve
    pub countdown_secs: f64,
    pub launch_angle: LaunchAngle,
    /// Minimum interval between two accepted moves of the same player
    pub input_rate_limit_ms: u64,
    /// Scale applied to relative paddle deltas
    pub mouse_sensitivity: f64,
    /// Fraction of paddle drag velocity added to the ball on a hit
    pub spin_factor: f64,
    /// Outgoing directions closer than this (radians) to an arena vertex get nudged
    pub vertex_avoid_angle: f64,
    /// Distance the ball is pushed off a wall or paddle after contact
    pub contact_nudge: f64,
    /// Seed for the per-match RNG. Random per match when unset.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            paddle_half_width: 0.1,
            ball_speed: 0.5,
            field_half_height: 0.5,
            field_half_width: 1.0,
            goal_line_offset: 0.02,
            countdown_secs: 5.0,
            launch_angle: LaunchAngle::Random,
            input_rate_limit_ms: 16,
            mouse_sensitivity: 0.001,
            spin_factor: 0.25,
            vertex_avoid_angle: 0.05,
            contact_nudge: 0.005,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Load tuning overrides from the environment, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            fps: env_or("GAME_FPS", defaults.fps)?,
            paddle_half_width: env_or("PADDLE_HALF_WIDTH", defaults.paddle_half_width)?,
            ball_speed: env_or("BALL_SPEED", defaults.ball_speed)?,
            field_half_height: env_or("FIELD_HALF_HEIGHT", defaults.field_half_height)?,
            field_half_width: env_or("FIELD_HALF_WIDTH", defaults.field_half_width)?,
            goal_line_offset: env_or("GOAL_LINE_OFFSET", defaults.goal_line_offset)?,
            countdown_secs: env_or("COUNTDOWN_SECS", defaults.countdown_secs)?,
            launch_angle: env_or("LAUNCH_ANGLE", defaults.launch_angle)?,
            input_rate_limit_ms: env_or("INPUT_RATE_LIMIT_MS", defaults.input_rate_limit_ms)?,
            mouse_sensitivity: env_or("MOUSE_SENSITIVITY", defaults.mouse_sensitivity)?,
            spin_factor: env_or("SPIN_FACTOR", defaults.spin_factor)?,
            vertex_avoid_angle: env_or("VERTEX_AVOID_ANGLE", defaults.vertex_avoid_angle)?,
            contact_nudge: defaults.contact_nudge,
            seed: match env::var("GAME_SEED") {
                Ok(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "GAME_SEED",
                    value: raw,
                })?),
                Err(_) => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject tuning the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(ConfigError::Tuning("fps must be in 1..=1000000"));
        }
        if !(self.paddle_half_width > 0.0 && self.paddle_half_width < 0.5) {
            return Err(ConfigError::Tuning("paddle half-width must be in (0, 0.5)"));
        }
        if !(self.ball_speed.is_finite() && self.ball_speed > 0.0) {
            return Err(ConfigError::Tuning("ball speed must be positive"));
        }
        if !(self.field_half_height.is_finite()
            && self.field_half_width.is_finite()
            && self.field_half_height > 0.0
            && self.field_half_width > 0.0)
        {
            return Err(ConfigError::Tuning("field dimensions must be positive"));
        }
        if !(non_negative(self.goal_line_offset) && non_negative(self.countdown_secs)) {
            return Err(ConfigError::Tuning(
                "goal line offset and countdown must not be negative",
            ));
        }
        if !(self.mouse_sensitivity.is_finite() && self.spin_factor.is_finite()) {
            return Err(ConfigError::Tuning("mouse sensitivity and spin factor must be finite"));
        }
        if !(non_negative(self.vertex_avoid_angle) && non_negative(self.contact_nudge)) {
            return Err(ConfigError::Tuning(
                "vertex avoid angle and contact nudge must not be negative",
            ));
        }
        if let LaunchAngle::Fixed(angle) = self.launch_angle {
            if !angle.is_finite() {
                return Err(ConfigError::Tuning("launch angle must be finite"));
            }
        }
        Ok(())
    }

    /// Seconds per tick
    pub fn tick_delta(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// Wall-clock period of one tick
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.fps.max(1) as u64)
    }

    /// Number of ticks a full countdown lasts
    pub fn countdown_ticks(&self) -> u32 {
        (self.countdown_secs * self.fps as f64 - 1e-9).ceil().max(0.0) as u32
    }

    /// Two-player goal line distance from the centre
    pub fn goal_x(&self) -> f64 {
        self.field_half_width + self.goal_line_offset
    }

    /// Valid range for a paddle centre along its seat
    pub fn position_bounds(&self) -> (f64, f64) {
        (self.paddle_half_width, 1.0 - self.paddle_half_width)
    }
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid game tuning: {0}")]
    Tuning(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
