//! Service configuration loaded from environment variables.
//!
//! Every setting has a default except the Telegram bot token, which is
//! required whenever the service may send messages.

use std::env;
use std::str::FromStr;

use chrono::FixedOffset;

use crate::timeutil::{QuietHours, SINGAPORE_OFFSET_MINUTES, offset_from_minutes};

/// Default SQLite database if `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:rain_radar.db?mode=rwc";

/// Default HTTP port if `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3000;

const DEFAULT_RADAR_BASE_URL: &str = "https://www.weather.gov.sg/files/rainarea/50km/v2";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Largest accepted sampling or search radius, in pixels.
const MAX_RADIUS_PX: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0} environment variable")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid radar bounds: min must be lower than max")]
    InvalidBounds,
}

/// Geographic rectangle covered by the radar image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// Tunables for turning frames into a risk result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    /// Radius (px) of the disc averaged for local intensity.
    pub sample_radius: u32,
    /// Radius (px) searched for the nearest rain pixel.
    pub motion_search_radius: u32,
    /// Nearest-rain distance (px) at or below which cells count as nearby.
    pub nearby_distance_px: f64,
    /// Local intensity at or above which it is raining now.
    pub rain_now_intensity_threshold: f64,
    /// Nominal spacing between radar slots.
    pub poll_interval_minutes: u32,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            sample_radius: 4,
            motion_search_radius: 80,
            nearby_distance_px: 25.0,
            rain_now_intensity_threshold: 0.8,
            poll_interval_minutes: 5,
        }
    }
}

/// Where and how radar frames are downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarSource {
    pub base_url: String,
    pub prefix: String,
    pub suffix: String,
    pub frame_count: u32,
    pub poll_interval_minutes: u32,
    pub bounds: RadarBounds,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub user_id: String,
    pub tz_offset: FixedOffset,
    pub cooldown_minutes: i64,
    pub history_window_minutes: i64,
    pub quiet_start: String,
    pub quiet_end: String,
    pub risk: RiskParams,
    pub radar: RadarSource,
    pub telegram_api_base: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env(require_telegram_token: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok(), require_telegram_token)
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F, require_telegram_token: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let text = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN");
        if require_telegram_token && telegram_bot_token.is_none() {
            return Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN"));
        }

        let poll_interval_minutes = number(&get, "POLL_INTERVAL_MINUTES", 5u32)?;
        let offset_minutes = number(&get, "TZ_OFFSET_MINUTES", SINGAPORE_OFFSET_MINUTES)?;
        let tz_offset = offset_from_minutes(offset_minutes).map_err(|_| ConfigError::Invalid {
            name: "TZ_OFFSET_MINUTES",
            value: offset_minutes.to_string(),
        })?;

        let bounds = RadarBounds {
            min_lat: number(&get, "RADAR_MIN_LAT", 1.163)?,
            max_lat: number(&get, "RADAR_MAX_LAT", 1.493)?,
            min_lng: number(&get, "RADAR_MIN_LNG", 103.577)?,
            max_lng: number(&get, "RADAR_MAX_LNG", 104.077)?,
        };
        if bounds.min_lat >= bounds.max_lat || bounds.min_lng >= bounds.max_lng {
            return Err(ConfigError::InvalidBounds);
        }

        let config = Config {
            database_url: text("DATABASE_URL", DEFAULT_DATABASE_URL),
            port: number(&get, "PORT", DEFAULT_PORT)?,
            user_id: text("USER_ID", "me"),
            tz_offset,
            cooldown_minutes: number(&get, "COOLDOWN_MINUTES", 30)?,
            history_window_minutes: number(&get, "HISTORY_WINDOW_MINUTES", 30)?,
            quiet_start: text("QUIET_START", "23:00"),
            quiet_end: text("QUIET_END", "07:00"),
            risk: RiskParams {
                sample_radius: radius(&get, "SAMPLE_RADIUS", 4)?,
                motion_search_radius: radius(&get, "MOTION_SEARCH_RADIUS", 80)?,
                nearby_distance_px: number(&get, "NEARBY_DISTANCE_PX", 25.0)?,
                rain_now_intensity_threshold: number(&get, "RAIN_NOW_INTENSITY_THRESHOLD", 0.8)?,
                poll_interval_minutes,
            },
            radar: RadarSource {
                base_url: text("RADAR_BASE_URL", DEFAULT_RADAR_BASE_URL),
                prefix: text("RADAR_PREFIX", "dpsri_70km_"),
                suffix: text("RADAR_SUFFIX", "0000dBR.dpsri.png"),
                frame_count: number(&get, "FRAME_COUNT", 7)?,
                poll_interval_minutes,
                bounds,
            },
            telegram_api_base: text("TELEGRAM_API_BASE", DEFAULT_TELEGRAM_API_BASE),
            telegram_bot_token,
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
        };

        // Fail at startup rather than on the first evaluation.
        config.default_quiet_hours()?;

        Ok(config)
    }

    /// Quiet hours from the service-level defaults.
    pub fn default_quiet_hours(&self) -> Result<QuietHours, ConfigError> {
        QuietHours::parse(&self.quiet_start, &self.quiet_end).map_err(|_| ConfigError::Invalid {
            name: "QUIET_START/QUIET_END",
            value: format!("{}-{}", self.quiet_start, self.quiet_end),
        })
    }
}

fn number<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn radius<G>(get: &G, name: &'static str, default: u32) -> Result<u32, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = number(get, name, default)?;
    if value > MAX_RADIUS_PX {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}
