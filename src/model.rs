//! Data models shared across the rain radar service.
//!
//! These types describe radar frames as they come off the wire, the coarse
//! categories the risk model reports in, and the records persisted per user.
//! Everything derived from a single evaluation (motion estimates, risk
//! results, alert decisions) lives next to the code that computes it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Rain risk level reported by the classifier.
///
/// The derived ordering is the notification ordering: `Low < Medium < High`.
/// A user with no previous evaluation is represented by `Option::None`, which
/// sorts below every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Nothing worth telling the user about.
    Low,
    /// Light rain now, or rain expected within the next half hour.
    Medium,
    /// Heavy rain now, or rain expected within minutes.
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// Label for an optional level, `"none"` when absent.
    pub fn label(level: Option<RiskLevel>) -> &'static str {
        level.map_or("none", |l| l.as_str())
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Coarse estimated-time-of-arrival category.
///
/// Variants are declared from tightest to loosest so the derived ordering
/// can be used directly for "is the ETA getting tighter" comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EtaBucket {
    /// Raining at the target point right now.
    #[serde(rename = "now")]
    Now,
    /// Arrival in 1 to 5 minutes.
    #[serde(rename = "5_1")]
    Within5,
    /// Arrival in 6 to 15 minutes.
    #[serde(rename = "15_6")]
    Within15,
    /// Arrival in 16 to 30 minutes.
    #[serde(rename = "30_16")]
    Within30,
    /// Arrival more than 30 minutes out.
    #[serde(rename = "30_plus")]
    Beyond30,
    /// No usable arrival estimate.
    #[serde(rename = "unknown")]
    Unknown,
}

impl EtaBucket {
    /// Bucket an ETA in minutes. `None` maps to [`EtaBucket::Unknown`].
    pub fn from_eta(eta_minutes: Option<u32>) -> Self {
        match eta_minutes {
            None => EtaBucket::Unknown,
            Some(0) => EtaBucket::Now,
            Some(1..=5) => EtaBucket::Within5,
            Some(6..=15) => EtaBucket::Within15,
            Some(16..=30) => EtaBucket::Within30,
            Some(_) => EtaBucket::Beyond30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EtaBucket::Now => "now",
            EtaBucket::Within5 => "5_1",
            EtaBucket::Within15 => "15_6",
            EtaBucket::Within30 => "30_16",
            EtaBucket::Beyond30 => "30_plus",
            EtaBucket::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EtaBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EtaBucket {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "now" => Ok(EtaBucket::Now),
            "5_1" => Ok(EtaBucket::Within5),
            "15_6" => Ok(EtaBucket::Within15),
            "30_16" => Ok(EtaBucket::Within30),
            "30_plus" => Ok(EtaBucket::Beyond30),
            "unknown" => Ok(EtaBucket::Unknown),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a stored string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// Reason codes attached to a risk result, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    RainNow,
    HeavyRainNow,
    EtaEstimated,
    ApproachingFast,
    NearbyCells,
    EtaUnknownConservative,
    WeakSignal,
    NoSignal,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::RainNow => "rain_now",
            ReasonCode::HeavyRainNow => "heavy_rain_now",
            ReasonCode::EtaEstimated => "eta_estimated",
            ReasonCode::ApproachingFast => "approaching_fast",
            ReasonCode::NearbyCells => "nearby_cells",
            ReasonCode::EtaUnknownConservative => "eta_unknown_conservative",
            ReasonCode::WeakSignal => "weak_signal",
            ReasonCode::NoSignal => "no_signal",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded radar image: `width * height` RGBA8 pixels, row major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RadarImage {
    /// An image filled with a single color.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let rgba = color.iter().copied().cycle().take(pixels * 4).collect();
        Self {
            width,
            height,
            rgba,
        }
    }

    /// RGBA value at `(x, y)`. Callers clamp coordinates to the image first.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.rgba[idx],
            self.rgba[idx + 1],
            self.rgba[idx + 2],
            self.rgba[idx + 3],
        ]
    }

    /// Overwrite the pixel at `(x, y)`.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        self.rgba[idx..idx + 4].copy_from_slice(&color);
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A fetched and decoded radar frame.
///
/// Frames are immutable once fetched. The image is shared so that frame
/// selection can reorder and clone frames without copying pixel buffers.
#[derive(Debug, Clone)]
pub struct RadarFrame {
    /// Position of the slot this frame was requested for (0 = newest slot).
    pub index: usize,

    /// Radar slot in local time, formatted `YYYYMMDDHHMM`.
    pub timestamp_token: String,

    /// Where the frame was downloaded from.
    pub url: String,

    /// Short fingerprint of the PNG payload.
    pub content_hash: String,

    /// Decoded pixels.
    pub image: Arc<RadarImage>,
}

/// A monitored user's profile.
///
/// Profiles are written by the seeding tool or `PUT /profile` and read at
/// the start of every evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Latitude of the point being watched.
    pub lat: f64,

    /// Longitude of the point being watched.
    pub lng: f64,

    /// Telegram chat to deliver alerts to.
    pub chat_id: Option<String>,

    /// Free-form alert style label, `"balanced"` by default.
    pub alert_style: String,

    /// Per-user quiet hours start (`HH:MM`), overriding the service default.
    pub quiet_start: Option<String>,

    /// Per-user quiet hours end (`HH:MM`), overriding the service default.
    pub quiet_end: Option<String>,

    pub enabled: bool,

    pub updated_at: DateTime<Utc>,
}

/// Request body for `PUT /profile`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub lat: f64,
    pub lng: f64,
    pub chat_id: Option<String>,
    #[serde(default = "default_alert_style")]
    pub alert_style: String,
    pub quiet_start: Option<String>,
    pub quiet_end: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_alert_style() -> String {
    "balanced".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Alert state consulted by the notification policy.
///
/// `last_level == None` means the user has never been evaluated (the
/// baseline level `none`). A missing `last_eta_bucket` is treated as
/// [`EtaBucket::Unknown`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    #[serde(default)]
    pub last_level: Option<RiskLevel>,

    #[serde(default)]
    pub last_eta_bucket: Option<EtaBucket>,

    #[serde(default)]
    pub last_signal_hash: Option<String>,

    /// When the last notification was actually delivered.
    #[serde(default)]
    pub last_sent_at: Option<DateTime<FixedOffset>>,
}

/// Everything persisted after an evaluation: the policy state plus
/// diagnostics about the risk that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(flatten)]
    pub state: AlertState,

    pub updated_at: DateTime<Utc>,

    pub last_score: u8,

    pub last_eta_minutes: u32,

    pub last_confidence: f64,

    /// Timestamp token of the newest frame the evaluation used.
    pub last_radar_token: String,

    pub last_eta_slope: Option<f64>,

    pub last_eta_r2: Option<f64>,
}
