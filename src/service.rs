//! One evaluation cycle: fetch radar frames, classify the risk at the user's
//! location, apply the notification policy, deliver and persist.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::frames::filter_recent_frames;
use crate::model::{AlertRecord, EtaBucket, RadarFrame, ReasonCode, RiskLevel};
use crate::policy::{DecisionReason, should_send_alert};
use crate::radar::{RadarClient, lat_lng_to_pixel};
use crate::risk::{RiskDebugView, RiskResult, evaluate_risk_from_frames};
use crate::storage::Storage;
use crate::telegram::TelegramClient;
use crate::timeutil::{QuietHours, to_local};

/// Why a cycle ended before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoRadarFrames,
    NoRecentRadarFrames,
}

/// The user a cycle evaluates for, with overrides already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct UserContext {
    pub lat: f64,
    pub lng: f64,
    pub chat_id: String,
    pub quiet_hours: QuietHours,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskPayload {
    pub level: RiskLevel,
    pub score: u8,
    pub eta_minutes: u32,
    pub eta_bucket: EtaBucket,
    pub rain_now: bool,
    pub confidence: f64,
    pub reasons: Vec<ReasonCode>,
    pub debug: RiskDebugView,
}

impl From<&RiskResult> for RiskPayload {
    fn from(risk: &RiskResult) -> Self {
        Self {
            level: risk.level,
            score: risk.score,
            eta_minutes: risk.eta_minutes,
            eta_bucket: risk.eta_bucket,
            rain_now: risk.rain_now,
            confidence: risk.confidence,
            reasons: risk.reasons.clone(),
            debug: risk.debug_view(),
        }
    }
}

/// Result of [`AlertService::run_cycle`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CycleResponse {
    Skipped {
        ok: bool,
        skipped: bool,
        reason: SkipReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        inspected_candidates: Option<usize>,
    },
    Evaluated {
        ok: bool,
        notify: bool,
        reason: DecisionReason,
        risk: RiskPayload,
        frame_timestamp: String,
    },
}

#[derive(Clone)]
pub struct AlertService {
    config: Config,
    storage: Storage,
    radar: RadarClient,
    telegram: Option<TelegramClient>,
}

impl AlertService {
    pub fn new(config: Config, storage: Storage) -> Self {
        let radar = RadarClient::new(config.radar.clone(), config.tz_offset);
        let telegram = config
            .telegram_bot_token
            .as_deref()
            .map(|token| TelegramClient::with_base_url(&config.telegram_api_base, token));

        Self {
            config,
            storage,
            radar,
            telegram,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Resolve the configured user's profile into a [`UserContext`].
    ///
    /// `TELEGRAM_CHAT_ID` wins over the profile's chat id; profile quiet
    /// hours win over the service defaults.
    pub async fn load_user_context(&self) -> anyhow::Result<UserContext> {
        let user_id = &self.config.user_id;
        let profile = self
            .storage
            .get_profile(user_id)
            .await
            .context("failed to load profile")?
            .ok_or_else(|| anyhow!("Profile missing for {user_id}; seed the profile first"))?;

        if !profile.lat.is_finite() || !profile.lng.is_finite() {
            return Err(anyhow!("Profile missing valid lat/lng"));
        }

        let chat_id = self
            .config
            .telegram_chat_id
            .clone()
            .or(profile.chat_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing Telegram chat id"))?;

        let quiet_start = profile.quiet_start.as_deref().unwrap_or(&self.config.quiet_start);
        let quiet_end = profile.quiet_end.as_deref().unwrap_or(&self.config.quiet_end);
        let quiet_hours = QuietHours::parse(quiet_start, quiet_end)
            .with_context(|| format!("invalid quiet hours {quiet_start}-{quiet_end}"))?;

        Ok(UserContext {
            lat: profile.lat,
            lng: profile.lng,
            chat_id,
            quiet_hours,
        })
    }

    /// Run one evaluation cycle as of `now`.
    ///
    /// Missing radar data ends the cycle early without touching stored
    /// state. A failed delivery aborts the cycle before the state is saved,
    /// so the next cycle retries the same transition.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> anyhow::Result<CycleResponse> {
        let user = self.load_user_context().await?;
        let now_local = to_local(now, self.config.tz_offset);

        let candidates = self.radar.generate_candidates(now);
        let fetched = self.radar.fetch_frames(&candidates).await;
        if fetched.is_empty() {
            warn!(inspected = candidates.len(), "No radar frames available");
            return Ok(CycleResponse::Skipped {
                ok: true,
                skipped: true,
                reason: SkipReason::NoRadarFrames,
                inspected_candidates: Some(candidates.len()),
            });
        }

        let frames = filter_recent_frames(&fetched, self.config.history_window_minutes);
        let Some(newest) = frames.first() else {
            warn!(fetched = fetched.len(), "No radar frames inside the history window");
            return Ok(CycleResponse::Skipped {
                ok: true,
                skipped: true,
                reason: SkipReason::NoRecentRadarFrames,
                inspected_candidates: None,
            });
        };

        let target = self.target_pixel(&user, newest);
        let risk = evaluate_risk_from_frames(&frames, target, &self.config.risk);
        let previous = self.storage.get_alert_state(&self.config.user_id).await?;
        let decision = should_send_alert(
            &risk,
            previous.as_ref(),
            now_local,
            &user.quiet_hours,
            self.config.cooldown_minutes,
        );

        info!(
            level = %risk.level,
            score = risk.score,
            eta_bucket = %risk.eta_bucket,
            frames = frames.len(),
            notify = decision.notify,
            reason = %decision.reason,
            "Risk evaluated"
        );

        if decision.notify {
            let telegram = self
                .telegram
                .as_ref()
                .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is required to send alerts"))?;
            let text = format_alert_message(&risk, &newest.timestamp_token);
            telegram.send_message(&user.chat_id, &text, false).await?;
        }

        let record = AlertRecord {
            state: decision.next_state.clone(),
            updated_at: now,
            last_score: risk.score,
            last_eta_minutes: risk.eta_minutes,
            last_confidence: risk.confidence,
            last_radar_token: newest.timestamp_token.clone(),
            last_eta_slope: risk.debug.motion.slope_px_per_min,
            last_eta_r2: risk.debug.motion.r2,
        };
        self.storage
            .put_alert_record(&self.config.user_id, &record)
            .await?;

        Ok(CycleResponse::Evaluated {
            ok: true,
            notify: decision.notify,
            reason: decision.reason,
            risk: RiskPayload::from(&risk),
            frame_timestamp: newest.timestamp_token.clone(),
        })
    }

    fn target_pixel(&self, user: &UserContext, frame: &RadarFrame) -> (f64, f64) {
        lat_lng_to_pixel(
            user.lat,
            user.lng,
            frame.image.width,
            frame.image.height,
            &self.config.radar.bounds,
        )
    }
}

/// Human-readable alert text sent to the chat.
pub fn format_alert_message(risk: &RiskResult, timestamp_token: &str) -> String {
    let eta_label = if risk.eta_bucket == EtaBucket::Unknown {
        "unknown".to_string()
    } else if risk.eta_minutes == 0 {
        "now".to_string()
    } else {
        format!("~{} min", risk.eta_minutes)
    };
    let confidence_pct = (risk.confidence * 100.0).round() as i64;

    [
        format!("Rain alert: {}", risk.level.as_str().to_uppercase()),
        format!("Likely rain {eta_label}."),
        format!("Confidence: {confidence_pct}%"),
        format!("Radar slot: {timestamp_token}"),
        format!("Signals: {}", risk.reason_labels().join(", ")),
    ]
    .join("\n")
}
