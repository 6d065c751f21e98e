//! Notification policy: decides whether a fresh risk classification is worth
//! a message, given the state left behind by the previous evaluation.
//!
//! Rules, first match wins:
//!
//! 1. below `medium` never notifies
//! 2. quiet hours suppress everything except `high`
//! 3. only an upward level change, or a tighter ETA bucket at the same
//!    level, can notify
//! 4. an identical signal hash inside the cooldown is a duplicate
//!
//! Every decision carries the state to persist, so the stored state always
//! reflects the latest evaluation even when nothing is sent.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::model::{AlertState, EtaBucket, RiskLevel};
use crate::risk::RiskResult;
use crate::timeutil::{QuietHours, minutes_between};

/// The parts of a risk classification the policy looks at.
pub trait RiskSignal {
    fn level(&self) -> RiskLevel;
    fn score(&self) -> u8;
    fn eta_bucket(&self) -> EtaBucket;
}

impl RiskSignal for RiskResult {
    fn level(&self) -> RiskLevel {
        self.level
    }

    fn score(&self) -> u8 {
        self.score
    }

    fn eta_bucket(&self) -> EtaBucket {
        self.eta_bucket
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    BelowNotificationLevel,
    QuietHours,
    NotUpwardOrEtaTightening,
    DuplicateWithinCooldown,
    UpwardTransition,
    EtaTightening,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::BelowNotificationLevel => "below_notification_level",
            DecisionReason::QuietHours => "quiet_hours",
            DecisionReason::NotUpwardOrEtaTightening => "not_upward_or_eta_tightening",
            DecisionReason::DuplicateWithinCooldown => "duplicate_within_cooldown",
            DecisionReason::UpwardTransition => "upward_transition",
            DecisionReason::EtaTightening => "eta_tightening",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDecision {
    pub notify: bool,
    pub reason: DecisionReason,
    pub signal_hash: String,
    pub next_state: AlertState,
}

/// Fingerprint of a notification: `level:score/10:eta_bucket`.
pub fn signal_hash(level: RiskLevel, score: u8, eta_bucket: EtaBucket) -> String {
    format!("{}:{}:{}", level, score / 10, eta_bucket)
}

/// Decide whether to notify.
///
/// `now` must be in the local offset quiet hours are expressed in. A missing
/// `previous` state is the baseline: level `none`, bucket `unknown`.
/// `last_sent_at` only moves on a notify and is carried over otherwise.
pub fn should_send_alert<R: RiskSignal>(
    risk: &R,
    previous: Option<&AlertState>,
    now: DateTime<FixedOffset>,
    quiet_hours: &QuietHours,
    cooldown_minutes: i64,
) -> AlertDecision {
    let baseline = AlertState::default();
    let previous = previous.unwrap_or(&baseline);

    let level = risk.level();
    let eta_bucket = risk.eta_bucket();
    let hash = signal_hash(level, risk.score(), eta_bucket);

    let decide = |notify: bool, reason: DecisionReason| AlertDecision {
        notify,
        reason,
        signal_hash: hash.clone(),
        next_state: AlertState {
            last_level: Some(level),
            last_eta_bucket: Some(eta_bucket),
            last_signal_hash: Some(hash.clone()),
            last_sent_at: if notify { Some(now) } else { previous.last_sent_at },
        },
    };

    if level < RiskLevel::Medium {
        return decide(false, DecisionReason::BelowNotificationLevel);
    }

    if quiet_hours.contains(now) && level != RiskLevel::High {
        return decide(false, DecisionReason::QuietHours);
    }

    let previous_level = previous.last_level;
    let previous_bucket = previous.last_eta_bucket.unwrap_or(EtaBucket::Unknown);
    let upward = Some(level) > previous_level;
    let eta_tightening = Some(level) == previous_level && eta_bucket < previous_bucket;

    if !upward && !eta_tightening {
        return decide(false, DecisionReason::NotUpwardOrEtaTightening);
    }

    if previous.last_signal_hash.as_deref() == Some(hash.as_str()) {
        let since = minutes_between(previous.last_sent_at, now);
        if since < cooldown_minutes as f64 {
            return decide(false, DecisionReason::DuplicateWithinCooldown);
        }
    }

    if upward {
        decide(true, DecisionReason::UpwardTransition)
    } else {
        decide(true, DecisionReason::EtaTightening)
    }
}
