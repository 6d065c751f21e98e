//! Risk classification: turns the per-frame signal series into a leveled
//! risk with an arrival estimate and the reasons behind it.

use serde::Serialize;

use crate::config::RiskParams;
use crate::frames::minutes_series;
use crate::intensity::{nearest_rain_distance, sample_average_intensity};
use crate::model::{EtaBucket, RadarFrame, ReasonCode, RiskLevel};
use crate::motion::{MotionEstimate, MotionInputs, NowSignals, estimate_motion, now_signals};

/// ETA reported when there is no usable arrival estimate.
pub const FALLBACK_ETA_MINUTES: u32 = 30;

const HIGH_ETA_MINUTES: u32 = 10;
const HIGH_MIN_CONFIDENCE: f64 = 0.45;
const MEDIUM_ETA_MINUTES: u32 = 30;
const MEDIUM_MIN_CONFIDENCE: f64 = 0.35;

/// Snapshot of everything the classification was based on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDebug {
    pub now_local: f64,
    pub rain_now: bool,
    pub nearby_signal: bool,
    pub local_series: Vec<f64>,
    /// Nearest-rain distances; infinite entries serialize as `null`.
    pub distance_series_px: Vec<f64>,
    pub minutes_series: Vec<f64>,
    pub motion: MotionEstimate,
}

/// A single evaluation's risk classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskResult {
    pub level: RiskLevel,
    pub score: u8,
    pub eta_minutes: u32,
    pub eta_bucket: EtaBucket,
    pub rain_now: bool,
    pub confidence: f64,
    pub reasons: Vec<ReasonCode>,
    pub debug: RiskDebug,
}

/// Flat view of [`RiskDebug`] used in responses and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDebugView {
    pub now_local: f64,
    pub rain_now: bool,
    pub nearby_signal: bool,
    pub local_series: Vec<f64>,
    pub distance_series_px: Vec<Option<f64>>,
    pub minutes_series: Vec<f64>,
    pub eta_minutes: Option<u32>,
    pub eta_bucket: EtaBucket,
    pub eta_intercept: Option<f64>,
    pub eta_slope: Option<f64>,
    pub eta_r2: Option<f64>,
    pub eta_confidence: f64,
    pub proximity: f64,
    pub valid_points: usize,
    pub valid_ratio: f64,
    pub valid_span_minutes: f64,
    pub valid_approach: bool,
}

impl RiskResult {
    /// The fixed result for a batch with no usable samples.
    pub fn no_signal() -> Self {
        Self {
            level: RiskLevel::Low,
            score: 0,
            eta_minutes: FALLBACK_ETA_MINUTES,
            eta_bucket: EtaBucket::Unknown,
            rain_now: false,
            confidence: 0.0,
            reasons: vec![ReasonCode::NoSignal],
            debug: RiskDebug {
                now_local: 0.0,
                rain_now: false,
                nearby_signal: false,
                local_series: Vec::new(),
                distance_series_px: Vec::new(),
                minutes_series: Vec::new(),
                motion: MotionEstimate::default(),
            },
        }
    }

    pub fn debug_view(&self) -> RiskDebugView {
        let motion = &self.debug.motion;
        RiskDebugView {
            now_local: self.debug.now_local,
            rain_now: self.debug.rain_now,
            nearby_signal: self.debug.nearby_signal,
            local_series: self.debug.local_series.clone(),
            distance_series_px: self
                .debug
                .distance_series_px
                .iter()
                .map(|d| d.is_finite().then_some(*d))
                .collect(),
            minutes_series: self.debug.minutes_series.clone(),
            eta_minutes: motion.eta_minutes,
            eta_bucket: self.eta_bucket,
            eta_intercept: motion.intercept_px,
            eta_slope: motion.slope_px_per_min,
            eta_r2: motion.r2,
            eta_confidence: motion.confidence,
            proximity: motion.proximity,
            valid_points: motion.valid_points,
            valid_ratio: motion.valid_ratio,
            valid_span_minutes: motion.valid_span_minutes,
            valid_approach: motion.valid_approach,
        }
    }

    /// Reason codes as strings, in order.
    pub fn reason_labels(&self) -> Vec<&'static str> {
        self.reasons.iter().map(|r| r.as_str()).collect()
    }
}

/// Classify a risk from aligned, newest-first series.
///
/// Never fails: empty series give [`RiskResult::no_signal`].
pub fn compute_risk_from_signals(
    local_series: &[f64],
    distance_series_px: &[f64],
    minutes_series: &[f64],
    inputs: &MotionInputs,
) -> RiskResult {
    if local_series.is_empty() || distance_series_px.is_empty() {
        return RiskResult::no_signal();
    }

    let now = now_signals(local_series, distance_series_px, inputs);
    let motion = estimate_motion(
        distance_series_px,
        minutes_series,
        now.rain_now,
        inputs.motion_search_radius,
    );

    let (level, eta_minutes, eta_bucket) = classify(&now, &motion);
    let score = score(level, now.now_local, eta_minutes, motion.confidence);
    let reasons = reasons(&now, &motion);

    RiskResult {
        level,
        score,
        eta_minutes,
        eta_bucket,
        rain_now: now.rain_now,
        confidence: motion.confidence,
        reasons,
        debug: RiskDebug {
            now_local: now.now_local,
            rain_now: now.rain_now,
            nearby_signal: now.nearby_signal,
            local_series: local_series.to_vec(),
            distance_series_px: distance_series_px.to_vec(),
            minutes_series: minutes_series.to_vec(),
            motion,
        },
    }
}

fn classify(now: &NowSignals, motion: &MotionEstimate) -> (RiskLevel, u32, EtaBucket) {
    if now.heavy_now {
        return (RiskLevel::High, 0, EtaBucket::Now);
    }
    if now.rain_now {
        return (RiskLevel::Medium, 0, EtaBucket::Now);
    }

    match motion.eta_minutes {
        Some(eta) if eta <= HIGH_ETA_MINUTES && motion.confidence >= HIGH_MIN_CONFIDENCE => {
            (RiskLevel::High, eta, motion.eta_bucket)
        }
        Some(eta) if eta <= MEDIUM_ETA_MINUTES && motion.confidence >= MEDIUM_MIN_CONFIDENCE => {
            (RiskLevel::Medium, eta, motion.eta_bucket)
        }
        None if now.nearby_signal => (RiskLevel::Medium, FALLBACK_ETA_MINUTES, EtaBucket::Unknown),
        _ => (RiskLevel::Low, FALLBACK_ETA_MINUTES, motion.eta_bucket),
    }
}

fn score(level: RiskLevel, now_local: f64, eta_minutes: u32, confidence: f64) -> u8 {
    let base = match level {
        RiskLevel::Low => 20.0,
        RiskLevel::Medium => 55.0,
        RiskLevel::High => 75.0,
    };
    let eta_bonus = match eta_minutes {
        0..=10 => 10.0,
        11..=20 => 5.0,
        _ => 0.0,
    };
    let intensity = now_local.clamp(0.0, 5.0) * 4.0;
    let total = base + intensity + eta_bonus + (confidence * 10.0).round();

    total.round().clamp(0.0, 100.0) as u8
}

fn reasons(now: &NowSignals, motion: &MotionEstimate) -> Vec<ReasonCode> {
    let eta_unknown = motion.eta_minutes.is_none();

    let mut reasons: Vec<ReasonCode> = [
        (now.rain_now, ReasonCode::RainNow),
        (now.heavy_now, ReasonCode::HeavyRainNow),
        (!eta_unknown && !now.rain_now, ReasonCode::EtaEstimated),
        (motion.valid_approach, ReasonCode::ApproachingFast),
        (now.nearby_signal, ReasonCode::NearbyCells),
        (eta_unknown && now.nearby_signal, ReasonCode::EtaUnknownConservative),
    ]
    .into_iter()
    .filter_map(|(applies, code)| applies.then_some(code))
    .collect();

    if reasons.is_empty() {
        reasons.push(ReasonCode::WeakSignal);
    }
    reasons
}

/// Sample every frame at `target_pixel` and classify the result.
///
/// `frames` must be newest first, as returned by
/// [`filter_recent_frames`](crate::frames::filter_recent_frames).
pub fn evaluate_risk_from_frames(
    frames: &[RadarFrame],
    target_pixel: (f64, f64),
    params: &RiskParams,
) -> RiskResult {
    let (x, y) = target_pixel;

    let (local_series, distance_series): (Vec<f64>, Vec<f64>) = frames
        .iter()
        .map(|frame| {
            (
                sample_average_intensity(&frame.image, x, y, params.sample_radius),
                nearest_rain_distance(&frame.image, x, y, params.motion_search_radius),
            )
        })
        .unzip();
    let minutes = minutes_series(frames, params.poll_interval_minutes);

    compute_risk_from_signals(&local_series, &distance_series, &minutes, &params.into())
}

impl From<&RiskParams> for MotionInputs {
    fn from(params: &RiskParams) -> Self {
        MotionInputs {
            motion_search_radius: params.motion_search_radius,
            nearby_distance_px: params.nearby_distance_px,
            rain_now_intensity_threshold: params.rain_now_intensity_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RadarImage;
    use std::sync::Arc;

    fn inputs() -> MotionInputs {
        MotionInputs {
            motion_search_radius: 80,
            nearby_distance_px: 25.0,
            rain_now_intensity_threshold: 0.8,
        }
    }

    fn risk(local: &[f64], distance: &[f64], minutes: &[f64]) -> RiskResult {
        compute_risk_from_signals(local, distance, minutes, &inputs())
    }

    #[test]
    fn test_medium_when_light_rain_is_now() {
        let risk = risk(&[1.0, 0.7, 0.3], &[2.0, 4.0, 8.0], &[0.0, 5.0, 10.0]);

        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.eta_minutes, 0);
        assert_eq!(risk.eta_bucket, EtaBucket::Now);
        assert!(risk.rain_now);
        assert!(risk.reasons.contains(&ReasonCode::RainNow));
        assert!(!risk.reasons.contains(&ReasonCode::EtaEstimated));
    }

    #[test]
    fn test_high_for_strong_local_rain() {
        let risk = risk(&[3.2, 2.5, 2.0], &[0.0, 1.0, 2.0], &[0.0, 5.0, 10.0]);

        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.eta_minutes, 0);
        assert_eq!(risk.eta_bucket, EtaBucket::Now);
        assert_eq!(
            &risk.reasons[..2],
            &[ReasonCode::RainNow, ReasonCode::HeavyRainNow]
        );
    }

    #[test]
    fn test_high_for_fast_approaching_cells_with_good_confidence() {
        let risk = risk(
            &[0.1, 0.1, 0.1, 0.0],
            &[4.0, 10.0, 16.0, 22.0],
            &[0.0, 5.0, 10.0, 15.0],
        );

        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.eta_bucket, EtaBucket::Within5);
        assert!(risk.eta_minutes <= 10);
        assert!(!risk.rain_now);
        assert!(risk.reasons.contains(&ReasonCode::EtaEstimated));
        assert!(risk.reasons.contains(&ReasonCode::ApproachingFast));
        // 75 + 0.4 + 10 + 10
        assert_eq!(risk.score, 95);
    }

    #[test]
    fn test_medium_when_eta_unknown_but_cells_are_nearby() {
        let risk = risk(&[0.2, 0.2, 0.2], &[15.0, 12.0, 10.0], &[0.0, 5.0, 10.0]);

        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.eta_bucket, EtaBucket::Unknown);
        assert_eq!(risk.eta_minutes, FALLBACK_ETA_MINUTES);
        assert_eq!(
            risk.reasons,
            vec![ReasonCode::NearbyCells, ReasonCode::EtaUnknownConservative]
        );
    }

    #[test]
    fn test_low_for_weak_signal_far_from_location() {
        let risk = risk(&[0.0, 0.0, 0.0], &[60.0, 55.0, 50.0], &[0.0, 5.0, 10.0]);

        assert_eq!(risk.level, RiskLevel::Low);
        assert_eq!(risk.eta_bucket, EtaBucket::Unknown);
        assert_eq!(risk.reasons, vec![ReasonCode::WeakSignal]);
    }

    #[test]
    fn test_medium_for_slow_approach() {
        // 20 px away closing at 1 px/min: ETA 20 minutes.
        let risk = risk(&[0.0, 0.0, 0.0], &[20.0, 25.0, 30.0], &[0.0, 5.0, 10.0]);

        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.eta_minutes, 20);
        assert_eq!(risk.eta_bucket, EtaBucket::Within30);
        assert!(risk.reasons.contains(&ReasonCode::EtaEstimated));
    }

    #[test]
    fn test_low_when_eta_is_far_out() {
        let risk = risk(&[0.0, 0.0, 0.0], &[70.0, 71.5, 73.0], &[0.0, 5.0, 10.0]);

        assert_eq!(risk.level, RiskLevel::Low);
        assert_eq!(risk.eta_minutes, FALLBACK_ETA_MINUTES);
        assert_eq!(risk.eta_bucket, EtaBucket::Beyond30);
    }

    #[test]
    fn test_empty_series_is_no_signal() {
        for risk in [
            risk(&[], &[1.0], &[0.0]),
            risk(&[1.0], &[], &[0.0]),
        ] {
            assert_eq!(risk.level, RiskLevel::Low);
            assert_eq!(risk.score, 0);
            assert_eq!(risk.eta_minutes, 30);
            assert_eq!(risk.eta_bucket, EtaBucket::Unknown);
            assert_eq!(risk.reasons, vec![ReasonCode::NoSignal]);
            assert!(risk.debug.local_series.is_empty());
            assert!(risk.debug.distance_series_px.is_empty());
        }
    }

    #[test]
    fn test_rain_now_threshold_dominates() {
        for distances in [[f64::INFINITY; 3], [70.0, 60.0, 50.0], [5.0, 20.0, 40.0]] {
            let risk = risk(&[0.8, 0.0, 0.0], &distances, &[0.0, 5.0, 10.0]);
            assert!(risk.rain_now);
            assert_eq!(risk.eta_minutes, 0);
            assert_eq!(risk.debug.motion.eta_minutes, Some(0));
        }
    }

    #[test]
    fn test_score_rounds_fractional_intensity() {
        let risk = risk(&[0.9; 3], &[10.0; 3], &[0.0, 5.0, 10.0]);

        assert_eq!(risk.level, RiskLevel::Medium);
        assert!((risk.confidence - 0.975).abs() < 1e-9);
        // 55 + 3.6 + 10 + 10
        assert_eq!(risk.score, 79);
    }

    #[test]
    fn test_score_and_level_stay_in_range() {
        let locals = [0.0, 0.5, 0.8, 2.0, 2.5, 4.0, 9.0];
        let distances = [0.0, 2.0, 4.0, 10.0, 24.0, 26.0, 60.0, f64::INFINITY];
        let slopes = [-2.0, 0.0, 0.2, 0.25, 1.0, 5.0];

        for &local in &locals {
            for &d in &distances {
                for &slope in &slopes {
                    let series = [d, d + slope * 5.0, d + slope * 10.0, d + slope * 15.0];
                    let risk = risk(&[local; 4], &series, &[0.0, 5.0, 10.0, 15.0]);

                    assert!(risk.score <= 100);
                    assert!((0.0..=1.0).contains(&risk.confidence));
                    if local >= 2.5 {
                        assert_eq!(risk.level, RiskLevel::High);
                    }
                    if risk.level == RiskLevel::Low {
                        assert!(!risk.rain_now);
                    }
                    assert!(!risk.reasons.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_debug_view_keeps_expected_keys() {
        let risk = risk(
            &[0.1, 0.1, 0.1, 0.0],
            &[4.0, 10.0, 16.0, 22.0],
            &[0.0, 5.0, 10.0, 15.0],
        );

        let debug = serde_json::to_value(risk.debug_view()).unwrap();
        for key in [
            "distance_series_px",
            "minutes_series",
            "eta_slope",
            "eta_r2",
            "eta_bucket",
        ] {
            assert!(debug.get(key).is_some(), "missing {key}");
        }
        assert_eq!(debug["eta_bucket"], risk.eta_bucket.as_str());
    }

    #[test]
    fn test_debug_view_maps_infinite_distance_to_null() {
        let risk = risk(&[0.0, 0.0], &[f64::INFINITY, 12.0], &[0.0, 5.0]);
        let debug = serde_json::to_value(risk.debug_view()).unwrap();
        assert!(debug["distance_series_px"][0].is_null());
        assert_eq!(debug["distance_series_px"][1], 12.0);
    }

    #[test]
    fn test_evaluate_from_frames() {
        let heavy = [255, 0, 0, 255];
        let clear = [0, 0, 0, 0];

        let mut newest = RadarImage::filled(100, 100, clear);
        let mut older = RadarImage::filled(100, 100, clear);
        for y in 0..100 {
            newest.set_pixel(55, y, heavy);
            older.set_pixel(65, y, heavy);
        }
        let frame = |index: usize, token: &str, image: RadarImage| RadarFrame {
            index,
            timestamp_token: token.to_string(),
            url: String::new(),
            content_hash: String::new(),
            image: Arc::new(image),
        };
        let mut oldest = RadarImage::filled(100, 100, clear);
        for y in 0..100 {
            oldest.set_pixel(75, y, heavy);
        }
        let frames = vec![
            frame(0, "202602161500", newest),
            frame(1, "202602161455", older),
            frame(2, "202602161450", oldest),
        ];

        let risk = evaluate_risk_from_frames(&frames, (50.0, 50.0), &RiskParams::default());

        assert_eq!(risk.debug.distance_series_px, vec![5.0, 15.0, 25.0]);
        assert_eq!(risk.debug.minutes_series, vec![0.0, 5.0, 10.0]);
        assert_eq!(risk.debug.local_series, vec![0.0, 0.0, 0.0]);
        // A line of rain 5 px away closing at 2 px/min
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.eta_minutes, 3);
        assert_eq!(risk.eta_bucket, EtaBucket::Within5);
    }
}
