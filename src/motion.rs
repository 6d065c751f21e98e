//! Motion estimation from the nearest-rain distance series.
//!
//! The x-axis of the fit is "minutes before the newest frame", growing into
//! the past. A rain edge that is closing in was further away in older frames,
//! so distance grows with minutes-ago and the fitted slope is positive. The
//! intercept is the fitted distance at the newest frame, and the time until
//! the distance reaches zero going forward is `intercept / slope`.

use serde::Serialize;

use crate::model::EtaBucket;

/// Distance (px) at or below which the target pixel counts as wet.
pub const RAIN_NOW_DISTANCE_PX: f64 = 3.0;

/// Local intensity at or above which rain counts as heavy.
pub const HEAVY_INTENSITY: f64 = 2.5;

/// Minimum slope (px/min) for a trend to count as an approach.
pub const MIN_APPROACH_SLOPE: f64 = 0.25;

const MIN_REGRESSION_POINTS: usize = 3;
const MIN_REGRESSION_SPAN_MINUTES: f64 = 10.0;
const MIN_ETA_MINUTES: f64 = 1.0;
const MAX_ETA_MINUTES: f64 = 60.0;

/// Thresholds the estimator needs beyond the series themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionInputs {
    pub motion_search_radius: u32,
    pub nearby_distance_px: f64,
    pub rain_now_intensity_threshold: f64,
}

/// Instantaneous conditions read off the newest frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NowSignals {
    pub now_local: f64,
    pub rain_now: bool,
    pub heavy_now: bool,
    pub nearby_signal: bool,
}

/// Result of fitting the distance trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionEstimate {
    /// Minutes until rain reaches the target, 0 when it is already raining.
    pub eta_minutes: Option<u32>,
    pub eta_bucket: EtaBucket,
    pub intercept_px: Option<f64>,
    pub slope_px_per_min: Option<f64>,
    pub r2: Option<f64>,
    pub confidence: f64,
    pub proximity: f64,
    pub valid_ratio: f64,
    pub valid_points: usize,
    pub valid_span_minutes: f64,
    pub valid_approach: bool,
}

impl Default for MotionEstimate {
    fn default() -> Self {
        Self {
            eta_minutes: None,
            eta_bucket: EtaBucket::Unknown,
            intercept_px: None,
            slope_px_per_min: None,
            r2: None,
            confidence: 0.0,
            proximity: 0.0,
            valid_ratio: 0.0,
            valid_points: 0,
            valid_span_minutes: 0.0,
            valid_approach: false,
        }
    }
}

/// Ordinary least squares fit of `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub r2: f64,
}

/// Fit a line through `points`.
///
/// Returns `None` for fewer than two points or when every x is the same.
/// When every y is the same the fit is exact and `r2` is 1.0.
pub fn linear_fit(points: &[(f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let sst: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    let r2 = if sst == 0.0 {
        1.0
    } else {
        let sse: f64 = points
            .iter()
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        (1.0 - sse / sst).clamp(0.0, 1.0)
    };

    Some(LinearFit {
        intercept,
        slope,
        r2,
    })
}

/// Read the newest-frame signals. Both series must be non-empty.
pub fn now_signals(local: &[f64], distance: &[f64], inputs: &MotionInputs) -> NowSignals {
    let now_local = local.first().copied().unwrap_or(0.0);
    let now_distance = distance.first().copied().unwrap_or(f64::INFINITY);

    NowSignals {
        now_local,
        rain_now: now_local >= inputs.rain_now_intensity_threshold
            || now_distance <= RAIN_NOW_DISTANCE_PX,
        heavy_now: now_local >= HEAVY_INTENSITY,
        nearby_signal: now_distance <= inputs.nearby_distance_px,
    }
}

/// Estimate the arrival of rain from the distance trend.
///
/// `distance` and `minutes` are aligned by frame index (newest first);
/// infinite distances mean no rain was found and are left out of the fit.
pub fn estimate_motion(
    distance: &[f64],
    minutes: &[f64],
    rain_now: bool,
    motion_search_radius: u32,
) -> MotionEstimate {
    let total_points = distance.len().min(minutes.len());
    let valid: Vec<(f64, f64)> = minutes
        .iter()
        .zip(distance)
        .filter(|(_, d)| d.is_finite())
        .map(|(m, d)| (*m, *d))
        .collect();

    let valid_span_minutes = if valid.len() < 2 {
        0.0
    } else {
        let (lo, hi) = valid
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (m, _)| {
                (lo.min(*m), hi.max(*m))
            });
        hi - lo
    };

    let fit = if valid.len() >= MIN_REGRESSION_POINTS
        && valid_span_minutes >= MIN_REGRESSION_SPAN_MINUTES
    {
        linear_fit(&valid)
    } else {
        None
    };

    let valid_approach = fit.is_some_and(|f| f.slope >= MIN_APPROACH_SLOPE);

    let eta_minutes = if rain_now {
        Some(0)
    } else {
        fit.filter(|_| valid_approach).map(|f| {
            (f.intercept / f.slope)
                .clamp(MIN_ETA_MINUTES, MAX_ETA_MINUTES)
                .round() as u32
        })
    };

    let radius = f64::from(motion_search_radius);
    let reference = fit
        .map(|f| f.intercept)
        .filter(|i| i.is_finite())
        .or_else(|| distance.first().copied().filter(|d| d.is_finite()))
        .unwrap_or(radius);
    let proximity = (1.0 - reference.min(radius) / radius.max(1.0)).clamp(0.0, 1.0);

    let valid_ratio = if total_points == 0 {
        0.0
    } else {
        (valid.len() as f64 / total_points as f64).clamp(0.0, 1.0)
    };

    let r2 = fit.map(|f| f.r2);
    let confidence =
        (0.25 + 0.35 * r2.unwrap_or(0.0) + 0.2 * valid_ratio + 0.2 * proximity).clamp(0.0, 1.0);

    MotionEstimate {
        eta_minutes,
        eta_bucket: EtaBucket::from_eta(eta_minutes),
        intercept_px: fit.map(|f| f.intercept),
        slope_px_per_min: fit.map(|f| f.slope),
        r2,
        confidence,
        proximity,
        valid_ratio,
        valid_points: valid.len(),
        valid_span_minutes,
        valid_approach,
    }
}
