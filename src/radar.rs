//! Radar image acquisition: slot URLs, HTTP download and PNG decoding.
//!
//! The radar operator publishes one PNG per slot, named after the slot's
//! local time. Slots that are missing, not yet published, or not PNGs are
//! skipped; callers work with whatever frames came back, including none.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as TimeDelta, FixedOffset, Utc};
use reqwest::StatusCode;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::config::{RadarBounds, RadarSource};
use crate::model::{RadarFrame, RadarImage};
use crate::timeutil::{floor_minutes, timestamp_token, to_local};

const FETCH_TIMEOUT: Duration = Duration::from_secs(6);
const USER_AGENT: &str = "rain-radar-alert/0.1";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to decode radar PNG payload: {0}")]
    Png(#[from] png::DecodingError),

    #[error("unsupported PNG layout: {0:?} at {1:?}")]
    Unsupported(png::ColorType, png::BitDepth),
}

/// A radar slot to try downloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarCandidate {
    pub index: usize,
    pub timestamp_token: String,
    pub url: String,
}

/// Client for the radar image host.
#[derive(Clone)]
pub struct RadarClient {
    client: reqwest::Client,
    source: RadarSource,
    tz_offset: FixedOffset,
}

impl RadarClient {
    pub fn new(source: RadarSource, tz_offset: FixedOffset) -> Self {
        Self {
            client: reqwest::Client::new(),
            source,
            tz_offset,
        }
    }

    /// Slots to request, newest first: `now` in local time rounded down to
    /// the poll interval, then one interval further back per candidate.
    pub fn generate_candidates(&self, now: DateTime<Utc>) -> Vec<RadarCandidate> {
        let step = self.source.poll_interval_minutes.max(1);
        let rounded = floor_minutes(to_local(now, self.tz_offset), step);

        (0..self.source.frame_count as usize)
            .map(|index| {
                let slot = rounded - TimeDelta::minutes(index as i64 * i64::from(step));
                let token = timestamp_token(slot);
                let url = format!(
                    "{}/{}{}{}",
                    self.source.base_url.trim_end_matches('/'),
                    self.source.prefix,
                    token,
                    self.source.suffix
                );
                RadarCandidate {
                    index,
                    timestamp_token: token,
                    url,
                }
            })
            .collect()
    }

    /// Download and decode every candidate that is available.
    pub async fn fetch_frames(&self, candidates: &[RadarCandidate]) -> Vec<RadarFrame> {
        let mut frames = Vec::new();

        for candidate in candidates {
            let Some(payload) = self.fetch_payload(candidate).await else {
                continue;
            };

            match decode_png(&payload) {
                Ok(image) => frames.push(RadarFrame {
                    index: candidate.index,
                    timestamp_token: candidate.timestamp_token.clone(),
                    url: candidate.url.clone(),
                    content_hash: content_hash(&payload),
                    image: Arc::new(image),
                }),
                Err(e) => warn!(
                    slot = %candidate.timestamp_token,
                    error = %e,
                    "Skipping undecodable radar frame"
                ),
            }
        }

        frames
    }

    async fn fetch_payload(&self, candidate: &RadarCandidate) -> Option<Vec<u8>> {
        let response = match self
            .client
            .get(&candidate.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(slot = %candidate.timestamp_token, error = %e, "Radar fetch failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(
                slot = %candidate.timestamp_token,
                status = %response.status(),
                "Radar slot unavailable"
            );
            return None;
        }

        let is_png = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("png"));
        if !is_png {
            debug!(slot = %candidate.timestamp_token, "Radar slot is not a PNG");
            return None;
        }

        match response.bytes().await {
            Ok(body) if !body.is_empty() => Some(body.to_vec()),
            Ok(_) => None,
            Err(e) => {
                debug!(slot = %candidate.timestamp_token, error = %e, "Radar body read failed");
                None
            }
        }
    }
}

/// First 16 hex characters of the payload's SHA-1.
pub fn content_hash(payload: &[u8]) -> String {
    let digest = Sha1::digest(payload);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Decode a PNG payload into an RGBA8 image.
pub fn decode_png(payload: &[u8]) -> Result<RadarImage, DecodeError> {
    let mut decoder = png::Decoder::new(Cursor::new(payload));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    let data = &buf[..info.buffer_size()];

    if info.bit_depth != png::BitDepth::Eight {
        return Err(DecodeError::Unsupported(info.color_type, info.bit_depth));
    }

    let rgba = match info.color_type {
        png::ColorType::Rgba => data.to_vec(),
        png::ColorType::Rgb => data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::Grayscale => data.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        png::ColorType::GrayscaleAlpha => data
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        other => return Err(DecodeError::Unsupported(other, info.bit_depth)),
    };

    Ok(RadarImage {
        width: info.width,
        height: info.height,
        rgba,
    })
}

/// Map a coordinate onto the radar image by linear interpolation over the
/// image's bounding box, clamped to the image.
pub fn lat_lng_to_pixel(
    lat: f64,
    lng: f64,
    width: u32,
    height: u32,
    bounds: &RadarBounds,
) -> (f64, f64) {
    let x_fraction = (lng - bounds.min_lng) / (bounds.max_lng - bounds.min_lng);
    let y_fraction = (bounds.max_lat - lat) / (bounds.max_lat - bounds.min_lat);

    let max_x = f64::from(width.saturating_sub(1));
    let max_y = f64::from(height.saturating_sub(1));
    (
        (x_fraction * max_x).clamp(0.0, max_x),
        (y_fraction * max_y).clamp(0.0, max_y),
    )
}

/// Paint a red dot with a white ring centred on `(x, y)`, clipped to the
/// image.
pub fn draw_marker(image: &mut RadarImage, x: i64, y: i64, radius: i64, ring: i64) {
    let outer = radius + ring;
    for dy in -outer..=outer {
        for dx in -outer..=outer {
            let (px, py) = (x + dx, y + dy);
            if px < 0 || py < 0 || px >= i64::from(image.width) || py >= i64::from(image.height) {
                continue;
            }

            let distance_sq = dx * dx + dy * dy;
            let color = if distance_sq <= radius * radius {
                [255, 0, 0, 255]
            } else if distance_sq <= outer * outer {
                [255, 255, 255, 255]
            } else {
                continue;
            };
            image.set_pixel(px as u32, py as u32, color);
        }
    }
}

/// Encode an RGBA image as PNG.
pub fn encode_png(image: &RadarImage) -> Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width, image.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.rgba)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source() -> RadarSource {
        RadarSource {
            base_url: "https://example.com".to_string(),
            prefix: "dpsri_70km_".to_string(),
            suffix: "0000dBR.dpsri.png".to_string(),
            frame_count: 3,
            poll_interval_minutes: 5,
            bounds: RadarBounds {
                min_lat: 1.163,
                max_lat: 1.493,
                min_lng: 103.577,
                max_lng: 104.077,
            },
        }
    }

    fn sgt() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_generate_candidates_uses_sg_slots() {
        let client = RadarClient::new(source(), sgt());
        let now_utc = Utc.with_ymd_and_hms(2026, 2, 16, 7, 3, 31).unwrap();

        let candidates = client.generate_candidates(now_utc);

        let tokens: Vec<_> = candidates.iter().map(|c| c.timestamp_token.as_str()).collect();
        assert_eq!(tokens, vec!["202602161500", "202602161455", "202602161450"]);
        assert_eq!(candidates[2].index, 2);
        assert!(
            candidates[0]
                .url
                .ends_with("dpsri_70km_2026021615000000dBR.dpsri.png")
        );
        assert!(candidates[0].url.starts_with("https://example.com/dpsri"));
    }

    #[test]
    fn test_candidates_cross_midnight() {
        let client = RadarClient::new(source(), sgt());
        // 00:04 SGT on the 17th
        let now_utc = Utc.with_ymd_and_hms(2026, 2, 16, 16, 4, 0).unwrap();

        let candidates = client.generate_candidates(now_utc);

        assert_eq!(candidates[0].timestamp_token, "202602170000");
        assert_eq!(candidates[1].timestamp_token, "202602162355");
    }

    #[test]
    fn test_png_round_trip_keeps_pixels() {
        let mut image = RadarImage::filled(4, 3, [0, 0, 0, 0]);
        image.set_pixel(2, 1, [255, 0, 0, 255]);

        let payload = encode_png(&image).unwrap();
        let decoded = decode_png(&payload).unwrap();

        assert_eq!(decoded, image);
    }

    #[test]
    fn test_decode_rgb_png_adds_opaque_alpha() {
        let mut payload = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut payload, 2, 1);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[1, 2, 3, 4, 5, 6]).unwrap();
        }

        let decoded = decode_png(&payload).unwrap();

        assert_eq!(decoded.rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_png(b"\x89PNG\r\n\x1a\nnot really").is_err());
        assert!(decode_png(&[]).is_err());
    }

    #[test]
    fn test_content_hash_is_short_sha1() {
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(content_hash(b"abc"), "a9993e364706816a");
    }

    #[test]
    fn test_draw_marker_clips_at_edges() {
        let mut image = RadarImage::filled(5, 5, [0, 0, 0, 0]);

        draw_marker(&mut image, 0, 0, 1, 1);

        assert_eq!(image.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(image.pixel(1, 0), [255, 0, 0, 255]);
        assert_eq!(image.pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(image.pixel(2, 0), [255, 255, 255, 255]);
        assert_eq!(image.pixel(3, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_lat_lng_to_pixel() {
        let bounds = source().bounds;

        let (x, y) = lat_lng_to_pixel(1.493, 103.577, 101, 101, &bounds);
        assert_eq!((x, y), (0.0, 0.0));

        let (x, y) = lat_lng_to_pixel(1.163, 104.077, 101, 101, &bounds);
        assert!((x - 100.0).abs() < 1e-9);
        assert!((y - 100.0).abs() < 1e-9);

        let (x, y) = lat_lng_to_pixel(1.328, 103.827, 101, 101, &bounds);
        assert!((x - 50.0).abs() < 1e-6);
        assert!((y - 50.0).abs() < 1e-6);

        // Outside the box clamps to the edge.
        let (x, y) = lat_lng_to_pixel(0.0, 110.0, 101, 101, &bounds);
        assert_eq!((x, y), (100.0, 100.0));
    }
}
