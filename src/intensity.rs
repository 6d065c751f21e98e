//! Converts radar pixel colors into rain intensity and summarizes an image
//! around a target point.
//!
//! Intensity is a discrete 0..=5 scale: 0 is no rain (transparent
//! background, dark map pixels, or colors too far from the radar palette)
//! and 1..=5 follow the reflectivity palette from light to extreme.

use crate::model::RadarImage;

/// Reflectivity palette, light to extreme.
pub const PALETTE: [(u8, [u8; 3]); 5] = [
    (1, [102, 204, 255]),
    (2, [0, 176, 80]),
    (3, [255, 242, 0]),
    (4, [255, 153, 0]),
    (5, [255, 0, 0]),
];

const MIN_ALPHA: u8 = 15;
const MIN_BRIGHTNESS: f64 = 12.0;
const MAX_PALETTE_DISTANCE: f64 = 170.0;

/// Map one RGBA pixel to an intensity level.
pub fn pixel_to_intensity(r: u8, g: u8, b: u8, a: u8) -> u8 {
    if a < MIN_ALPHA {
        return 0;
    }

    let brightness = (f64::from(r) + f64::from(g) + f64::from(b)) / 3.0;
    if brightness < MIN_BRIGHTNESS {
        return 0;
    }

    let mut nearest_level = 0;
    let mut nearest_distance = f64::INFINITY;
    for (level, [pr, pg, pb]) in PALETTE {
        let dr = f64::from(r) - f64::from(pr);
        let dg = f64::from(g) - f64::from(pg);
        let db = f64::from(b) - f64::from(pb);
        let distance = (dr * dr + dg * dg + db * db).sqrt();
        if distance < nearest_distance {
            nearest_distance = distance;
            nearest_level = level;
        }
    }

    if nearest_distance > MAX_PALETTE_DISTANCE {
        0
    } else {
        nearest_level
    }
}

fn intensity_at(image: &RadarImage, x: u32, y: u32) -> u8 {
    let [r, g, b, a] = image.pixel(x, y);
    pixel_to_intensity(r, g, b, a)
}

fn clamp_coord(value: f64, len: u32) -> u32 {
    let max = f64::from(len.saturating_sub(1));
    value.round().clamp(0.0, max) as u32
}

/// Mean intensity over the disc of `radius` pixels around `(x, y)`.
///
/// Sample coordinates falling outside the image are clamped to its edges,
/// so pixels along the border are counted more than once near the edges.
pub fn sample_average_intensity(image: &RadarImage, x: f64, y: f64, radius: u32) -> f64 {
    if image.is_empty() {
        return 0.0;
    }

    let r = i64::from(radius);
    let mut total = 0u64;
    let mut count = 0u64;

    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r.saturating_mul(r) {
                continue;
            }
            let px = clamp_coord((x + dx as f64).round(), image.width);
            let py = clamp_coord((y + dy as f64).round(), image.height);
            total += u64::from(intensity_at(image, px, py));
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

/// Euclidean distance in pixels from `(x, y)` to the nearest pixel with
/// intensity >= 1, searching at most `search_radius` pixels away.
///
/// Returns `f64::INFINITY` when no rain is found. The search walks square
/// rings outward from the (rounded, clamped) center and stops as soon as no
/// unvisited ring can hold a closer pixel.
pub fn nearest_rain_distance(image: &RadarImage, x: f64, y: f64, search_radius: u32) -> f64 {
    if image.is_empty() {
        return f64::INFINITY;
    }

    let cx = i64::from(clamp_coord(x, image.width));
    let cy = i64::from(clamp_coord(y, image.height));
    let (width, height) = (i64::from(image.width), i64::from(image.height));
    let limit = f64::from(search_radius);

    if intensity_at(image, cx as u32, cy as u32) >= 1 {
        return 0.0;
    }

    let mut best = f64::INFINITY;
    for ring in 1..=i64::from(search_radius) {
        // Every pixel on this ring or beyond is at least `ring` away.
        if best <= ring as f64 {
            break;
        }

        for dy in -ring..=ring {
            let on_edge_row = dy.abs() == ring;
            let step = if on_edge_row { 1 } else { 2 * ring };
            let mut dx = -ring;
            while dx <= ring {
                let (px, py) = (cx + dx, cy + dy);
                if px >= 0 && py >= 0 && px < width && py < height {
                    let distance = ((dx * dx + dy * dy) as f64).sqrt();
                    if distance <= limit
                        && distance < best
                        && intensity_at(image, px as u32, py as u32) >= 1
                    {
                        best = distance;
                    }
                }
                dx += step;
            }
        }
    }

    best
}
