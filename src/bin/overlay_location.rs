//! Mark a location on the latest radar image.
//!
//! Handy for checking that the configured radar bounds put a coordinate
//! where you expect it.
//!
//! Usage:
//!   cargo run --bin overlay_location -- --lat 1.3521 --lng 103.8198
//!
//! Options:
//!   --output PATH        Where to write the PNG (default artifacts/radar-overlay.png)
//!   --image-file PATH    Use a local radar PNG instead of downloading one
//!   --dot-radius N       Red dot radius in pixels (default 2)
//!   --dot-ring N         White ring thickness in pixels (default 1)

use std::env;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::Utc;

use rain_radar::config::Config;
use rain_radar::model::RadarImage;
use rain_radar::radar::{RadarClient, decode_png, draw_marker, encode_png, lat_lng_to_pixel};

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parsed<T: std::str::FromStr>(args: &[String], flag: &str, default: Option<T>) -> anyhow::Result<T> {
    match flag_value(args, flag) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow!("{flag} has an invalid value: {raw}")),
        None => default.ok_or_else(|| anyhow!("{flag} is required")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let lat: f64 = parsed(&args, "--lat", None)?;
    let lng: f64 = parsed(&args, "--lng", None)?;
    let radius: i64 = parsed(&args, "--dot-radius", Some(2))?;
    let ring: i64 = parsed(&args, "--dot-ring", Some(1))?;
    let output = PathBuf::from(flag_value(&args, "--output").unwrap_or("artifacts/radar-overlay.png"));

    let config = Config::from_env(false)?;

    let (mut image, label): (RadarImage, String) = match flag_value(&args, "--image-file") {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
            (decode_png(&bytes)?, path.to_string())
        }
        None => {
            let client = RadarClient::new(config.radar.clone(), config.tz_offset);
            let candidates = client.generate_candidates(Utc::now());
            let frames = client.fetch_frames(&candidates).await;
            let newest = frames
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("no radar frames available"))?;
            ((*newest.image).clone(), newest.url)
        }
    };

    let (x, y) = lat_lng_to_pixel(lat, lng, image.width, image.height, &config.radar.bounds);
    draw_marker(&mut image, x.round() as i64, y.round() as i64, radius, ring);

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, encode_png(&image)?)?;

    println!("Source: {label}");
    println!("Pixel: x={x:.1} y={y:.1} ({}x{})", image.width, image.height);
    println!("Wrote {}", output.display());

    Ok(())
}
