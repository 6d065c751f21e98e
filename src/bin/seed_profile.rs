//! Seed the watched profile.
//!
//! Usage:
//!   cargo run --bin seed_profile -- --lat 1.3521 --lng 103.8198 [--chat-id 123456]
//!
//! Environment:
//!   DATABASE_URL      - SQLite connection string
//!   USER_ID           - profile key (default `me`)
//!   TELEGRAM_CHAT_ID  - used when --chat-id is not given
//!   QUIET_START/QUIET_END - stored as the profile's quiet hours

use std::env;

use anyhow::{Context, anyhow, bail};
use chrono::Utc;

use rain_radar::config::Config;
use rain_radar::model::Profile;
use rain_radar::storage::Storage;

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn coordinate(args: &[String], flag: &str) -> anyhow::Result<f64> {
    let raw = flag_value(args, flag).ok_or_else(|| anyhow!("{flag} is required"))?;
    let value: f64 = raw
        .parse()
        .with_context(|| format!("{flag} must be a number, got {raw}"))?;
    if !value.is_finite() {
        bail!("{flag} must be finite");
    }
    Ok(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let lat = coordinate(&args, "--lat")?;
    let lng = coordinate(&args, "--lng")?;

    let config = Config::from_env(false)?;

    let chat_id = flag_value(&args, "--chat-id")
        .map(str::to_string)
        .or_else(|| config.telegram_chat_id.clone())
        .ok_or_else(|| anyhow!("Provide --chat-id or TELEGRAM_CHAT_ID"))?;

    let storage = Storage::new(&config.database_url).await?;
    let profile = Profile {
        lat,
        lng,
        chat_id: Some(chat_id.clone()),
        alert_style: "balanced".to_string(),
        quiet_start: Some(config.quiet_start.clone()),
        quiet_end: Some(config.quiet_end.clone()),
        enabled: true,
        updated_at: Utc::now(),
    };
    storage.put_profile(&config.user_id, &profile).await?;

    println!(
        "Seeded profile for {} lat={} lng={} chatId={}",
        config.user_id, lat, lng, chat_id
    );

    Ok(())
}
