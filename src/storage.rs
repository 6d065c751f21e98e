//! SQLite storage for user profiles and alert state.
//!
//! The store is a plain key-value contract keyed by user id: `get` returns
//! the latest record or nothing, `put` overwrites. Rows are validated as
//! they are read so the rest of the service only sees typed records.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::warn;

use crate::model::{AlertRecord, AlertState, EtaBucket, Profile, RiskLevel};
use crate::timeutil::parse_instant;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:rain_radar.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Each in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to open {database_url}"))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                chat_id TEXT,
                alert_style TEXT NOT NULL,
                quiet_start TEXT,
                quiet_end TEXT,
                enabled INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_states (
                user_id TEXT PRIMARY KEY,
                last_level TEXT NOT NULL,
                last_eta_bucket TEXT,
                last_signal_hash TEXT,
                last_sent_at TEXT,
                updated_at TEXT NOT NULL,
                last_score INTEGER NOT NULL,
                last_eta_minutes INTEGER NOT NULL,
                last_confidence REAL NOT NULL,
                last_radar_token TEXT NOT NULL,
                last_eta_slope REAL,
                last_eta_r2 REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_profile(&self, user_id: &str) -> anyhow::Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT lat, lng, chat_id, alert_style, quiet_start, quiet_end, enabled, updated_at
            FROM profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at: String = row.try_get("updated_at")?;
        Ok(Some(Profile {
            lat: row.try_get("lat")?,
            lng: row.try_get("lng")?,
            chat_id: row.try_get("chat_id")?,
            alert_style: row.try_get("alert_style")?,
            quiet_start: row.try_get("quiet_start")?,
            quiet_end: row.try_get("quiet_end")?,
            enabled: row.try_get("enabled")?,
            updated_at: parse_instant(&updated_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
        }))
    }

    pub async fn put_profile(&self, user_id: &str, profile: &Profile) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO profiles
                (user_id, lat, lng, chat_id, alert_style, quiet_start, quiet_end, enabled, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(profile.lat)
        .bind(profile.lng)
        .bind(&profile.chat_id)
        .bind(&profile.alert_style)
        .bind(&profile.quiet_start)
        .bind(&profile.quiet_end)
        .bind(profile.enabled)
        .bind(profile.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The policy-relevant part of the stored alert state.
    pub async fn get_alert_state(&self, user_id: &str) -> anyhow::Result<Option<AlertState>> {
        Ok(self.get_alert_record(user_id).await?.map(|r| r.state))
    }

    pub async fn get_alert_record(&self, user_id: &str) -> anyhow::Result<Option<AlertRecord>> {
        let row = sqlx::query(
            r#"
            SELECT last_level, last_eta_bucket, last_signal_hash, last_sent_at, updated_at,
                   last_score, last_eta_minutes, last_confidence, last_radar_token,
                   last_eta_slope, last_eta_r2
            FROM alert_states
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| alert_record_from_row(user_id, &row)).transpose()
    }

    /// Overwrite the stored alert record for `user_id`.
    pub async fn put_alert_record(&self, user_id: &str, record: &AlertRecord) -> anyhow::Result<()> {
        let state = &record.state;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO alert_states
                (user_id, last_level, last_eta_bucket, last_signal_hash, last_sent_at, updated_at,
                 last_score, last_eta_minutes, last_confidence, last_radar_token,
                 last_eta_slope, last_eta_r2)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(RiskLevel::label(state.last_level))
        .bind(state.last_eta_bucket.map(|b| b.as_str()))
        .bind(&state.last_signal_hash)
        .bind(state.last_sent_at.map(|t| t.to_rfc3339()))
        .bind(record.updated_at.to_rfc3339())
        .bind(i64::from(record.last_score))
        .bind(i64::from(record.last_eta_minutes))
        .bind(finite_or_zero(record.last_confidence))
        .bind(&record.last_radar_token)
        .bind(record.last_eta_slope.filter(|v| v.is_finite()))
        .bind(record.last_eta_r2.filter(|v| v.is_finite()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn alert_record_from_row(user_id: &str, row: &SqliteRow) -> anyhow::Result<AlertRecord> {
    let level: String = row.try_get("last_level")?;
    let last_level = match level.as_str() {
        "none" => None,
        other => match other.parse::<RiskLevel>() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!(user_id, error = %e, "Ignoring stored alert level");
                None
            }
        },
    };

    let bucket: Option<String> = row.try_get("last_eta_bucket")?;
    let last_eta_bucket = bucket.and_then(|b| match b.parse::<EtaBucket>() {
        Ok(bucket) => Some(bucket),
        Err(e) => {
            warn!(user_id, error = %e, "Ignoring stored ETA bucket");
            None
        }
    });

    let sent_at: Option<String> = row.try_get("last_sent_at")?;
    let last_sent_at = sent_at.and_then(|s| {
        let parsed = parse_instant(&s);
        if parsed.is_none() {
            warn!(user_id, value = %s, "Ignoring unparseable lastSentAt");
        }
        parsed
    });

    let updated_at: String = row.try_get("updated_at")?;
    let score: i64 = row.try_get("last_score")?;
    let eta_minutes: i64 = row.try_get("last_eta_minutes")?;

    Ok(AlertRecord {
        state: AlertState {
            last_level,
            last_eta_bucket,
            last_signal_hash: row.try_get("last_signal_hash")?,
            last_sent_at,
        },
        updated_at: parse_instant(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| DateTime::<Utc>::default()),
        last_score: score.clamp(0, 100) as u8,
        last_eta_minutes: eta_minutes.max(0) as u32,
        last_confidence: row.try_get("last_confidence")?,
        last_radar_token: row.try_get("last_radar_token")?,
        last_eta_slope: row.try_get("last_eta_slope")?,
        last_eta_r2: row.try_get("last_eta_r2")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use tokio_test::assert_ok;

    async fn setup_test_storage() -> Storage {
        Storage::new("sqlite::memory:").await.unwrap()
    }

    fn profile() -> Profile {
        Profile {
            lat: 1.3,
            lng: 103.8,
            chat_id: Some("123".to_string()),
            alert_style: "balanced".to_string(),
            quiet_start: None,
            quiet_end: Some("06:30".to_string()),
            enabled: true,
            updated_at: Utc.with_ymd_and_hms(2026, 2, 16, 7, 0, 0).unwrap(),
        }
    }

    fn record() -> AlertRecord {
        let sgt = FixedOffset::east_opt(8 * 3600).unwrap();
        AlertRecord {
            state: AlertState {
                last_level: Some(RiskLevel::Medium),
                last_eta_bucket: Some(EtaBucket::Within15),
                last_signal_hash: Some("medium:6:15_6".to_string()),
                last_sent_at: Some(sgt.with_ymd_and_hms(2026, 2, 16, 15, 0, 0).unwrap()),
            },
            updated_at: Utc.with_ymd_and_hms(2026, 2, 16, 7, 0, 0).unwrap(),
            last_score: 61,
            last_eta_minutes: 12,
            last_confidence: 0.74,
            last_radar_token: "202602161500".to_string(),
            last_eta_slope: Some(0.7),
            last_eta_r2: Some(0.94),
        }
    }

    #[tokio::test]
    async fn test_missing_rows_are_none() {
        let storage = setup_test_storage().await;

        assert!(storage.get_profile("me").await.unwrap().is_none());
        assert!(storage.get_alert_state("me").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let storage = setup_test_storage().await;

        assert_ok!(storage.put_profile("me", &profile()).await);
        let loaded = storage.get_profile("me").await.unwrap().unwrap();

        assert_eq!(loaded, profile());
    }

    #[tokio::test]
    async fn test_alert_record_round_trip_and_overwrite() {
        let storage = setup_test_storage().await;

        assert_ok!(storage.put_alert_record("me", &record()).await);
        assert_eq!(storage.get_alert_record("me").await.unwrap(), Some(record()));

        let mut next = record();
        next.state.last_level = None;
        next.state.last_sent_at = None;
        next.last_eta_slope = None;
        assert_ok!(storage.put_alert_record("me", &next).await);

        let loaded = storage.get_alert_record("me").await.unwrap().unwrap();
        assert_eq!(loaded.state.last_level, None);
        assert_eq!(loaded.state.last_sent_at, None);
        assert_eq!(loaded.last_eta_slope, None);
        assert_eq!(loaded.last_eta_r2, Some(0.94));
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let storage = setup_test_storage().await;

        storage.put_alert_record("a", &record()).await.unwrap();

        assert!(storage.get_alert_state("a").await.unwrap().is_some());
        assert!(storage.get_alert_state("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_values_are_ignored_on_read() {
        let storage = setup_test_storage().await;
        storage.put_alert_record("me", &record()).await.unwrap();

        sqlx::query(
            "UPDATE alert_states SET last_level = 'extreme', last_eta_bucket = 'soon', last_sent_at = 'yesterday'",
        )
        .execute(&storage.pool)
        .await
        .unwrap();

        let state = storage.get_alert_state("me").await.unwrap().unwrap();
        assert_eq!(state.last_level, None);
        assert_eq!(state.last_eta_bucket, None);
        assert_eq!(state.last_sent_at, None);
        assert_eq!(state.last_signal_hash.as_deref(), Some("medium:6:15_6"));
    }
}
