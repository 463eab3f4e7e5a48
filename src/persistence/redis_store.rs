use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use super::{require_url, CandleStore, ScanId};
use crate::models::{Candle, CandlePeriod};
use crate::{Error, Result};

const SCAN_COUNTER_KEY: &str = "trendbot:scan_id";

/// Redis candle history
///
/// Layout:
/// - `trendbot:scan_id` counter (INCR per run)
/// - `trendbot:scan:{id}` hash with pair, period and start time
/// - `trendbot:candles:{pair}:{id}` sorted set scored by period start
pub struct RedisCandleStore {
    conn: ConnectionManager,
}

fn candles_key(pair: &str, scan_id: ScanId) -> String {
    format!("trendbot:candles:{}:{}", pair, scan_id)
}

impl RedisCandleStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        require_url(redis_url, "redis")?;
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| Error::Timeout("Redis connection timeout after 5 seconds".to_string()))??;

        tracing::info!("✓ Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }
}

#[async_trait]
impl CandleStore for RedisCandleStore {
    async fn start_scan(&self, pair: &str, period: CandlePeriod) -> Result<ScanId> {
        let mut conn = self.conn.clone();
        let scan_id: ScanId = conn.incr(SCAN_COUNTER_KEY, 1).await?;

        let meta_key = format!("trendbot:scan:{}", scan_id);
        let fields = [
            ("pair", pair.to_string()),
            ("period_minutes", period.minutes().to_string()),
            ("started_at", Utc::now().to_rfc3339()),
        ];
        conn.hset_multiple::<_, _, _, ()>(&meta_key, &fields[..]).await?;

        tracing::info!(pair = %pair, %period, scan_id, "Started scan in Redis");
        Ok(scan_id)
    }

    async fn latest_scan_id(&self) -> Result<Option<ScanId>> {
        let mut conn = self.conn.clone();
        let id: Option<ScanId> = conn.get(SCAN_COUNTER_KEY).await?;
        Ok(id)
    }

    async fn save_candle(&self, pair: &str, candle: &Candle, scan_id: ScanId) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = candles_key(pair, scan_id);
        let value = serde_json::to_string(candle)?;
        let score = candle.timestamp.timestamp() as f64;

        // Replace whatever is stored for this period start
        let _: () = redis::pipe()
            .atomic()
            .zrembyscore(&key, score, score)
            .ignore()
            .zadd(&key, value, score)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(pair = %pair, scan_id, timestamp = %candle.timestamp, "Saved candle to Redis");
        Ok(())
    }

    async fn load_candles(&self, pair: &str, scan_id: ScanId) -> Result<Vec<Candle>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrangebyscore(candles_key(pair, scan_id), "-inf", "+inf")
            .await?;

        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[tokio::test]
    async fn test_rejects_empty_url() {
        assert!(RedisCandleStore::new("").await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_scan_lifecycle() {
        let store = RedisCandleStore::new(REDIS_URL)
            .await
            .expect("Failed to connect to Redis");

        let scan_id = store.start_scan("TEST_SCAN", CandlePeriod::FiveMinutes).await.unwrap();
        assert_eq!(store.latest_scan_id().await.unwrap(), Some(scan_id));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_save_candle_twice_keeps_one() {
        let store = RedisCandleStore::new(REDIS_URL)
            .await
            .expect("Failed to connect to Redis");
        let scan_id = store.start_scan("TEST_IDEMPOTENT", CandlePeriod::OneMinute).await.unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candle = Candle::new("TEST_IDEMPOTENT", ts, 100.0);
        store.save_candle("TEST_IDEMPOTENT", &candle, scan_id).await.unwrap();
        store.save_candle("TEST_IDEMPOTENT", &candle, scan_id).await.unwrap();

        let loaded = store.load_candles("TEST_IDEMPOTENT", scan_id).await.unwrap();
        assert_eq!(loaded, vec![candle]);
    }
}
