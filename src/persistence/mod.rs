// Candle history persistence
pub mod memory;
pub mod postgres_store;
pub mod redis_store;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StorageSettings;
use crate::models::{Candle, CandlePeriod};
use crate::{Error, Result};

pub use memory::MemoryCandleStore;
pub use postgres_store::PostgresCandleStore;
pub use redis_store::RedisCandleStore;

/// Identifier of one trading run; candles are grouped under it
pub type ScanId = i64;

/// Candle history sink
///
/// Saving the same `(pair, scan_id, timestamp)` twice keeps a single record.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Open a new scan for this run and return its id
    async fn start_scan(&self, pair: &str, period: CandlePeriod) -> Result<ScanId>;

    async fn latest_scan_id(&self) -> Result<Option<ScanId>>;

    async fn save_candle(&self, pair: &str, candle: &Candle, scan_id: ScanId) -> Result<()>;

    /// Candles of one scan, oldest first
    async fn load_candles(&self, pair: &str, scan_id: ScanId) -> Result<Vec<Candle>>;
}

/// Open the configured store
pub async fn connect(settings: &StorageSettings) -> Result<Arc<dyn CandleStore>> {
    match settings {
        StorageSettings::Memory => {
            tracing::info!("Using in-memory candle store");
            Ok(Arc::new(MemoryCandleStore::new()))
        }
        StorageSettings::Redis { url } => Ok(Arc::new(RedisCandleStore::new(url).await?)),
        StorageSettings::Postgres { url } => Ok(Arc::new(PostgresCandleStore::new(url).await?)),
    }
}

pub(crate) fn require_url(url: &str, backend: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::Config(format!("{backend} storage requires a url")));
    }
    Ok(())
}
