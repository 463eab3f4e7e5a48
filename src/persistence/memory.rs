use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{CandleStore, ScanId};
use crate::models::{Candle, CandlePeriod};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    last_scan: Option<ScanId>,
    candles: HashMap<(String, ScanId), BTreeMap<i64, Candle>>,
}

/// Process-local store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryCandleStore {
    inner: Mutex<Inner>,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("memory store poisoned: {e}")))
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn start_scan(&self, pair: &str, period: CandlePeriod) -> Result<ScanId> {
        let mut inner = self.inner()?;
        let scan_id = inner.last_scan.map_or(1, |id| id + 1);
        inner.last_scan = Some(scan_id);
        tracing::debug!(pair = %pair, %period, scan_id, "Started scan");
        Ok(scan_id)
    }

    async fn latest_scan_id(&self) -> Result<Option<ScanId>> {
        Ok(self.inner()?.last_scan)
    }

    async fn save_candle(&self, pair: &str, candle: &Candle, scan_id: ScanId) -> Result<()> {
        self.inner()?
            .candles
            .entry((pair.to_string(), scan_id))
            .or_default()
            .insert(candle.timestamp.timestamp(), candle.clone());
        Ok(())
    }

    async fn load_candles(&self, pair: &str, scan_id: ScanId) -> Result<Vec<Candle>> {
        Ok(self
            .inner()?
            .candles
            .get(&(pair.to_string(), scan_id))
            .map(|series| series.values().cloned().collect())
            .unwrap_or_default())
    }
}
