use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::domain::market_data::{BarsRequest, MarketBar, MarketSnapshot};
use crate::domain::ports::BrokerPort;

struct CacheEntry<T> {
    value: T,
    inserted_at: std::time::Instant,
    last_used: std::time::Instant,
}

/// TTL-bounded, LRU-evicted cache in front of the broker's market data calls
/// (spec §4.9), grounded in the original `packages/market_data` module.
pub struct MarketDataCache {
    broker: Arc<dyn BrokerPort>,
    snapshot_ttl: Duration,
    bars_ttl: Duration,
    max_entries: usize,
    snapshots: Mutex<HashMap<String, CacheEntry<MarketSnapshot>>>,
    bars: Mutex<HashMap<String, CacheEntry<Vec<MarketBar>>>>,
}

impl MarketDataCache {
    pub fn new(
        broker: Arc<dyn BrokerPort>,
        snapshot_ttl: Duration,
        bars_ttl: Duration,
        max_entries: usize,
    ) -> Self {
        Self {
            broker,
            snapshot_ttl,
            bars_ttl,
            max_entries,
            snapshots: Mutex::new(HashMap::new()),
            bars: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_snapshot(&self, instrument: &str) -> anyhow::Result<MarketSnapshot> {
        let now = std::time::Instant::now();
        {
            let mut guard = self.snapshots.lock().unwrap();
            if let Some(entry) = guard.get_mut(instrument) {
                if now.duration_since(entry.inserted_at) < self.snapshot_ttl {
                    entry.last_used = now;
                    return Ok(entry.value.clone());
                }
                guard.remove(instrument);
            }
        }

        let snapshot = self.broker.get_market_snapshot(instrument).await?;
        let mut guard = self.snapshots.lock().unwrap();
        evict_if_full(&mut guard, self.max_entries);
        guard.insert(
            instrument.to_string(),
            CacheEntry {
                value: snapshot.clone(),
                inserted_at: now,
                last_used: now,
            },
        );
        Ok(snapshot)
    }

    pub async fn get_bars(&self, request: BarsRequest) -> anyhow::Result<Vec<MarketBar>> {
        let key = bars_cache_key(&request);
        let now = std::time::Instant::now();
        {
            let mut guard = self.bars.lock().unwrap();
            if let Some(entry) = guard.get_mut(&key) {
                if now.duration_since(entry.inserted_at) < self.bars_ttl {
                    entry.last_used = now;
                    return Ok(entry.value.clone());
                }
                guard.remove(&key);
            }
        }

        let bars = self.broker.get_market_bars(request).await?;
        let mut guard = self.bars.lock().unwrap();
        evict_if_full(&mut guard, self.max_entries);
        guard.insert(
            key,
            CacheEntry {
                value: bars.clone(),
                inserted_at: now,
                last_used: now,
            },
        );
        Ok(bars)
    }
}

fn bars_cache_key(request: &BarsRequest) -> String {
    format!(
        "{}:{:?}:{:?}:{:?}:{}:{}",
        request.instrument, request.timeframe, request.start, request.end, request.limit, request.rth_only
    )
}

fn evict_if_full<T>(map: &mut HashMap<String, CacheEntry<T>>, max_entries: usize) {
    if map.len() < max_entries {
        return;
    }
    if let Some(lru_key) = map
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(k, _)| k.clone())
    {
        map.remove(&lru_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{InstrumentContract, InstrumentFilters, SearchCandidate};
    use crate::domain::ports::{BrokerAccount, BrokerOrder, InternalOpenOrder, Portfolio};
    use crate::domain::token::ApprovalToken;
    use crate::domain::types::OrderIntent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBroker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BrokerPort for CountingBroker {
        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
        }
        async fn get_accounts(&self) -> anyhow::Result<Vec<BrokerAccount>> {
            Ok(vec![])
        }
        async fn get_portfolio(&self, _account_id: &str) -> anyhow::Result<Portfolio> {
            unimplemented!()
        }
        async fn get_open_orders(&self, _account_id: &str) -> anyhow::Result<Vec<InternalOpenOrder>> {
            Ok(vec![])
        }
        async fn get_market_snapshot(&self, instrument: &str) -> anyhow::Result<MarketSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MarketSnapshot {
                instrument: instrument.to_string(),
                bid: None,
                ask: None,
                last: None,
                volume: None,
                timestamp: Utc::now(),
            })
        }
        async fn get_market_bars(&self, _request: BarsRequest) -> anyhow::Result<Vec<MarketBar>> {
            unimplemented!()
        }
        async fn submit_order(
            &self,
            _intent: &OrderIntent,
            _token: &ApprovalToken,
        ) -> anyhow::Result<BrokerOrder> {
            unimplemented!()
        }
        async fn get_order_status(&self, _broker_order_id: &str) -> anyhow::Result<BrokerOrder> {
            unimplemented!()
        }
        async fn search_instruments(
            &self,
            _query: &str,
            _filters: &InstrumentFilters,
            _limit: usize,
        ) -> anyhow::Result<Vec<SearchCandidate>> {
            unimplemented!()
        }
        async fn resolve_instrument(
            &self,
            _symbol: &str,
            _filters: &InstrumentFilters,
        ) -> anyhow::Result<Vec<InstrumentContract>> {
            unimplemented!()
        }
        async fn get_contract_by_id(&self, _con_id: i64) -> anyhow::Result<Option<InstrumentContract>> {
            unimplemented!()
        }
        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn repeated_lookup_within_ttl_hits_cache() {
        let broker = Arc::new(CountingBroker {
            calls: AtomicUsize::new(0),
        });
        let cache = MarketDataCache::new(broker.clone(), Duration::from_secs(30), Duration::from_secs(60), 100);

        cache.get_snapshot("AAPL").await.unwrap();
        cache.get_snapshot("AAPL").await.unwrap();
        cache.get_snapshot("AAPL").await.unwrap();

        assert_eq!(broker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_instruments_each_fetch_once() {
        let broker = Arc::new(CountingBroker {
            calls: AtomicUsize::new(0),
        });
        let cache = MarketDataCache::new(broker.clone(), Duration::from_secs(30), Duration::from_secs(60), 100);

        cache.get_snapshot("AAPL").await.unwrap();
        cache.get_snapshot("MSFT").await.unwrap();

        assert_eq!(broker.calls.load(Ordering::SeqCst), 2);
    }
}
