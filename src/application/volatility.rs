use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::market_data::MarketBar;

/// A source of historical bars used to compute realized volatility. Broker
/// market data and any secondary data vendor both implement this so the
/// service can fail over between them (spec §4.9), grounded in the original
/// `packages/volatility_provider` module's provider/service split.
#[async_trait]
pub trait VolatilityProvider: Send + Sync {
    async fn daily_bars(&self, symbol: &str, lookback_days: usize) -> anyhow::Result<Vec<MarketBar>>;
}

/// Annualized realized volatility from daily log returns: sample standard
/// deviation of `ln(close[t] / close[t-1])` scaled by sqrt(252).
pub fn realized_volatility(bars: &[MarketBar]) -> Option<f64> {
    if bars.len() < 2 {
        return None;
    }
    let closes: Vec<f64> = bars.iter().filter_map(|b| b.close.to_f64()).collect();
    if closes.len() < 2 {
        return None;
    }

    let log_returns: Vec<f64> = closes
        .windows(2)
        .filter_map(|w| {
            if w[0] <= 0.0 || w[1] <= 0.0 {
                None
            } else {
                Some((w[1] / w[0]).ln())
            }
        })
        .collect();
    if log_returns.len() < 2 {
        return None;
    }

    let mean = log_returns.iter().sum::<f64>() / log_returns.len() as f64;
    let variance = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (log_returns.len() - 1) as f64;

    Some(variance.sqrt() * 252.0_f64.sqrt())
}

struct CachedVol {
    value: f64,
    computed_at: Instant,
}

/// Wraps a primary and fallback [`VolatilityProvider`] with independent TTLs;
/// the fallback's cache lives half as long as the primary's, since a
/// secondary vendor's bars are trusted less (spec §4.9).
pub struct VolatilityService {
    primary: Arc<dyn VolatilityProvider>,
    fallback: Option<Arc<dyn VolatilityProvider>>,
    primary_ttl: Duration,
    lookback_days: usize,
    cache: Mutex<std::collections::HashMap<String, CachedVol>>,
}

impl VolatilityService {
    pub fn new(
        primary: Arc<dyn VolatilityProvider>,
        fallback: Option<Arc<dyn VolatilityProvider>>,
        primary_ttl: Duration,
        lookback_days: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            primary_ttl,
            lookback_days,
            cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn fallback_ttl(&self) -> Duration {
        self.primary_ttl / 2
    }

    pub async fn get_volatility(&self, symbol: &str) -> anyhow::Result<f64> {
        let now = Instant::now();
        if let Some(cached) = self.cache.lock().unwrap().get(symbol) {
            if now.duration_since(cached.computed_at) < self.primary_ttl {
                return Ok(cached.value);
            }
        }

        match self.primary.daily_bars(symbol, self.lookback_days).await {
            Ok(bars) => {
                if let Some(vol) = realized_volatility(&bars) {
                    self.cache.lock().unwrap().insert(
                        symbol.to_string(),
                        CachedVol {
                            value: vol,
                            computed_at: now,
                        },
                    );
                    return Ok(vol);
                }
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "primary volatility provider failed");
            }
        }

        let Some(fallback) = &self.fallback else {
            anyhow::bail!("no volatility data available for {symbol}");
        };

        if let Some(cached) = self.cache.lock().unwrap().get(symbol) {
            if now.duration_since(cached.computed_at) < self.fallback_ttl() {
                return Ok(cached.value);
            }
        }

        let bars = fallback.daily_bars(symbol, self.lookback_days).await?;
        let vol = realized_volatility(&bars)
            .ok_or_else(|| anyhow::anyhow!("insufficient bars to compute volatility for {symbol}"))?;
        self.cache.lock().unwrap().insert(
            symbol.to_string(),
            CachedVol {
                value: vol,
                computed_at: now,
            },
        );
        Ok(vol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(close: rust_decimal::Decimal) -> MarketBar {
        MarketBar {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn realized_volatility_is_none_for_flat_series() {
        let bars = vec![bar(dec!(100)), bar(dec!(100)), bar(dec!(100))];
        let vol = realized_volatility(&bars).unwrap();
        assert!(vol.abs() < 1e-9);
    }

    #[test]
    fn realized_volatility_reflects_dispersion() {
        let bars = vec![
            bar(dec!(100)),
            bar(dec!(105)),
            bar(dec!(95)),
            bar(dec!(110)),
            bar(dec!(90)),
        ];
        let vol = realized_volatility(&bars).unwrap();
        assert!(vol > 0.0);
    }

    struct FailingProvider;
    #[async_trait]
    impl VolatilityProvider for FailingProvider {
        async fn daily_bars(&self, _symbol: &str, _lookback_days: usize) -> anyhow::Result<Vec<MarketBar>> {
            anyhow::bail!("primary vendor unreachable")
        }
    }

    struct StaticProvider(Vec<MarketBar>);
    #[async_trait]
    impl VolatilityProvider for StaticProvider {
        async fn daily_bars(&self, _symbol: &str, _lookback_days: usize) -> anyhow::Result<Vec<MarketBar>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let fallback_bars = vec![bar(dec!(50)), bar(dec!(55)), bar(dec!(48))];
        let service = VolatilityService::new(
            Arc::new(FailingProvider),
            Some(Arc::new(StaticProvider(fallback_bars))),
            Duration::from_secs(300),
            20,
        );

        let vol = service.get_volatility("AAPL").await.unwrap();
        assert!(vol > 0.0);
    }

    #[tokio::test]
    async fn errors_when_both_primary_and_fallback_unavailable() {
        let service = VolatilityService::new(Arc::new(FailingProvider), None, Duration::from_secs(300), 20);
        assert!(service.get_volatility("AAPL").await.is_err());
    }
}
