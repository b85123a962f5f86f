use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::instrument::{
    InstrumentContract, InstrumentFilters, InstrumentType, SearchCandidate,
};
use crate::domain::market_data::{BarsRequest, MarketBar, MarketSnapshot};
use crate::domain::ports::{
    BrokerAccount, BrokerOrder, BrokerOrderStatus, BrokerPort, InternalOpenOrder, Portfolio,
};
use crate::domain::token::ApprovalToken;
use crate::domain::types::OrderIntent;

/// In-memory [`BrokerPort`] for development and integration tests. Orders
/// submitted here fill immediately at the supplied limit price (or a fixed
/// synthetic price for market orders) — no venue is actually contacted.
pub struct FakeBroker {
    connected: AtomicBool,
    next_con_id: AtomicI64,
    contracts: Mutex<Vec<InstrumentContract>>,
    orders: Mutex<HashMap<String, BrokerOrder>>,
    cash: Mutex<Decimal>,
    positions: Mutex<HashMap<String, Decimal>>,
}

impl FakeBroker {
    pub fn new(starting_cash: Decimal) -> Self {
        let default_contracts = vec![
            InstrumentContract {
                con_id: 1,
                symbol: "AAPL".into(),
                instrument_type: InstrumentType::Stk,
                exchange: "SMART".into(),
                currency: "USD".into(),
                name: Some("Apple Inc".into()),
            },
            InstrumentContract {
                con_id: 2,
                symbol: "SPY".into(),
                instrument_type: InstrumentType::Etf,
                exchange: "SMART".into(),
                currency: "USD".into(),
                name: Some("SPDR S&P 500 ETF Trust".into()),
            },
            InstrumentContract {
                con_id: 3,
                symbol: "RY".into(),
                instrument_type: InstrumentType::Stk,
                exchange: "NYSE".into(),
                currency: "USD".into(),
                name: Some("Royal Bank of Canada".into()),
            },
            InstrumentContract {
                con_id: 4,
                symbol: "RY".into(),
                instrument_type: InstrumentType::Stk,
                exchange: "TSE".into(),
                currency: "CAD".into(),
                name: Some("Royal Bank of Canada".into()),
            },
        ];
        Self {
            connected: AtomicBool::new(false),
            next_con_id: AtomicI64::new(1000),
            contracts: Mutex::new(default_contracts),
            orders: Mutex::new(HashMap::new()),
            cash: Mutex::new(starting_cash),
            positions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BrokerPort for FakeBroker {
    async fn connect(&self) -> anyhow::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_accounts(&self) -> anyhow::Result<Vec<BrokerAccount>> {
        Ok(vec![BrokerAccount {
            account_id: "FAKE-0001".into(),
        }])
    }

    async fn get_portfolio(&self, _account_id: &str) -> anyhow::Result<Portfolio> {
        let cash = *self.cash.lock().unwrap();
        let positions = self.positions.lock().unwrap().clone();
        let nav = cash + positions.values().copied().sum::<Decimal>();
        Ok(Portfolio {
            cash,
            positions,
            nav,
        })
    }

    async fn get_open_orders(&self, _account_id: &str) -> anyhow::Result<Vec<InternalOpenOrder>> {
        Ok(vec![])
    }

    async fn get_market_snapshot(&self, instrument: &str) -> anyhow::Result<MarketSnapshot> {
        Ok(MarketSnapshot {
            instrument: instrument.to_string(),
            bid: Some(Decimal::from(100)),
            ask: Some(Decimal::from(101)),
            last: Some(Decimal::from(100)),
            volume: Some(1_000_000),
            timestamp: Utc::now(),
        })
    }

    async fn get_market_bars(&self, request: BarsRequest) -> anyhow::Result<Vec<MarketBar>> {
        let limit = request.limit.max(1).min(500);
        let mut bars = Vec::with_capacity(limit);
        let mut price = Decimal::from(100);
        for i in 0..limit {
            bars.push(MarketBar {
                timestamp: Utc::now() - chrono::Duration::days((limit - i) as i64),
                open: price,
                high: price + Decimal::from(1),
                low: price - Decimal::from(1),
                close: price,
                volume: 500_000,
            });
            price += Decimal::new((i as i64) % 3 - 1, 0);
        }
        Ok(bars)
    }

    async fn submit_order(
        &self,
        intent: &OrderIntent,
        _token: &ApprovalToken,
    ) -> anyhow::Result<BrokerOrder> {
        if !self.is_connected().await {
            anyhow::bail!("fake broker not connected");
        }
        let broker_order_id = Uuid::new_v4().to_string();
        let fill_price = intent.limit_price.unwrap_or(Decimal::from(100));

        let order = BrokerOrder {
            broker_order_id: broker_order_id.clone(),
            status: BrokerOrderStatus::Filled,
            symbol: intent.symbol.clone(),
            quantity: intent.quantity,
            filled_quantity: intent.quantity,
            average_fill_price: Some(fill_price),
        };

        let notional = fill_price * intent.quantity;
        let mut cash = self.cash.lock().unwrap();
        let mut positions = self.positions.lock().unwrap();
        let signed = match intent.side {
            crate::domain::types::Side::Buy => intent.quantity,
            crate::domain::types::Side::Sell => -intent.quantity,
        };
        *positions.entry(intent.symbol.clone()).or_insert(Decimal::ZERO) += signed;
        match intent.side {
            crate::domain::types::Side::Buy => *cash -= notional,
            crate::domain::types::Side::Sell => *cash += notional,
        }

        self.orders.lock().unwrap().insert(broker_order_id, order.clone());
        Ok(order)
    }

    async fn get_order_status(&self, broker_order_id: &str) -> anyhow::Result<BrokerOrder> {
        self.orders
            .lock()
            .unwrap()
            .get(broker_order_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown broker order {broker_order_id}"))
    }

    async fn search_instruments(
        &self,
        query: &str,
        _filters: &InstrumentFilters,
        limit: usize,
    ) -> anyhow::Result<Vec<SearchCandidate>> {
        let query_upper = query.to_uppercase();
        let candidates: Vec<SearchCandidate> = self
            .contracts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.symbol.contains(&query_upper) || query_upper.contains(&c.symbol))
            .take(limit)
            .map(|c| SearchCandidate {
                con_id: c.con_id,
                symbol: c.symbol.clone(),
                name: c.name.clone(),
                exchange: c.exchange.clone(),
                currency: c.currency.clone(),
                match_score: 0.0,
            })
            .collect();
        Ok(candidates)
    }

    async fn resolve_instrument(
        &self,
        symbol: &str,
        filters: &InstrumentFilters,
    ) -> anyhow::Result<Vec<InstrumentContract>> {
        let matches: Vec<InstrumentContract> = self
            .contracts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.symbol.eq_ignore_ascii_case(symbol)
                    && filters
                        .exchange
                        .as_deref()
                        .is_none_or(|ex| ex.eq_ignore_ascii_case(&c.exchange))
                    && filters
                        .currency
                        .as_deref()
                        .is_none_or(|cur| cur.eq_ignore_ascii_case(&c.currency))
            })
            .cloned()
            .collect();
        if matches.is_empty() {
            anyhow::bail!("no exact match for {symbol}");
        }
        Ok(matches)
    }

    async fn get_contract_by_id(&self, con_id: i64) -> anyhow::Result<Option<InstrumentContract>> {
        Ok(self
            .contracts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.con_id == con_id)
            .cloned())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        if self.is_connected().await {
            Ok(())
        } else {
            anyhow::bail!("fake broker not connected")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_intent() -> OrderIntent {
        OrderIntent {
            symbol: "AAPL".into(),
            sec_type: crate::domain::types::SecType::Stk,
            side: crate::domain::types::Side::Buy,
            order_type: crate::domain::types::OrderType::Mkt,
            quantity: dec!(10),
            limit_price: None,
        }
    }

    #[tokio::test]
    async fn submit_order_rejects_when_disconnected() {
        let broker = FakeBroker::new(dec!(100_000));
        let token = ApprovalToken::mint("t1".into(), "p1".into(), "hash".into(), Utc::now(), chrono::Duration::minutes(5));
        assert!(broker.submit_order(&sample_intent(), &token).await.is_err());
    }

    #[tokio::test]
    async fn resolve_instrument_returns_all_exact_matches() {
        let broker = FakeBroker::new(dec!(100_000));
        let matches = broker
            .resolve_instrument("RY", &InstrumentFilters::default())
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().any(|c| c.exchange == "NYSE"));
        assert!(matches.iter().any(|c| c.exchange == "TSE"));
    }

    #[tokio::test]
    async fn resolve_instrument_filters_by_exchange() {
        let broker = FakeBroker::new(dec!(100_000));
        let filters = InstrumentFilters {
            exchange: Some("TSE".into()),
            ..Default::default()
        };
        let matches = broker.resolve_instrument("RY", &filters).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].currency, "CAD");
    }

    #[tokio::test]
    async fn submit_order_fills_and_updates_cash() {
        let broker = FakeBroker::new(dec!(100_000));
        broker.connect().await.unwrap();
        let token = ApprovalToken::mint("t1".into(), "p1".into(), "hash".into(), Utc::now(), chrono::Duration::minutes(5));

        let order = broker.submit_order(&sample_intent(), &token).await.unwrap();
        assert_eq!(order.status, BrokerOrderStatus::Filled);

        let portfolio = broker.get_portfolio("FAKE-0001").await.unwrap();
        assert!(portfolio.cash < dec!(100_000));
        assert_eq!(portfolio.positions.get("AAPL").copied(), Some(dec!(10)));
    }
}
