use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::instrument::{InstrumentContract, InstrumentFilters, SearchCandidate};
use crate::domain::market_data::{BarsRequest, MarketBar, MarketSnapshot};
use crate::domain::ports::{
    BrokerAccount, BrokerOrder, BrokerPort, InternalOpenOrder, Portfolio,
};
use crate::domain::token::ApprovalToken;
use crate::domain::types::OrderIntent;

/// REST-based [`BrokerPort`] adapter. Talks to a generic execution gateway
/// over JSON/HTTP; the wire shape is intentionally venue-agnostic so any
/// broker's REST facade can sit behind it.
pub struct HttpBroker {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBroker {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
    }
}

#[derive(Deserialize)]
struct PingResponse {
    #[allow(dead_code)]
    status: String,
}

#[async_trait]
impl BrokerPort for HttpBroker {
    async fn connect(&self) -> anyhow::Result<()> {
        self.request(reqwest::Method::POST, "/session")
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.request(reqwest::Method::DELETE, "/session")
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.ping().await.is_ok()
    }

    async fn get_accounts(&self) -> anyhow::Result<Vec<BrokerAccount>> {
        let accounts = self
            .request(reqwest::Method::GET, "/accounts")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(accounts)
    }

    async fn get_portfolio(&self, account_id: &str) -> anyhow::Result<Portfolio> {
        let portfolio = self
            .request(reqwest::Method::GET, &format!("/accounts/{account_id}/portfolio"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(portfolio)
    }

    async fn get_open_orders(&self, account_id: &str) -> anyhow::Result<Vec<InternalOpenOrder>> {
        let orders = self
            .request(reqwest::Method::GET, &format!("/accounts/{account_id}/orders"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(orders)
    }

    async fn get_market_snapshot(&self, instrument: &str) -> anyhow::Result<MarketSnapshot> {
        let snapshot = self
            .request(reqwest::Method::GET, &format!("/marketdata/{instrument}/snapshot"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(snapshot)
    }

    async fn get_market_bars(&self, request: BarsRequest) -> anyhow::Result<Vec<MarketBar>> {
        let bars = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/marketdata/{}/bars?timeframe={:?}&limit={}",
                    request.instrument, request.timeframe, request.limit
                ),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(bars)
    }

    async fn submit_order(
        &self,
        intent: &OrderIntent,
        token: &ApprovalToken,
    ) -> anyhow::Result<BrokerOrder> {
        let order = self
            .request(reqwest::Method::POST, "/orders")
            .header("X-Idempotency-Key", &token.token_id)
            .json(intent)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(order)
    }

    async fn get_order_status(&self, broker_order_id: &str) -> anyhow::Result<BrokerOrder> {
        let order = self
            .request(reqwest::Method::GET, &format!("/orders/{broker_order_id}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(order)
    }

    async fn search_instruments(
        &self,
        query: &str,
        filters: &InstrumentFilters,
        limit: usize,
    ) -> anyhow::Result<Vec<SearchCandidate>> {
        let mut url = format!("/instruments/search?q={}&limit={limit}", urlencode(query));
        if let Some(exchange) = &filters.exchange {
            url.push_str(&format!("&exchange={}", urlencode(exchange)));
        }
        if let Some(currency) = &filters.currency {
            url.push_str(&format!("&currency={}", urlencode(currency)));
        }
        let candidates = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(candidates)
    }

    async fn resolve_instrument(
        &self,
        symbol: &str,
        filters: &InstrumentFilters,
    ) -> anyhow::Result<Vec<InstrumentContract>> {
        let mut url = format!("/instruments/{}", urlencode(symbol));
        if let Some(exchange) = &filters.exchange {
            url.push_str(&format!("?exchange={}", urlencode(exchange)));
        }
        let contracts = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(contracts)
    }

    async fn get_contract_by_id(&self, con_id: i64) -> anyhow::Result<Option<InstrumentContract>> {
        let response = self
            .request(reqwest::Method::GET, &format!("/instruments/by-id/{con_id}"))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let contract = response.error_for_status()?.json().await?;
        Ok(Some(contract))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let _: PingResponse = self
            .request(reqwest::Method::GET, "/ping")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(())
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            _ => {
                for byte in c.to_string().as_bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    out
}
