use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::domain::ports::BrokerPort;

/// Trading mode a connection is opened in, mirroring the IBKR
/// paper/live distinction (spec §4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTradingMode {
    Paper,
    Live,
}

impl FromStr for ConnectionTradingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(ConnectionTradingMode::Paper),
            "live" => Ok(ConnectionTradingMode::Live),
            _ => anyhow::bail!("invalid connection mode: {s}. Must be 'paper' or 'live'"),
        }
    }
}

/// Circuit breaker state (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitBreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    last_failure_time: Option<Instant>,
}

/// Tracks consecutive broker failures and trips to `Open` to stop sending
/// requests to a venue that is down, adapted from the trading bot's generic
/// circuit breaker.
pub struct CircuitBreaker {
    state: RwLock<CircuitBreakerState>,
    failure_threshold: usize,
    success_threshold: usize,
    timeout: Duration,
    name: String,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: usize,
        success_threshold: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            state: RwLock::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            }),
            failure_threshold,
            success_threshold,
            timeout,
            name: name.into(),
        }
    }

    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.state.write().await;
            if state.state == CircuitState::Open {
                if let Some(last_failure) = state.last_failure_time {
                    if last_failure.elapsed() > self.timeout {
                        info!(breaker = %self.name, "circuit transitioning open -> half_open");
                        state.state = CircuitState::HalfOpen;
                        state.success_count = 0;
                    } else {
                        return Err(CircuitBreakerError::Open(format!(
                            "circuit [{}] open, retry in {:?}",
                            self.name,
                            self.timeout - last_failure.elapsed()
                        )));
                    }
                }
            }
        }

        match f.await {
            Ok(result) => {
                self.on_success().await;
                Ok(result)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;
        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.success_threshold {
                    info!(breaker = %self.name, successes = state.success_count, "circuit transitioning half_open -> closed");
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                }
            }
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::Open => {
                warn!(breaker = %self.name, "success recorded while circuit open");
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.failure_threshold {
                    error!(breaker = %self.name, failures = state.failure_count, "circuit transitioning closed -> open");
                    state.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "failure during recovery, circuit reopening");
                state.state = CircuitState::Open;
                state.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    Open(String),
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::Open(msg) => write!(f, "circuit breaker is open: {msg}"),
            CircuitBreakerError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

/// Connection configuration (spec §4.13), grounded in
/// `original_source/packages/ibkr_config.py`'s `IBKRConfig` field set.
/// `failure_threshold`/`success_threshold`/`circuit_timeout` tune the
/// circuit breaker that wraps connection attempts and have no Python
/// analogue there (that module used a bare retry count).
#[derive(Debug, Clone)]
pub struct BrokerConnectionConfig {
    pub host: String,
    pub port: u16,
    pub client_id: u32,
    pub mode: ConnectionTradingMode,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub reconnect_enabled: bool,
    pub reconnect_max_retries: u32,
    pub reconnect_delay_base: f64,
    /// Forces the connection into a read-only posture: `OrderSubmitter`
    /// rejects submission attempts outright (spec §6.3).
    pub readonly_mode: bool,

    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub circuit_timeout: Duration,
}

impl Default for BrokerConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
            mode: ConnectionTradingMode::Paper,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            reconnect_enabled: true,
            reconnect_max_retries: 5,
            reconnect_delay_base: 2.0,
            readonly_mode: false,
            failure_threshold: 3,
            success_threshold: 2,
            circuit_timeout: Duration::from_secs(60),
        }
    }
}

/// Owns the lifecycle of a broker connection: exponential-backoff reconnect
/// attempts guarded by a circuit breaker so a persistently unreachable venue
/// stops being hammered (spec §4.5).
pub struct ConnectionManager {
    broker: Arc<dyn BrokerPort>,
    breaker: CircuitBreaker,
    config: BrokerConnectionConfig,
}

impl ConnectionManager {
    pub fn new(broker: Arc<dyn BrokerPort>, config: BrokerConnectionConfig) -> Self {
        let breaker = CircuitBreaker::new(
            "broker_connection",
            config.failure_threshold,
            config.success_threshold,
            config.circuit_timeout,
        );
        Self {
            broker,
            breaker,
            config,
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// Attempt to connect, retrying with exponential backoff up to
    /// `reconnect_max_retries` while the circuit remains closed or
    /// half-open. Backoff starts at `reconnect_delay_base` seconds and
    /// doubles each attempt, capped at `read_timeout`. When
    /// `reconnect_enabled` is false a single attempt is made and failure
    /// is returned immediately.
    pub async fn ensure_connected(&self) -> anyhow::Result<()> {
        if self.broker.is_connected().await {
            return Ok(());
        }

        let max_attempts = if self.config.reconnect_enabled {
            self.config.reconnect_max_retries.max(1)
        } else {
            1
        };
        let mut backoff = Duration::from_secs_f64(self.config.reconnect_delay_base);
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            let result = self.breaker.call(self.broker.connect()).await;
            match result {
                Ok(()) => return Ok(()),
                Err(CircuitBreakerError::Open(msg)) => {
                    return Err(anyhow::anyhow!(msg));
                }
                Err(CircuitBreakerError::Inner(e)) => {
                    warn!(attempt, error = %e, "broker connect attempt failed");
                    last_err = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = std::cmp::min(
                            Duration::from_secs_f64(backoff.as_secs_f64() * self.config.reconnect_delay_base),
                            self.config.read_timeout,
                        );
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("connection attempts exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn circuit_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new("test", 3, 2, Duration::from_secs(1));
        for _ in 0..3 {
            let _ = cb.call(async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<(), &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open(_))));
    }

    #[tokio::test]
    async fn s9_circuit_recovers_through_half_open() {
        let cb = CircuitBreaker::new("test", 2, 2, Duration::from_millis(50));
        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cb.call(async { Ok::<(), &str>(()) }).await.is_ok());
        assert!(cb.call(async { Ok::<(), &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let cb = CircuitBreaker::new("test", 2, 2, Duration::from_millis(50));
        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), &str>("boom") }).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = cb.call(async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }
}
