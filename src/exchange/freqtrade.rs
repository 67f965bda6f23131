//! Freqtrade REST API client (execution venue).
//!
//! Authenticates with basic auth once at startup, then keeps the JWT access
//! token fresh from a background task. All trading endpoints use bearer auth.

use super::traits::{ExecutionVenue, OpenTrade, OrderRequest, PositionCount};
use super::types::*;
use crate::config::FreqtradeConfig;
use crate::monitor::Direction;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default)]
struct Tokens {
    access: String,
    refresh: Option<String>,
}

/// Freqtrade REST client.
pub struct FreqtradeClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    tokens: RwLock<Tokens>,
}

impl FreqtradeClient {
    pub fn new(config: &FreqtradeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            tokens: RwLock::new(Tokens::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Obtain access and refresh tokens with basic auth.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<()> {
        let url = self.url("/api/v1/token/login");
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .context("Failed to send login request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Freqtrade login failed {}: {}", status, body);
        }

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        *self.tokens.write() = Tokens {
            access: login.access_token,
            refresh: login.refresh_token,
        };
        info!(base_url = %self.base_url, "Logged in to Freqtrade");
        Ok(())
    }

    /// Exchange the refresh token for a new access token.
    #[instrument(skip(self))]
    pub async fn refresh_token(&self) -> Result<()> {
        let refresh = self
            .tokens
            .read()
            .refresh
            .clone()
            .context("No refresh token, login first")?;

        let url = self.url("/api/v1/token/refresh");
        let response = self
            .http
            .post(&url)
            .bearer_auth(refresh)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Freqtrade token refresh failed {}: {}", status, body);
        }

        let refreshed: LoginResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        self.tokens.write().access = refreshed.access_token;
        debug!("Refreshed Freqtrade access token");
        Ok(())
    }

    /// Refresh the access token every `every` until `shutdown` fires.
    /// A failed refresh keeps the previous token.
    pub fn spawn_token_refresher(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "Token refresher started");
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately; the login token is fresh
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh_token().await {
                            warn!(error = %e, "Token refresh failed, keeping previous token");
                        }
                    }
                }
            }
            info!("Token refresher stopped");
        })
    }

    /// Authenticated request. Non-2xx responses become errors carrying the
    /// method, URL and body.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = self.url(path);
        let token = self.tokens.read().access.clone();

        let mut request = self.http.request(method.clone(), &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} {}", method, url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} {} failed with {}: {}", method, url, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} {} response", method, url))
    }

    #[instrument(skip(self), fields(pair = %payload.pair, side = %payload.side))]
    pub async fn force_entry(&self, payload: &ForceEntryPayload) -> Result<serde_json::Value> {
        let body = serde_json::to_value(payload).context("Failed to encode forcebuy payload")?;
        let response: serde_json::Value = self
            .request(Method::POST, "/api/v1/forcebuy", Some(body))
            .await?;
        info!(response = %response, "Force entry accepted");
        Ok(response)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<CountResponse> {
        self.request(Method::GET, "/api/v1/count", None).await
    }

    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<Vec<TradeStatus>> {
        self.request(Method::GET, "/api/v1/status", None).await
    }

    #[instrument(skip(self))]
    pub async fn get_whitelist(&self) -> Result<WhitelistResponse> {
        self.request(Method::GET, "/api/v1/whitelist", None).await
    }
}

impl From<TradeStatus> for OpenTrade {
    fn from(trade: TradeStatus) -> Self {
        let entry_filled = trade.orders.first().is_some_and(|order| !order.is_open);
        OpenTrade {
            direction: if trade.is_short {
                Direction::Short
            } else {
                Direction::Long
            },
            pair: trade.pair,
            entry_filled,
        }
    }
}

#[async_trait]
impl ExecutionVenue for FreqtradeClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<()> {
        let payload = ForceEntryPayload {
            pair: order.pair.clone(),
            price: order.price,
            ordertype: order.order_type.as_str().to_string(),
            side: order.side.as_str().to_string(),
            entry_tag: order.entry_tag.clone(),
        };
        self.force_entry(&payload).await.map(|_| ())
    }

    async fn position_count(&self) -> Result<PositionCount> {
        let count = self.count().await?;
        Ok(PositionCount {
            current: count.current,
            max: count.max,
        })
    }

    async fn has_open_position(&self, pair: &str) -> Result<bool> {
        let trades = self.status().await?;
        Ok(trades.iter().any(|trade| trade.pair == pair))
    }

    async fn open_trades(&self) -> Result<Vec<OpenTrade>> {
        let trades = self.status().await?;
        Ok(trades.into_iter().map(OpenTrade::from).collect())
    }

    async fn whitelist(&self) -> Result<Vec<String>> {
        Ok(self.get_whitelist().await?.whitelist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderType;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> FreqtradeConfig {
        FreqtradeConfig {
            base_url: server.uri(),
            username: "bot".to_string(),
            password: "secret".to_string(),
            ..FreqtradeConfig::default()
        }
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v1/token/login"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1"
            })))
            .mount(server)
            .await;
    }

    async fn logged_in(server: &MockServer) -> FreqtradeClient {
        mount_login(server).await;
        let client = FreqtradeClient::new(&config_for(server)).unwrap();
        client.login().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_login_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/token/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = FreqtradeClient::new(&config_for(&server)).unwrap();
        let err = client.login().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_submit_order_posts_force_entry() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/v1/forcebuy"))
            .and(header("authorization", "Bearer access-1"))
            .and(body_json(serde_json::json!({
                "pair": "BTC/USDT:USDT",
                "price": 80.5,
                "ordertype": "limit",
                "side": "long",
                "entry_tag": "force_buy"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"trade_id": 3})))
            .expect(1)
            .mount(&server)
            .await;

        let order = OrderRequest {
            pair: "BTC/USDT:USDT".to_string(),
            price: dec!(80.5),
            side: Direction::Long,
            order_type: OrderType::Limit,
            entry_tag: "force_buy".to_string(),
        };
        client.submit_order(&order).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_carries_method_url_and_body() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/v1/forcebuy"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"pair not in whitelist"}"#))
            .mount(&server)
            .await;

        let order = OrderRequest {
            pair: "XYZ/USDT:USDT".to_string(),
            price: dec!(1),
            side: Direction::Short,
            order_type: OrderType::Limit,
            entry_tag: "force_buy".to_string(),
        };
        let message = client.submit_order(&order).await.unwrap_err().to_string();
        assert!(message.contains("POST"));
        assert!(message.contains("/api/v1/forcebuy"));
        assert!(message.contains("pair not in whitelist"));
    }

    #[tokio::test]
    async fn test_position_queries() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current": 2, "max": 3, "total_stake": 150.5
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"trade_id": 1, "pair": "ETH/USDT:USDT", "is_open": true, "is_short": true,
                 "orders": [{"order_id": "a", "status": "closed", "is_open": false}]},
                {"trade_id": 2, "pair": "SOL/USDT:USDT", "is_open": true, "is_short": false,
                 "orders": [{"order_id": "b", "status": "open", "is_open": true}]}
            ])))
            .mount(&server)
            .await;

        assert_eq!(client.position_count().await.unwrap(), PositionCount { current: 2, max: 3 });
        assert!(client.has_open_position("ETH/USDT:USDT").await.unwrap());
        assert!(!client.has_open_position("BTC/USDT:USDT").await.unwrap());

        let trades = client.open_trades().await.unwrap();
        assert_eq!(
            trades[0],
            OpenTrade {
                pair: "ETH/USDT:USDT".to_string(),
                direction: Direction::Short,
                entry_filled: true,
            }
        );
        assert!(!trades[1].entry_filled);
    }

    #[tokio::test]
    async fn test_refresh_replaces_access_token() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/v1/token/refresh"))
            .and(header("authorization", "Bearer refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/whitelist"))
            .and(header("authorization", "Bearer access-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "whitelist": ["BTC/USDT:USDT", "ETH/USDT:USDT"], "length": 2, "method": ["StaticPairList"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        client.refresh_token().await.unwrap();
        assert_eq!(
            client.whitelist().await.unwrap(),
            vec!["BTC/USDT:USDT".to_string(), "ETH/USDT:USDT".to_string()]
        );
    }
}
