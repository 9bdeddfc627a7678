use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use common::{Error, Result, Tick, TickSource};

const BASE_URL: &str = "https://api.binance.com";

/// Polls Binance's `bookTicker` endpoint for one symbol.
///
/// Each successful poll becomes a tick priced at the bid/ask mid with both
/// sides attached. Failed polls are retried with exponential backoff and
/// never surface to the consumer.
pub struct BinanceBookTickerPoller {
    symbol: String,
    http: Client,
    base_url: String,
    interval: Interval,
}

impl BinanceBookTickerPoller {
    /// Must be called inside a tokio runtime.
    pub fn new(symbol: impl Into<String>, poll_every: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        let mut interval = interval(poll_every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self {
            symbol: symbol.into(),
            http,
            base_url: BASE_URL.to_string(),
            interval,
        })
    }

    /// Point at another REST host (testnet, mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn poll_once(&self) -> Result<Tick> {
        let url = format!("{}/api/v3/ticker/bookTicker?symbol={}", self.base_url, self.symbol);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Http(format!("HTTP {status}: {body}")));
        }
        parse_book_ticker(&body)
    }
}

#[async_trait]
impl TickSource for BinanceBookTickerPoller {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn next_tick(&mut self) -> Option<Tick> {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            self.interval.tick().await;
            match self.poll_once().await {
                Ok(tick) => {
                    debug!(symbol = %self.symbol, price = tick.price, "Book ticker polled");
                    return Some(tick);
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, backoff = ?backoff, "Book ticker poll failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    bid_price: String,
    ask_price: String,
}

/// Turn a `bookTicker` body into a tick stamped with the local clock.
fn parse_book_ticker(body: &str) -> Result<Tick> {
    let ticker: BookTicker = serde_json::from_str(body)?;
    let side = |raw: &str, name: &str| -> Result<f64> {
        raw.parse::<f64>()
            .map_err(|_| Error::InvalidTick(format!("{name} '{raw}' is not a number")))
    };
    let bid = side(&ticker.bid_price, "bidPrice")?;
    let ask = side(&ticker.ask_price, "askPrice")?;
    Ok(Tick::new((bid + ask) / 2.0, Utc::now()).with_quote(bid, ask))
}
