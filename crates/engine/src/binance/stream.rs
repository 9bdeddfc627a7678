use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{info, warn};
use url::Url;

use common::{Error, Result, Tick, TickSource};

const STREAM_BASE: &str = "wss://stream.binance.com:9443/ws";

/// Binance `@trade` WebSocket stream for a single symbol.
///
/// A background task owns the connection and pushes parsed trades into a
/// channel; [`TickSource::next_tick`] reads from it. Disconnects are
/// retried forever with exponential backoff, so the consumer only sees gaps.
pub struct BinanceTradeStream {
    symbol: String,
    tick_rx: mpsc::Receiver<Tick>,
    task: JoinHandle<()>,
}

impl BinanceTradeStream {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn spawn(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let (tick_tx, tick_rx) = mpsc::channel(1024);
        let task = tokio::spawn(run(symbol.clone(), tick_tx));
        Self { symbol, tick_rx, task }
    }
}

impl Drop for BinanceTradeStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl TickSource for BinanceTradeStream {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn next_tick(&mut self) -> Option<Tick> {
        self.tick_rx.recv().await
    }
}

/// Reconnect loop. Ends only when the consumer is gone.
async fn run(symbol: String, tick_tx: mpsc::Sender<Tick>) {
    let mut backoff = Duration::from_secs(1);
    const MAX_BACKOFF: Duration = Duration::from_secs(60);

    loop {
        info!(symbol = %symbol, "Connecting to Binance trade stream");
        match connect_once(&symbol, &tick_tx).await {
            Ok(()) if tick_tx.is_closed() => {
                info!(symbol = %symbol, "Tick consumer gone, stopping stream");
                return;
            }
            Ok(()) => {
                info!(symbol = %symbol, "WebSocket stream closed cleanly");
                // Binance ends sessions after 24h
                tokio::time::sleep(Duration::from_secs(1)).await;
                backoff = Duration::from_secs(1);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, backoff = ?backoff, "WebSocket error, reconnecting");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn connect_once(symbol: &str, tick_tx: &mpsc::Sender<Tick>) -> Result<()> {
    let url = Url::parse(&format!("{STREAM_BASE}/{}@trade", symbol.to_lowercase()))
        .map_err(|e| Error::WebSocket(e.to_string()))?;

    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;
    let (_, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;

        if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
            match parse_trade_event(&text) {
                Ok(Some(tick)) => {
                    if tick_tx.send(tick).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(symbol = %symbol, error = %e, "Failed to parse trade event"),
            }
        }
    }

    Ok(())
}

// ─── Binance trade JSON parsing ──────────────────────────────────────────────

#[derive(Deserialize)]
struct TradeEvent {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time_ms: i64,
}

/// Parse one `@trade` payload. Non-trade messages yield `None`.
fn parse_trade_event(text: &str) -> Result<Option<Tick>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("e").and_then(|v| v.as_str()) != Some("trade") {
        return Ok(None);
    }

    let event: TradeEvent = serde_json::from_value(value)?;
    let price: f64 = event
        .price
        .parse()
        .map_err(|_| Error::InvalidTick(format!("price '{}' is not a number", event.price)))?;
    let quantity: f64 = event
        .quantity
        .parse()
        .map_err(|_| Error::InvalidTick(format!("quantity '{}' is not a number", event.quantity)))?;
    let timestamp = Utc
        .timestamp_millis_opt(event.trade_time_ms)
        .single()
        .ok_or_else(|| Error::InvalidTick(format!("trade time {} out of range", event.trade_time_ms)))?;

    Ok(Some(Tick::new(price, timestamp).with_quantity(quantity)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trade_payload() {
        let text = r#"{"e":"trade","E":1700000000100,"s":"BTCUSDT","t":12345,
            "p":"37000.50","q":"0.015","T":1700000000000,"m":true,"M":true}"#;
        let tick = parse_trade_event(text).unwrap().unwrap();
        assert!((tick.price - 37000.5).abs() < 1e-9);
        assert_eq!(tick.quantity, Some(0.015));
        assert_eq!(tick.timestamp.timestamp(), 1_700_000_000);
        assert!(tick.bid.is_none());
    }

    #[test]
    fn ignores_other_events() {
        assert!(parse_trade_event(r#"{"result":null,"id":1}"#).unwrap().is_none());
    }

    #[test]
    fn rejects_unparseable_price() {
        let text = r#"{"e":"trade","p":"abc","q":"1","T":1700000000000}"#;
        assert!(matches!(parse_trade_event(text), Err(Error::InvalidTick(_))));
        assert!(parse_trade_event("not json").is_err());
    }
}
