use crate::{Error, Result};

/// How ticks are obtained from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Push: Binance `@trade` WebSocket stream.
    Stream,
    /// Pull: Binance `bookTicker` REST endpoint polled on an interval.
    Poll,
}

/// Runtime configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instruments to analyse, one engine each.
    pub symbols: Vec<String>,
    pub transport: Transport,
    pub poll_interval_ms: u64,
    /// TOML file with analysis parameters and instrument conventions.
    pub params_path: String,
    /// Account-currency amount risked per trade.
    pub risk_amount: f64,
}

impl Config {
    /// Load from the process environment. Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let symbols: Vec<String> = required(&lookup, "SMC_SYMBOLS")?
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(Error::Config("SMC_SYMBOLS lists no symbols".into()));
        }

        let transport = match lookup("SMC_TRANSPORT")
            .unwrap_or_else(|| "stream".to_string())
            .to_lowercase()
            .as_str()
        {
            "stream" => Transport::Stream,
            "poll" => Transport::Poll,
            other => {
                return Err(Error::Config(format!(
                    "SMC_TRANSPORT must be 'stream' or 'poll', got: '{other}'"
                )))
            }
        };

        let poll_interval_ms = parsed(&lookup, "SMC_POLL_INTERVAL_MS")?.unwrap_or(1000);
        if poll_interval_ms == 0 {
            return Err(Error::Config("SMC_POLL_INTERVAL_MS must be > 0".into()));
        }

        let risk_amount: f64 = parsed(&lookup, "SMC_RISK_AMOUNT")?.unwrap_or(100.0);
        if !risk_amount.is_finite() || risk_amount <= 0.0 {
            return Err(Error::Config(format!(
                "SMC_RISK_AMOUNT must be a positive number, got {risk_amount}"
            )));
        }

        Ok(Config {
            symbols,
            transport,
            poll_interval_ms,
            params_path: lookup("SMC_PARAMS_PATH")
                .unwrap_or_else(|| "config/smc.toml".to_string()),
            risk_amount,
        })
    }
}

fn required<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Result<String> {
    lookup(key).ok_or_else(|| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an unparseable value: '{raw}'"))),
    }
}
