use serde_json::Value;
use tracing::warn;

use common::{Candle, Decision, Evaluation, NoTrade, ReasonCode};

use crate::analyzer::SmcAnalyzer;
use crate::config::SmcParams;

const BIAS_KEY: &str = "higherTimeframeCandles";
const ENTRY_KEY: &str = "lowerTimeframeCandles";

/// Evaluate one JSON document of the form
/// `{"higherTimeframeCandles": [...], "lowerTimeframeCandles": [...]}`.
///
/// Always returns exactly one decision; bad input becomes
/// `INVALID_STRUCTURE` with a descriptive detail.
pub fn evaluate_json(input: &str, params: &SmcParams) -> Decision {
    match serde_json::from_str::<Value>(input) {
        Ok(value) => evaluate_value(&value, params),
        Err(e) => NoTrade::new(ReasonCode::InvalidStructure, format!("Input is not valid JSON: {e}")).into(),
    }
}

/// Same as [`evaluate_json`] for an already parsed document.
pub fn evaluate_value(input: &Value, params: &SmcParams) -> Decision {
    let (bias, entry) = match (candle_array(input, BIAS_KEY), candle_array(input, ENTRY_KEY)) {
        (Ok(b), Ok(e)) => (b, e),
        (Err(detail), _) | (_, Err(detail)) => {
            return NoTrade::new(ReasonCode::InvalidStructure, detail).into();
        }
    };

    let (bias, bias_rejected) = ingest_candles(bias, BIAS_KEY);
    let (entry, entry_rejected) = ingest_candles(entry, ENTRY_KEY);

    let mut analyzer = SmcAnalyzer::new(params.clone());
    let eval = analyzer.evaluate(&bias, &entry);

    let rejected = bias_rejected.len() + entry_rejected.len();
    match eval {
        Evaluation::NoTrade(mut no_trade) if rejected > 0 => {
            let first = bias_rejected.iter().chain(&entry_rejected).next().cloned().unwrap_or_default();
            no_trade.detail = format!("{} ({rejected} malformed candle(s) dropped; first: {first})", no_trade.detail);
            no_trade.into()
        }
        eval => Decision::from(&eval),
    }
}

fn candle_array<'a>(input: &'a Value, key: &str) -> Result<&'a [Value], String> {
    match input.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(format!("'{key}' must be an array of candles")),
        None => Err(format!("Missing '{key}' in input")),
    }
}

/// Parse candle records, dropping malformed ones.
///
/// Returns the accepted candles (strictly ascending by time, `index` set to
/// the position in the accepted sequence) and one message per rejection.
pub fn ingest_candles(items: &[Value], label: &str) -> (Vec<Candle>, Vec<String>) {
    let mut candles: Vec<Candle> = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let parsed = parse_candle(item).and_then(|c| match candles.last() {
            Some(prev) if c.time <= prev.time => Err(format!(
                "time {} does not follow previous candle time {}",
                c.time, prev.time
            )),
            _ => Ok(c),
        });
        match parsed {
            Ok(mut candle) => {
                candle.index = candles.len();
                candles.push(candle);
            }
            Err(reason) => {
                warn!(series = label, position = i, reason = %reason, "Dropping malformed candle");
                rejected.push(format!("{label}[{i}]: {reason}"));
            }
        }
    }

    (candles, rejected)
}

fn parse_candle(item: &Value) -> Result<Candle, String> {
    let obj = item.as_object().ok_or("candle is not an object")?;
    let time = obj
        .get("time")
        .and_then(Value::as_i64)
        .ok_or("missing or non-integer 'time'")?;
    let price = |key: &str| -> Result<f64, String> {
        obj.get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("missing or non-numeric '{key}'"))
    };

    let mut candle = Candle::new(time, price("open")?, price("high")?, price("low")?, price("close")?);
    if let Some(volume) = obj.get("volume").and_then(Value::as_f64) {
        candle.volume = volume;
    }
    candle.validate().map_err(|e| e.to_string())?;
    Ok(candle)
}
