use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use common::{duration_label, Error, InstrumentSpec, PnlUnit, Result, Timeframe};

/// Top-level analysis config file (TOML).
///
/// Example `config/smc.toml`:
/// ```toml
/// [params]
/// bias_timeframe_secs = 14400
/// entry_timeframe_secs = 3600
/// strong_move_multiplier = 1.5
///
/// [instrument]
/// pnl_unit = "pips"
/// pip_size = 0.0001
/// unit_risk_factor = 1.0
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SmcFileConfig {
    pub params: SmcParams,
    pub instrument: InstrumentSpec,
}

/// Tunables of the bias/entry analysis.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SmcParams {
    /// Higher (bias) timeframe bar length in seconds.
    pub bias_timeframe_secs: i64,
    /// Lower (entry) timeframe bar length in seconds.
    pub entry_timeframe_secs: i64,
    /// Closed bars required on each timeframe before any analysis runs.
    pub min_candles: usize,
    /// Body of the move candle must exceed the order-block body by this factor.
    pub strong_move_multiplier: f64,
    /// Stop placed this fraction beyond the POI edge (0.001 = 0.1%).
    pub stop_buffer_pct: f64,
    /// Target offset from entry when no swing target exists (0.01 = 1%).
    pub fallback_target_pct: f64,
}

impl Default for SmcParams {
    fn default() -> Self {
        Self {
            bias_timeframe_secs: 4 * 3600,
            entry_timeframe_secs: 3600,
            min_candles: 5,
            strong_move_multiplier: 1.5,
            stop_buffer_pct: 0.001,
            fallback_target_pct: 0.01,
        }
    }
}

impl SmcParams {
    pub fn timeframe_secs(&self, tf: Timeframe) -> i64 {
        match tf {
            Timeframe::Bias => self.bias_timeframe_secs,
            Timeframe::Entry => self.entry_timeframe_secs,
        }
    }

    /// Human label for detail text, e.g. `4h bias`.
    pub fn timeframe_label(&self, tf: Timeframe) -> String {
        format!("{} {tf}", duration_label(self.timeframe_secs(tf)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.entry_timeframe_secs <= 0 || self.bias_timeframe_secs <= self.entry_timeframe_secs {
            return Err(Error::Config(format!(
                "timeframes must satisfy 0 < entry ({}) < bias ({})",
                self.entry_timeframe_secs, self.bias_timeframe_secs
            )));
        }
        if self.min_candles < 3 {
            return Err(Error::Config(format!(
                "min_candles must be at least 3, got {}",
                self.min_candles
            )));
        }
        if !self.strong_move_multiplier.is_finite() || self.strong_move_multiplier <= 0.0 {
            return Err(Error::Config(format!(
                "strong_move_multiplier must be positive, got {}",
                self.strong_move_multiplier
            )));
        }
        for (key, value) in [
            ("stop_buffer_pct", self.stop_buffer_pct),
            ("fallback_target_pct", self.fallback_target_pct),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::Config(format!("{key} must be in (0, 1), got {value}")));
            }
        }
        Ok(())
    }
}

impl SmcFileConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Analysis config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: SmcFileConfig = toml::from_str(content)?;
        cfg.params.validate()?;
        cfg.validate_instrument()?;
        Ok(cfg)
    }

    fn validate_instrument(&self) -> Result<()> {
        let spec = &self.instrument;
        if !spec.unit_risk_factor.is_finite() || spec.unit_risk_factor <= 0.0 {
            return Err(Error::Config(format!(
                "instrument.unit_risk_factor must be positive, got {}",
                spec.unit_risk_factor
            )));
        }
        if spec.pnl_unit == PnlUnit::Pips && !(spec.pip_size.is_finite() && spec.pip_size > 0.0) {
            return Err(Error::Config(format!(
                "instrument.pip_size must be positive for pip PnL, got {}",
                spec.pip_size
            )));
        }
        Ok(())
    }
}
