use tracing::{debug, info};

use common::{Candle, Direction, Evaluation, NoTrade, Poi, ReasonCode, Timeframe, TradeSignal};

use crate::config::SmcParams;
use crate::mitigation::{is_tapped, MitigationTracker};
use crate::poi::find_poi_after;
use crate::structure::{analyze_structure, StructureOutcome};
use crate::swing::detect_swings;

/// Confirmed structure with a usable POI on one timeframe.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Setup {
    direction: Direction,
    poi: Poi,
}

/// Two-tier bias → entry state machine.
///
/// Every call to [`SmcAnalyzer::evaluate`] recomputes swings, sweeps, MSS and
/// POIs from the full candle history it is given. The only state carried
/// between calls is the per-timeframe mitigation bookkeeping, which is
/// cleared whenever a signal is produced.
#[derive(Debug, Clone)]
pub struct SmcAnalyzer {
    params: SmcParams,
    mitigation: MitigationTracker,
}

impl SmcAnalyzer {
    pub fn new(params: SmcParams) -> Self {
        Self {
            params,
            mitigation: MitigationTracker::new(),
        }
    }

    pub fn mitigation(&self) -> &MitigationTracker {
        &self.mitigation
    }

    /// Evaluate closed bias and entry candles (oldest first).
    pub fn evaluate(&mut self, bias: &[Candle], entry: &[Candle]) -> Evaluation {
        match self.run(bias, entry) {
            Ok(signal) => {
                info!(
                    direction = %signal.direction,
                    entry = signal.entry,
                    stop = signal.stop_loss,
                    target = signal.take_profit,
                    poi_time = signal.poi.time,
                    "Trade signal"
                );
                Evaluation::Signal(signal)
            }
            Err(no_trade) => {
                debug!(reason = %no_trade.reason, detail = %no_trade.detail, "No trade");
                Evaluation::NoTrade(no_trade)
            }
        }
    }

    fn run(&mut self, bias: &[Candle], entry: &[Candle]) -> Result<TradeSignal, NoTrade> {
        let min = self.params.min_candles;
        if bias.len() < min || entry.len() < min {
            return Err(NoTrade::new(
                ReasonCode::InvalidStructure,
                format!(
                    "Insufficient historical data: {} bias / {} entry candles, need {min} each.",
                    bias.len(),
                    entry.len()
                ),
            ));
        }

        let bias_setup = self.find_setup(Timeframe::Bias, bias, None)?;
        self.confirm_mitigation(Timeframe::Bias, &bias_setup, bias)?;

        let entry_setup = self.find_setup(Timeframe::Entry, entry, Some(bias_setup.direction))?;
        self.confirm_mitigation(Timeframe::Entry, &entry_setup, entry)?;

        let signal = prepare_signal(entry_setup.direction, &entry_setup.poi, entry, &self.params);
        self.mitigation.clear();
        Ok(signal)
    }

    /// Swing → sweep → MSS → POI on one timeframe.
    ///
    /// With no direction constraint the bullish side is read first.
    fn find_setup(
        &self,
        tf: Timeframe,
        candles: &[Candle],
        only: Option<Direction>,
    ) -> Result<Setup, NoTrade> {
        let label = self.params.timeframe_label(tf);
        let swings = detect_swings(candles);
        let latest = match candles.last() {
            Some(c) if swings.is_complete() => c,
            _ => {
                return Err(NoTrade::new(
                    ReasonCode::InvalidStructure,
                    format!("Could not determine {label} market structure."),
                ))
            }
        };

        let directions = match only {
            Some(d) => vec![d],
            None => vec![Direction::Buy, Direction::Sell],
        };

        let mut awaiting = None;
        for direction in directions {
            match analyze_structure(&swings, latest, direction) {
                StructureOutcome::Shift { swept, level } => {
                    debug!(
                        timeframe = %tf,
                        direction = %direction,
                        swept_time = swept.time(),
                        level_time = level.time(),
                        "Market structure shift confirmed"
                    );
                    let poi = find_poi_after(
                        &level,
                        candles,
                        direction,
                        self.params.strong_move_multiplier,
                        |t| self.mitigation.is_mitigated(tf, t),
                    );
                    return match poi {
                        Some(poi) => Ok(Setup { direction, poi }),
                        None => Err(NoTrade::new(
                            ReasonCode::NoValidPoi,
                            format!("No valid {label} POI after {} MSS.", side_name(direction)),
                        )),
                    };
                }
                StructureOutcome::AwaitingShift { level, .. } => {
                    awaiting.get_or_insert((direction, level));
                }
                StructureOutcome::Absent => {}
            }
        }

        match awaiting {
            Some((direction, level)) => Err(NoTrade::new(
                ReasonCode::waiting_for_mss(tf),
                format!(
                    "Liquidity swept on {label}; waiting for a close beyond {:.5} for {} MSS.",
                    level.price(),
                    side_name(direction)
                ),
            )),
            None => Err(NoTrade::new(
                ReasonCode::NoSetup,
                match only {
                    Some(d) => format!("No {label} {d} setup found."),
                    None => format!("No clear {label} liquidity sweep and MSS found."),
                },
            )),
        }
    }

    fn confirm_mitigation(
        &mut self,
        tf: Timeframe,
        setup: &Setup,
        candles: &[Candle],
    ) -> Result<(), NoTrade> {
        if !is_tapped(&setup.poi, candles) {
            let label = self.params.timeframe_label(tf);
            return Err(NoTrade::new(
                ReasonCode::waiting_for_mitigation(tf),
                format!(
                    "Waiting for price to tap the {label} POI [{:.5}, {:.5}] for {}.",
                    setup.poi.low, setup.poi.high, setup.direction
                ),
            ));
        }
        if self.mitigation.record(tf, setup.poi.time) {
            info!(timeframe = %tf, poi_time = setup.poi.time, low = setup.poi.low, high = setup.poi.high, "POI mitigated");
        }
        Ok(())
    }
}

fn side_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "bullish",
        Direction::Sell => "bearish",
    }
}

/// Raw entry, stop and target from the entry-timeframe POI.
///
/// The target is the first entry-timeframe swing formed after the POI that
/// sits beyond the entry; without one a fixed percentage offset is used.
pub fn prepare_signal(
    direction: Direction,
    poi: &Poi,
    entry_candles: &[Candle],
    params: &SmcParams,
) -> TradeSignal {
    let swings = detect_swings(entry_candles);
    let (entry, stop_loss, take_profit) = match direction {
        Direction::Buy => {
            let entry = poi.low;
            let target = swings
                .highs
                .iter()
                .find(|s| s.time() > poi.time && s.price() > entry)
                .map(|s| s.price())
                .unwrap_or(entry * (1.0 + params.fallback_target_pct));
            (entry, poi.low * (1.0 - params.stop_buffer_pct), target)
        }
        Direction::Sell => {
            let entry = poi.high;
            let target = swings
                .lows
                .iter()
                .find(|s| s.time() > poi.time && s.price() < entry)
                .map(|s| s.price())
                .unwrap_or(entry * (1.0 - params.fallback_target_pct));
            (entry, poi.high * (1.0 + params.stop_buffer_pct), target)
        }
    };

    TradeSignal {
        direction,
        entry,
        stop_loss,
        take_profit,
        poi: *poi,
    }
}
