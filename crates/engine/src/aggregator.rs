use tracing::{debug, warn};

use common::{Candle, Error, Result, Tick, Timeframe};

/// Builds fixed-interval candles for one timeframe from a tick stream.
///
/// Holds at most one open bar. A tick in a later bucket closes the open bar
/// and seeds the next one, so a bar is only ever reported once, on the first
/// tick past its bucket.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    timeframe: Timeframe,
    duration_secs: i64,
    open: Option<Candle>,
    closed: Vec<Candle>,
}

impl CandleAggregator {
    pub fn new(timeframe: Timeframe, duration_secs: i64) -> Result<Self> {
        if duration_secs <= 0 {
            return Err(Error::Config(format!(
                "{timeframe} candle duration must be positive, got {duration_secs}s"
            )));
        }
        Ok(Self {
            timeframe,
            duration_secs,
            open: None,
            closed: Vec::new(),
        })
    }

    /// Start from already closed candles, e.g. a warm-up download.
    ///
    /// History must be strictly ascending in time; the next tick has to fall
    /// in a bucket after the last historical bar.
    pub fn with_history(timeframe: Timeframe, duration_secs: i64, history: Vec<Candle>) -> Result<Self> {
        let mut agg = Self::new(timeframe, duration_secs)?;
        for (i, mut candle) in history.into_iter().enumerate() {
            candle
                .validate()
                .map_err(|e| Error::Config(format!("{timeframe} history position {i}: {e}")))?;
            if let Some(prev) = agg.closed.last() {
                if candle.time <= prev.time {
                    return Err(Error::Config(format!(
                        "{timeframe} history out of order at position {i}: {} after {}",
                        candle.time, prev.time
                    )));
                }
            }
            candle.index = i;
            agg.closed.push(candle);
        }
        Ok(agg)
    }

    /// Closed candles, oldest first.
    pub fn closed(&self) -> &[Candle] {
        &self.closed
    }

    /// The bar currently being built, if any tick has arrived for it.
    pub fn open_bar(&self) -> Option<&Candle> {
        self.open.as_ref()
    }

    /// Start of the bucket containing `epoch_secs`.
    pub fn bucket_start(&self, epoch_secs: i64) -> i64 {
        epoch_secs.div_euclid(self.duration_secs) * self.duration_secs
    }

    /// Reject a tick whose bucket lies before the open bar (or before the
    /// last closed bar). Never mutates.
    pub fn check(&self, tick: &Tick) -> Result<()> {
        let bucket = self.bucket_start(tick.timestamp.timestamp());
        let current = self.open.as_ref().map(|c| c.time).or_else(|| self.closed.last().map(|c| c.time + 1));
        match current {
            Some(current) if bucket < current => {
                warn!(
                    timeframe = %self.timeframe,
                    bucket = bucket,
                    current = current,
                    "Out-of-order tick rejected"
                );
                Err(Error::InvalidTick(format!(
                    "{} tick in bucket {bucket} arrived after bucket {current}",
                    self.timeframe
                )))
            }
            _ => Ok(()),
        }
    }

    /// Fold one tick in. Returns the bar it closed, if any.
    ///
    /// A tick failing [`check`](Self::check) leaves the aggregator untouched.
    pub fn on_tick(&mut self, tick: &Tick) -> Result<Option<Candle>> {
        self.check(tick)?;
        Ok(self.apply(tick))
    }

    /// Fold a tick that already passed [`check`](Self::check).
    pub fn apply(&mut self, tick: &Tick) -> Option<Candle> {
        let bucket = self.bucket_start(tick.timestamp.timestamp());
        let volume = tick.quantity.unwrap_or(0.0);

        match self.open.as_mut() {
            Some(bar) if bar.time == bucket => {
                bar.high = bar.high.max(tick.price);
                bar.low = bar.low.min(tick.price);
                bar.close = tick.price;
                bar.volume += volume;
                None
            }
            _ => {
                let finished = self.open.take().map(|mut bar| {
                    bar.index = self.closed.len();
                    self.closed.push(bar);
                    debug!(
                        timeframe = %self.timeframe,
                        time = bar.time,
                        open = bar.open,
                        high = bar.high,
                        low = bar.low,
                        close = bar.close,
                        "Candle closed"
                    );
                    bar
                });
                let mut seed = Candle::new(bucket, tick.price, tick.price, tick.price, tick.price);
                seed.volume = volume;
                seed.index = self.closed.len();
                self.open = Some(seed);
                finished
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
