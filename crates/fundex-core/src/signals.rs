//! Price-series indicators used by the deep dive: MACD, RSI, the combined
//! trend score, the buy/sell decision and grid levels.

use serde::{Deserialize, Serialize};

use crate::valuation::ValuationStatus;

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const RSI_PERIOD: usize = 14;
/// Closes needed before a trend score is reported.
pub const TREND_MIN_CLOSES: usize = MACD_SLOW + MACD_SIGNAL;
/// Distance of the grid levels from the last price.
pub const GRID_STEP: f64 = 0.015;

/// Exponential moving average seeded with the first value, smoothing
/// `2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut output = Vec::with_capacity(values.len());
    let mut previous = None;
    for value in values {
        let next = match previous {
            Some(previous) => alpha * value + (1.0 - alpha) * previous,
            None => *value,
        };
        output.push(next);
        previous = Some(next);
    }
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
}

impl Macd {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }

    pub fn is_bullish(&self) -> bool {
        self.macd > self.signal
    }
}

/// Latest MACD(12, 26) line and its 9-period signal line.
pub fn macd(closes: &[f64]) -> Option<Macd> {
    if closes.is_empty() {
        return None;
    }
    let fast = ema(closes, MACD_FAST);
    let slow = ema(closes, MACD_SLOW);
    let line = fast
        .iter()
        .zip(&slow)
        .map(|(fast, slow)| fast - slow)
        .collect::<Vec<_>>();
    let signal = ema(&line, MACD_SIGNAL);
    Some(Macd {
        macd: *line.last()?,
        signal: *signal.last()?,
    })
}

/// RSI over the last `period` price changes, simple averages.
///
/// A window with no losses reads 100; a flat window reads 50.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let window = &closes[closes.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), delta| {
            if delta > 0.0 {
                (gains + delta, losses)
            } else {
                (gains, losses - delta)
            }
        });

    if losses == 0.0 {
        return Some(if gains == 0.0 { 50.0 } else { 100.0 });
    }
    let relative_strength = gains / losses;
    Some(100.0 - 100.0 / (1.0 + relative_strength))
}

/// Combined momentum read on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub score: u8,
    pub macd: Macd,
    pub rsi: f64,
}

/// Starts at 50; +20 when MACD is above its signal; +30 when RSI < 30,
/// -30 when RSI > 70, +10 otherwise. `None` below [`TREND_MIN_CLOSES`].
pub fn trend_signal(closes: &[f64]) -> Option<TrendSignal> {
    if closes.len() < TREND_MIN_CLOSES {
        return None;
    }
    let macd = macd(closes)?;
    let rsi = rsi(closes, RSI_PERIOD)?;

    let mut score: i32 = 50;
    if macd.is_bullish() {
        score += 20;
    }
    if rsi < 30.0 {
        score += 30;
    } else if rsi > 70.0 {
        score -= 30;
    } else {
        score += 10;
    }

    Some(TrendSignal {
        score: u8::try_from(score.clamp(0, 100)).unwrap_or(u8::MAX),
        macd,
        rsi,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Undervalued with a rising trend.
    Opportunity,
    /// Overvalued with a weak trend.
    Risk,
    /// Strong trend regardless of valuation.
    Momentum,
    Watch,
}

impl Decision {
    pub fn decide(status: Option<ValuationStatus>, trend: Option<u8>) -> Self {
        match (status, trend) {
            (Some(ValuationStatus::Undervalued), Some(score)) if score > 60 => Self::Opportunity,
            (Some(ValuationStatus::Overvalued), Some(score)) if score < 40 => Self::Risk,
            (_, Some(score)) if score > 80 => Self::Momentum,
            _ => Self::Watch,
        }
    }
}

/// Resistance, base and support around the last price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLevels {
    pub resistance: f64,
    pub base: f64,
    pub support: f64,
}

impl GridLevels {
    pub fn around(price: f64) -> Self {
        let step = price * GRID_STEP;
        Self {
            resistance: price + step,
            base: price,
            support: price - step,
        }
    }
}
