//! Price/volume indicator helpers behind the technical and momentum factors.
//!
//! Each helper works on the already as-of sliced history and returns a
//! neutral value when the history is too short.

use crate::domain::bar::Bar;
use crate::domain::stats::{mean, sample_std};

/// Simple return over the last `lookback` steps; 0 when history is short.
pub fn calc_return(close: &[f64], lookback: usize) -> f64 {
    if close.len() <= lookback {
        return 0.0;
    }
    let prev = close[close.len() - 1 - lookback];
    let cur = close[close.len() - 1];
    if prev <= 0.0 {
        return 0.0;
    }
    cur / prev - 1.0
}

/// EMA seeded with the first value: k = 2/(n+1), e[i] = k*x[i] + (1-k)*e[i-1].
pub fn ema(series: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = series.first() else {
        return Vec::new();
    };
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    out.push(first);
    for &x in &series[1..] {
        let prev = out[out.len() - 1];
        out.push(k * x + (1.0 - k) * prev);
    }
    out
}

/// RSI from simple averages of the last `period` gains and losses.
/// 50 with too little history, 100 when there are no losses.
pub fn rsi(close: &[f64], period: usize) -> f64 {
    let n = close.len();
    if period == 0 || n < period + 1 {
        return 50.0;
    }
    let (gains, losses): (Vec<f64>, Vec<f64>) = close[n - period - 1..]
        .windows(2)
        .map(|w| {
            let diff = w[1] - w[0];
            (diff.max(0.0), (-diff).max(0.0))
        })
        .unzip();
    let avg_gain = mean(&gains);
    let avg_loss = mean(&losses);
    if avg_loss <= 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD(12, 26) minus its 9-period signal line at the last bar.
pub fn macd_signal_delta(close: &[f64]) -> f64 {
    if close.len() < 35 {
        return 0.0;
    }
    let fast = ema(close, 12);
    let slow = ema(close, 26);
    let macd: Vec<f64> = fast.iter().zip(&slow).map(|(a, b)| a - b).collect();
    let signal = ema(&macd, 9);
    match (macd.last(), signal.last()) {
        (Some(m), Some(s)) => m - s,
        _ => 0.0,
    }
}

/// Position of the last close inside 2-sigma Bollinger bands, scaled to
/// `[0, 100]`. Uses the sample deviation; 50 when the band has no width.
pub fn bb_position(close: &[f64], period: usize) -> f64 {
    if period == 0 || close.len() < period {
        return 50.0;
    }
    let window = &close[close.len() - period..];
    let m = mean(window);
    let s = sample_std(window);
    let lower = m - 2.0 * s;
    let width = 4.0 * s;
    if width <= 0.0 {
        return 50.0;
    }
    let last = close[close.len() - 1];
    ((last - lower) / width * 100.0).clamp(0.0, 100.0)
}

/// Last volume over the mean of the `period` volumes before it; 1 when unknown.
pub fn volume_ratio(bars: &[Bar], period: usize) -> f64 {
    let n = bars.len();
    if period == 0 || n < period + 1 {
        return 1.0;
    }
    let prior: Vec<f64> = bars[n - period - 1..n - 1].iter().map(|b| b.volume).collect();
    let avg = mean(&prior);
    if avg <= 0.0 {
        return 1.0;
    }
    bars[n - 1].volume / avg
}

/// Average true range over `period` bars as a fraction of the last close.
pub fn atr_pct(bars: &[Bar], period: usize) -> f64 {
    let n = bars.len();
    if period == 0 || n < period + 1 {
        return 0.0;
    }
    let trs: Vec<f64> = bars[n - period - 1..]
        .windows(2)
        .map(|w| w[1].true_range(w[0].close).max(0.0))
        .collect();
    let price = bars[n - 1].close;
    if price <= 0.0 {
        return 0.0;
    }
    mean(&trs) / price
}
