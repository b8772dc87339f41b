//! Bounded nonlinear score transforms.
//!
//! Every function maps a raw value onto [0, 100]. Non-finite input and
//! invalid shape parameters yield the neutral score instead of an error, so
//! indicators can feed raw measurements straight through.
//!
//! ## Shapes
//!
//! | Transform | Use |
//! |-----------|-----|
//! | [`sigmoid`] | smooth response around a centre point |
//! | [`extreme_value`] | keeps very large readings distinguishable |
//! | [`hyperbolic`] | signed inputs such as imbalance ratios |
//! | [`exponential_decay`] | closeness to a price level |
//! | [`bounded_oscillator`] | inputs already bounded, e.g. RSI |

use confluence_core::{TransformConfig, NEUTRAL_SCORE};
use serde::{Deserialize, Serialize};

/// `ln(20)`: the exponential tails reach 95% of their range at the edge.
const TAIL_RATE: f64 = 2.995_732_273_553_991;

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn bounded(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// Logistic curve: `100 / (1 + e^{-(x - center) * steepness})`.
#[must_use]
pub fn sigmoid(x: f64, center: f64, steepness: f64) -> f64 {
    if !x.is_finite() || !center.is_finite() || !positive(steepness) {
        return NEUTRAL_SCORE;
    }
    bounded(100.0 / (1.0 + (-(x - center) * steepness).exp()))
}

/// Linear up to `threshold` (scoring 50 there), then an exponential
/// approach towards 100 that reaches 95% of the upper range at `max`.
///
/// Inputs past `max` keep gaining score, just more slowly.
#[must_use]
pub fn extreme_value(x: f64, threshold: f64, max: f64) -> f64 {
    if !x.is_finite() || !positive(threshold) || !max.is_finite() || max <= threshold {
        return NEUTRAL_SCORE;
    }

    let threshold_score = NEUTRAL_SCORE;
    if x <= threshold {
        return bounded(threshold_score * x / threshold);
    }

    let k = TAIL_RATE / (max - threshold);
    bounded(threshold_score + (100.0 - threshold_score) * (1.0 - (-(x - threshold) * k).exp()))
}

/// `50 * (1 + tanh(x * sensitivity))`, symmetric around 0.
#[must_use]
pub fn hyperbolic(x: f64, sensitivity: f64) -> f64 {
    if !x.is_finite() || !positive(sensitivity) {
        return NEUTRAL_SCORE;
    }
    bounded(50.0 * (1.0 + (x * sensitivity).tanh()))
}

/// 100 at `target`, halving every `half_life` of distance on either side.
#[must_use]
pub fn exponential_decay(x: f64, target: f64, half_life: f64) -> f64 {
    if !x.is_finite() || !target.is_finite() || !positive(half_life) {
        return NEUTRAL_SCORE;
    }
    let distance = (x - target).abs();
    bounded(100.0 * (-std::f64::consts::LN_2 * distance / half_life).exp())
}

/// Band definition for [`bounded_oscillator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillatorBands {
    /// Lower edge of the neutral band
    pub low: f64,
    /// Upper edge of the neutral band
    pub high: f64,
    /// Smallest value the oscillator normally takes
    pub range_min: f64,
    /// Largest value the oscillator normally takes
    pub range_max: f64,
    /// Sigmoid steepness inside the band
    pub steepness: f64,
}

impl Default for OscillatorBands {
    fn default() -> Self {
        Self {
            low: 30.0,
            high: 70.0,
            range_min: 0.0,
            range_max: 100.0,
            steepness: 0.1,
        }
    }
}

impl OscillatorBands {
    fn is_valid(&self) -> bool {
        [self.low, self.high, self.range_min, self.range_max]
            .iter()
            .all(|v| v.is_finite())
            && positive(self.steepness)
            && self.range_min < self.low
            && self.low < self.high
            && self.high < self.range_max
    }
}

/// Score for an input already bounded in a known range.
///
/// Inside `[low, high]` this is a sigmoid centred on the band midpoint.
/// Beyond either edge the remaining distance to 0 / 100 is compressed
/// exponentially, so two different extreme readings never collapse onto
/// the same score.
#[must_use]
pub fn bounded_oscillator(x: f64, bands: OscillatorBands) -> f64 {
    if !x.is_finite() || !bands.is_valid() {
        return NEUTRAL_SCORE;
    }

    let mid = (bands.low + bands.high) / 2.0;
    let band = |v: f64| sigmoid(v, mid, bands.steepness);

    if x > bands.high {
        let edge = band(bands.high);
        let k = TAIL_RATE / (bands.range_max - bands.high);
        bounded(edge + (100.0 - edge) * (1.0 - (-(x - bands.high) * k).exp()))
    } else if x < bands.low {
        let edge = band(bands.low);
        let k = TAIL_RATE / (bands.low - bands.range_min);
        bounded(edge * (-(bands.low - x) * k).exp())
    } else {
        band(x)
    }
}

/// A transform with its shape parameters, dispatched exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreTransform {
    Sigmoid { center: f64, steepness: f64 },
    ExtremeValue { threshold: f64, max: f64 },
    Hyperbolic { sensitivity: f64 },
    ExponentialDecay { target: f64, half_life: f64 },
    BoundedOscillator(OscillatorBands),
}

impl ScoreTransform {
    /// Applies the transform to a raw value.
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Self::Sigmoid { center, steepness } => sigmoid(x, center, steepness),
            Self::ExtremeValue { threshold, max } => extreme_value(x, threshold, max),
            Self::Hyperbolic { sensitivity } => hyperbolic(x, sensitivity),
            Self::ExponentialDecay { target, half_life } => {
                exponential_decay(x, target, half_life)
            }
            Self::BoundedOscillator(bands) => bounded_oscillator(x, bands),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sigmoid { .. } => "sigmoid",
            Self::ExtremeValue { .. } => "extreme_value",
            Self::Hyperbolic { .. } => "hyperbolic",
            Self::ExponentialDecay { .. } => "exponential_decay",
            Self::BoundedOscillator(_) => "bounded_oscillator",
        }
    }

    /// Sigmoid for ratio inputs centred on 1.0, using the configured steepness.
    #[must_use]
    pub fn ratio(config: &TransformConfig) -> Self {
        Self::Sigmoid {
            center: 1.0,
            steepness: config.sigmoid_steepness,
        }
    }

    /// Hyperbolic for signed imbalances, using the configured sensitivity.
    #[must_use]
    pub fn imbalance(config: &TransformConfig) -> Self {
        Self::Hyperbolic {
            sensitivity: config.hyperbolic_sensitivity,
        }
    }

    /// 0–100 oscillator with the configured neutral band.
    #[must_use]
    pub fn oscillator(config: &TransformConfig) -> Self {
        Self::BoundedOscillator(OscillatorBands {
            low: config.oscillator_low,
            high: config.oscillator_high,
            range_min: 0.0,
            range_max: 100.0,
            steepness: config.oscillator_steepness,
        })
    }

    /// Proximity to `target`, with a half-life expressed as a percentage of it.
    #[must_use]
    pub fn proximity(target: f64, config: &TransformConfig) -> Self {
        Self::ExponentialDecay {
            target,
            half_life: target.abs() * config.decay_half_life_pct / 100.0,
        }
    }
}
