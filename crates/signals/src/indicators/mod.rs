//! Reference indicator adapters.
//!
//! Thin numeric computations over a [`MarketSnapshot`], each feeding its
//! raw measurements through the transform library. They exist so the
//! engine is usable end to end; none of them claims statistical calibration.
//!
//! [`MarketSnapshot`]: confluence_core::MarketSnapshot

mod orderbook;
mod orderflow;
mod sentiment;
mod structure;
mod technical;
mod volume;

use std::sync::Arc;

use confluence_core::{EngineConfig, IndicatorAdapter};

pub use orderbook::OrderBookIndicator;
pub use orderflow::{trade_imbalance, OrderFlowIndicator};
pub use sentiment::SentimentIndicator;
pub use structure::PriceStructureIndicator;
pub use technical::{rsi, TechnicalIndicator};
pub use volume::VolumeIndicator;

/// Names accepted by [`build`].
pub const REFERENCE_INDICATORS: [&str; 6] = [
    "technical",
    "volume",
    "orderflow",
    "orderbook",
    "sentiment",
    "price_structure",
];

/// Builds a reference indicator by name.
#[must_use]
pub fn build(name: &str, config: &EngineConfig) -> Option<Arc<dyn IndicatorAdapter>> {
    let transforms = &config.transforms;
    let timeframes = &config.timeframes;
    let adapter: Arc<dyn IndicatorAdapter> = match name {
        "technical" => Arc::new(TechnicalIndicator::new(transforms, timeframes)),
        "volume" => Arc::new(VolumeIndicator::new(transforms, timeframes)),
        "orderflow" => Arc::new(OrderFlowIndicator::new(transforms)),
        "orderbook" => Arc::new(OrderBookIndicator::new(transforms)),
        "sentiment" => Arc::new(SentimentIndicator::new(transforms)),
        "price_structure" => Arc::new(PriceStructureIndicator::new(transforms, timeframes)),
        _ => return None,
    };
    Some(adapter)
}

/// Label for a directional score.
pub(crate) fn bias_label(score: f64) -> &'static str {
    if score > 55.0 {
        "bullish"
    } else if score < 45.0 {
        "bearish"
    } else {
        "neutral"
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_reference_indicator() {
        let cfg = EngineConfig::default();
        for name in REFERENCE_INDICATORS {
            let adapter = build(name, &cfg).unwrap();
            assert_eq!(adapter.name(), name);
        }
        assert!(build("unknown", &cfg).is_none());
    }

    #[test]
    fn bias_labels() {
        assert_eq!(bias_label(70.0), "bullish");
        assert_eq!(bias_label(50.0), "neutral");
        assert_eq!(bias_label(20.0), "bearish");
    }
}
