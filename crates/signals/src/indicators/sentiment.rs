//! Derivatives positioning: funding, long/short ratio, liquidations.
//!
//! All three read contrarian: crowded longs (high funding, high long/short
//! ratio) score bearish, and a flush of long liquidations scores bullish.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use confluence_core::{
    ComponentResult, DataClass, IndicatorAdapter, MarketSnapshot, PositionSide, Sentiment,
    TransformConfig,
};
use serde_json::json;

use super::{bias_label, mean};
use crate::transform::ScoreTransform;

#[derive(Debug, Clone)]
pub struct SentimentIndicator {
    /// Funding extremity, in basis points
    funding: ScoreTransform,
    imbalance: ScoreTransform,
}

impl SentimentIndicator {
    #[must_use]
    pub fn new(transforms: &TransformConfig) -> Self {
        Self {
            funding: ScoreTransform::ExtremeValue {
                threshold: 1.0,
                max: 10.0,
            },
            imbalance: ScoreTransform::imbalance(transforms),
        }
    }

    /// Contrarian funding score: 50 ± half the extremity.
    fn funding_score(&self, rate: f64) -> f64 {
        let bps = rate * 10_000.0;
        let extremity = self.funding.apply(bps.abs());
        50.0 - bps.signum() * extremity / 2.0
    }

    fn ratio_score(&self, long_short: f64) -> Option<f64> {
        (long_short > 0.0 && long_short.is_finite())
            .then(|| self.imbalance.apply(-long_short.ln()))
    }

    fn liquidation_score(&self, sentiment: &Sentiment) -> Option<(f64, f64)> {
        let (mut longs, mut shorts) = (0.0, 0.0);
        for liq in sentiment.liquidations.iter().filter(|l| l.size.is_finite()) {
            match liq.side {
                PositionSide::Long => longs += liq.size.abs(),
                PositionSide::Short => shorts += liq.size.abs(),
            }
        }
        let total = longs + shorts;
        (total > 0.0).then(|| {
            let raw = (longs - shorts) / total;
            (raw, self.imbalance.apply(raw))
        })
    }
}

#[async_trait]
impl IndicatorAdapter for SentimentIndicator {
    async fn compute(&self, snapshot: &MarketSnapshot) -> Result<ComponentResult> {
        let sentiment = snapshot
            .sentiment
            .as_ref()
            .ok_or_else(|| anyhow!("no sentiment data"))?;

        let mut parts = Vec::with_capacity(3);
        let mut result = ComponentResult::neutral();

        if let Some(rate) = sentiment.funding_rate.filter(|r| r.is_finite()) {
            let s = self.funding_score(rate);
            parts.push(s);
            result = result
                .with_component("funding", s)
                .with_metadata("funding_rate", rate);
        }
        if let Some(ratio) = sentiment.long_short_ratio {
            if let Some(s) = self.ratio_score(ratio) {
                parts.push(s);
                result = result
                    .with_component("long_short", s)
                    .with_metadata("long_short_ratio", ratio);
            }
        }
        if let Some((raw, s)) = self.liquidation_score(sentiment) {
            parts.push(s);
            result = result
                .with_component("liquidations", s)
                .with_metadata("liquidation_imbalance", raw);
        }

        let Some(score) = mean(&parts) else {
            bail!("sentiment payload has no usable fields");
        };

        let mut out = ComponentResult::new(score).with_signal("positioning", bias_label(score));
        out.components = result.components;
        out.metadata = result.metadata;
        Ok(out)
    }

    fn name(&self) -> &str {
        "sentiment"
    }

    fn data_class(&self) -> DataClass {
        DataClass::Sentiment
    }

    fn can_run(&self, snapshot: &MarketSnapshot) -> bool {
        snapshot.sentiment.as_ref().is_some_and(|s| {
            s.funding_rate.is_some() || s.long_short_ratio.is_some() || !s.liquidations.is_empty()
        })
    }

    fn cache_params(&self) -> serde_json::Value {
        json!({ "funding": self.funding, "imbalance": self.imbalance })
    }

    fn cache_input(&self, snapshot: &MarketSnapshot) -> Option<serde_json::Value> {
        serde_json::to_value(&snapshot.sentiment).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluence_core::Liquidation;

    fn snapshot(sentiment: Sentiment) -> MarketSnapshot {
        MarketSnapshot::new("BTCUSDT", 1).with_sentiment(sentiment)
    }

    fn indicator() -> SentimentIndicator {
        SentimentIndicator::new(&TransformConfig::default())
    }

    #[tokio::test]
    async fn crowded_longs_score_bearish() {
        let snap = snapshot(Sentiment {
            funding_rate: Some(0.0005),
            long_short_ratio: Some(2.0),
            liquidations: Vec::new(),
        });
        let result = indicator().compute(&snap).await.unwrap();

        assert!(result.score < 30.0);
        assert_eq!(result.signals["positioning"], "bearish");
    }

    #[tokio::test]
    async fn extreme_funding_stays_distinguishable() {
        let ind = indicator();
        let a = ind.funding_score(0.0015);
        let b = ind.funding_score(0.0030);
        assert!(b < a);
        assert!(b > 0.0);
    }

    #[tokio::test]
    async fn long_liquidation_flush_scores_bullish() {
        let snap = snapshot(Sentiment {
            funding_rate: None,
            long_short_ratio: None,
            liquidations: vec![
                Liquidation {
                    side: PositionSide::Long,
                    size: 9.0,
                    time: 0,
                },
                Liquidation {
                    side: PositionSide::Short,
                    size: 1.0,
                    time: 0,
                },
            ],
        });
        let result = indicator().compute(&snap).await.unwrap();
        assert!(result.score > 80.0);
    }

    #[tokio::test]
    async fn empty_sentiment_cannot_run() {
        let snap = snapshot(Sentiment::default());
        let ind = indicator();
        assert!(!ind.can_run(&snap));
        assert!(ind.compute(&snap).await.is_err());
        assert!(!ind.can_run(&MarketSnapshot::new("X", 1)));
    }

    #[test]
    fn zero_funding_is_neutral() {
        assert_eq!(indicator().funding_score(0.0), 50.0);
    }
}
