//! Indicator weight table and score combination.
//!
//! Weights are resolved once, when the analyzer is built, from the
//! configured overrides and the registered indicators. Every correction
//! made along the way is logged and kept on the table for inspection.

use std::collections::{BTreeMap, HashMap};

use confluence_core::{
    clamp_score, ComponentBreakdown, ComponentResult, EngineError, NEUTRAL_SCORE,
};

/// Allowed deviation of the weight sum from 1 before rescaling.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Normalized indicator weights, summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    weights: BTreeMap<String, f64>,
    corrections: Vec<EngineError>,
}

/// Output of [`WeightTable::combine`].
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub confluence_score: f64,
    pub reliability: f64,
    pub scores: BTreeMap<String, f64>,
    pub components: BTreeMap<String, ComponentBreakdown>,
}

fn usable_weight(w: f64) -> bool {
    w.is_finite() && w >= 0.0
}

impl WeightTable {
    /// Builds the table for `indicators` from configured overrides.
    ///
    /// - Invalid (negative or non-finite) overrides are treated as missing.
    /// - Missing indicators get `default_weight`.
    /// - Overrides for unregistered indicators are discarded.
    /// - The result is rescaled to sum to 1; all-zero weights become uniform.
    #[must_use]
    pub fn from_config<'a>(
        indicators: impl IntoIterator<Item = &'a str>,
        configured: &HashMap<String, f64>,
        default_weight: f64,
    ) -> Self {
        let mut corrections = Vec::new();
        let mut correct = |message: String| {
            tracing::warn!("{message}");
            corrections.push(EngineError::Configuration(message));
        };

        let default_weight = if usable_weight(default_weight) {
            default_weight
        } else {
            correct(format!("default weight {default_weight} is invalid, using 0"));
            0.0
        };

        let mut weights = BTreeMap::new();
        for name in indicators {
            let weight = match configured.get(name) {
                Some(&w) if usable_weight(w) => w,
                Some(&w) => {
                    correct(format!(
                        "weight {w} for '{name}' is invalid, using default {default_weight}"
                    ));
                    default_weight
                }
                None => {
                    correct(format!(
                        "no weight configured for '{name}', using default {default_weight}"
                    ));
                    default_weight
                }
            };
            weights.insert(name.to_string(), weight);
        }

        let mut unknown: Vec<&String> = configured
            .keys()
            .filter(|k| !weights.contains_key(k.as_str()))
            .collect();
        unknown.sort();
        for name in unknown {
            correct(format!("weight configured for unregistered indicator '{name}', ignoring"));
        }

        if !weights.is_empty() {
            let total: f64 = weights.values().sum();
            if total <= 0.0 {
                correct("all weights are zero, using equal weights".to_string());
                let uniform = 1.0 / weights.len() as f64;
                weights.values_mut().for_each(|w| *w = uniform);
            } else if (total - 1.0).abs() > WEIGHT_TOLERANCE {
                correct(format!("weights sum to {total:.6}, rescaling to 1"));
                weights.values_mut().for_each(|w| *w /= total);
            }
        }

        Self {
            weights,
            corrections,
        }
    }

    /// Weight of an indicator, 0 if unknown.
    #[must_use]
    pub fn weight(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Corrections applied while building the table.
    #[must_use]
    pub fn corrections(&self) -> &[EngineError] {
        &self.corrections
    }

    /// Combines per-indicator results into the confluence score.
    ///
    /// Indicators in the table without a result count as neutral. Results
    /// for indicators not in the table are ignored. Pure: the same inputs
    /// always give the same output.
    #[must_use]
    pub fn combine(&self, results: &BTreeMap<String, ComponentResult>) -> Combination {
        let mut scores = BTreeMap::new();
        let mut components = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut non_neutral = 0usize;

        for (name, &weight) in &self.weights {
            let (score, sub_scores, signals) = match results.get(name) {
                Some(r) => (clamp_score(r.score), r.components.clone(), r.signals.clone()),
                None => (NEUTRAL_SCORE, BTreeMap::new(), BTreeMap::new()),
            };
            if score != NEUTRAL_SCORE {
                non_neutral += 1;
            }

            let contribution = score * weight;
            weighted_sum += contribution;
            scores.insert(name.clone(), score);
            components.insert(
                name.clone(),
                ComponentBreakdown {
                    score,
                    weight,
                    contribution,
                    sub_scores,
                    signals,
                },
            );
        }

        let reliability = if self.weights.is_empty() {
            0.0
        } else {
            non_neutral as f64 / self.weights.len() as f64
        };

        Combination {
            confluence_score: clamp_score(weighted_sum),
            reliability,
            scores,
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn weights(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn results(pairs: &[(&str, f64)]) -> BTreeMap<String, ComponentResult> {
        pairs
            .iter()
            .map(|(k, s)| ((*k).to_string(), ComponentResult::new(*s)))
            .collect()
    }

    // ============================================
    // Normalization Tests
    // ============================================

    #[test]
    fn balanced_weights_are_kept() {
        let table = WeightTable::from_config(
            ["a", "b"],
            &weights(&[("a", 0.25), ("b", 0.75)]),
            0.05,
        );
        assert_eq!(table.weight("a"), 0.25);
        assert!(table.corrections().is_empty());
    }

    #[test]
    fn unbalanced_weights_are_rescaled() {
        let table = WeightTable::from_config(["a", "b"], &weights(&[("a", 1.0), ("b", 3.0)]), 0.05);
        assert!((table.weight("a") - 0.25).abs() < 1e-12);
        assert!((table.total() - 1.0).abs() < 1e-12);
        assert_eq!(table.corrections().len(), 1);
    }

    #[test]
    fn missing_indicator_gets_default_weight() {
        let table = WeightTable::from_config(
            ["a", "b", "c"],
            &weights(&[("a", 0.5), ("b", 0.45)]),
            0.05,
        );
        assert!((table.weight("c") - 0.05).abs() < 1e-12);
        assert!(matches!(
            table.corrections()[0],
            EngineError::Configuration(ref m) if m.contains("'c'")
        ));
    }

    #[test]
    fn invalid_and_unknown_weights_are_corrected() {
        let table = WeightTable::from_config(
            ["a", "b"],
            &weights(&[("a", f64::NAN), ("b", 0.5), ("ghost", 0.5)]),
            0.5,
        );
        assert_eq!(table.len(), 2);
        assert!((table.weight("a") - 0.5).abs() < 1e-12);
        assert_eq!(table.weight("ghost"), 0.0);
        assert_eq!(table.corrections().len(), 2);
    }

    #[test]
    fn all_zero_weights_become_uniform() {
        let table = WeightTable::from_config(["a", "b", "c", "d"], &HashMap::new(), 0.0);
        assert!(table.iter().all(|(_, w)| (w - 0.25).abs() < 1e-12));
    }

    #[test]
    fn empty_table_combines_to_neutral() {
        let table = WeightTable::from_config(Vec::<&str>::new(), &HashMap::new(), 0.05);
        let c = table.combine(&BTreeMap::new());
        assert_eq!(c.confluence_score, NEUTRAL_SCORE);
        assert_eq!(c.reliability, 0.0);
    }

    // ============================================
    // Combination Tests
    // ============================================

    #[test]
    fn weighted_sum_and_breakdown() {
        let table =
            WeightTable::from_config(["a", "b"], &weights(&[("a", 0.6), ("b", 0.4)]), 0.05);
        let c = table.combine(&results(&[("a", 80.0), ("b", 30.0)]));

        assert!((c.confluence_score - 60.0).abs() < 1e-9);
        assert!((c.components["a"].contribution - 48.0).abs() < 1e-9);
        assert_eq!(c.reliability, 1.0);
    }

    #[test]
    fn missing_results_count_as_neutral() {
        let table =
            WeightTable::from_config(["a", "b"], &weights(&[("a", 0.5), ("b", 0.5)]), 0.05);
        let c = table.combine(&results(&[("a", 70.0)]));

        assert_eq!(c.scores["b"], NEUTRAL_SCORE);
        assert!((c.confluence_score - 60.0).abs() < 1e-9);
        assert!((c.reliability - 0.5).abs() < 1e-12);
    }

    #[test]
    fn all_neutral_means_zero_reliability() {
        let table = WeightTable::from_config(["a", "b"], &HashMap::new(), 0.5);
        let c = table.combine(&results(&[("a", 50.0), ("b", 50.0)]));
        assert_eq!(c.reliability, 0.0);
        assert_eq!(c.confluence_score, NEUTRAL_SCORE);
    }

    #[test]
    fn six_indicator_scenario() {
        let cfg = confluence_core::EngineConfig::default();
        let table = WeightTable::from_config(
            cfg.indicators.iter().map(String::as_str),
            &cfg.weights,
            cfg.default_weight,
        );
        let c = table.combine(&results(&[("orderbook", 72.0)]));

        let expected = 5.0 * 50.0 * 0.17 + 72.0 * 0.15;
        assert!((c.confluence_score - expected).abs() < 1e-9);
        assert!((c.reliability - 1.0 / 6.0).abs() < 1e-12);
    }

    // ============================================
    // Properties
    // ============================================

    proptest! {
        #[test]
        fn normalized_weights_sum_to_one(
            raw in prop::collection::vec(prop_oneof![0.0..10.0_f64, Just(f64::NAN), Just(-1.0)], 1..8),
            default in 0.0..1.0_f64,
        ) {
            let names: Vec<String> = (0..raw.len()).map(|i| format!("ind{i}")).collect();
            let configured: HashMap<String, f64> =
                names.iter().cloned().zip(raw.iter().copied()).collect();
            let table = WeightTable::from_config(names.iter().map(String::as_str), &configured, default);

            prop_assert_eq!(table.len(), names.len());
            prop_assert!((table.total() - 1.0).abs() <= WEIGHT_TOLERANCE);
        }

        #[test]
        fn confluence_is_bounded_and_deterministic(
            scores in prop::collection::vec(-50.0..150.0_f64, 1..8),
        ) {
            let names: Vec<String> = (0..scores.len()).map(|i| format!("ind{i}")).collect();
            let table = WeightTable::from_config(names.iter().map(String::as_str), &HashMap::new(), 1.0);
            let input: BTreeMap<String, ComponentResult> = names
                .iter()
                .cloned()
                .zip(scores.iter().map(|s| ComponentResult { score: *s, ..ComponentResult::neutral() }))
                .collect();

            let a = table.combine(&input);
            let b = table.combine(&input);
            prop_assert!((0.0..=100.0).contains(&a.confluence_score));
            prop_assert!((0.0..=1.0).contains(&a.reliability));
            prop_assert_eq!(a, b);
        }
    }
}
