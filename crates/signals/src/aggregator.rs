//! Weighted confluence aggregator.
//!
//! [`ConfluenceAnalyzer`] is the entry point of the engine. One call to
//! [`analyze`](ConfluenceAnalyzer::analyze) runs the whole pipeline:
//!
//! ```text
//! raw payload -> validator -> normalizer -> snapshot
//!             -> indicator adapters (concurrent, optionally cached)
//!             -> weight table -> ConfluenceResult
//! ```
//!
//! Every failure along the way degrades to a documented default. The
//! caller always gets a `ConfluenceResult`; the worst case is the
//! complete default (score 50, reliability 0) with `metadata.error` set.

use std::collections::BTreeMap;
use std::sync::Arc;

use confluence_core::{
    clamp_score, ComponentResult, ConfluenceResult, DebugLevel, EngineConfig, EngineError,
    FlowTrace, IndicatorAdapter, MarketSnapshot, ResultMetadata,
};
use futures_util::future::join_all;
use serde_json::Value;

use crate::cache::{CacheMetricsSnapshot, StampedeCache};
use crate::normalizer::TimeframeNormalizer;
use crate::registry::{compute_guarded, IndicatorRegistry};
use crate::validator::{MarketDataValidator, ValidationReport};
use crate::weights::WeightTable;

/// How one indicator's score was obtained.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Computed,
    Skipped,
    Failed(EngineError),
}

/// Payload that made it through validation.
struct Prepared {
    snapshot: MarketSnapshot,
    report: ValidationReport,
}

/// Scores market payloads with a fixed set of indicators and weights.
///
/// Built once at startup from a resolved [`EngineConfig`]. Safe to share
/// across tasks: `analyze` takes `&self` and keeps all per-call state
/// (including the debug trace) on its own stack.
pub struct ConfluenceAnalyzer {
    config: EngineConfig,
    registry: IndicatorRegistry,
    weights: WeightTable,
    normalizer: TimeframeNormalizer,
    validator: MarketDataValidator,
    cache: Option<Arc<StampedeCache>>,
}

impl ConfluenceAnalyzer {
    /// Creates an analyzer over `registry`.
    ///
    /// The weight table is resolved here from the registered indicator
    /// names; corrections are logged once and kept on the table.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        registry: IndicatorRegistry,
        cache: Option<Arc<StampedeCache>>,
    ) -> Self {
        let weights =
            WeightTable::from_config(registry.names(), &config.weights, config.default_weight);
        let normalizer = TimeframeNormalizer::new(&config.timeframes);
        let validator = MarketDataValidator::new(config.validation.clone(), normalizer.clone());

        tracing::info!(
            indicators = registry.len(),
            cached = cache.is_some() && config.cache.enabled,
            corrections = weights.corrections().len(),
            "Confluence analyzer ready"
        );

        Self {
            config,
            registry,
            weights,
            normalizer,
            validator,
            cache,
        }
    }

    /// Analyzer with the reference indicators named in the config.
    #[must_use]
    pub fn from_config(config: EngineConfig, cache: Option<Arc<StampedeCache>>) -> Self {
        let registry = IndicatorRegistry::from_config(&config);
        Self::new(config, registry, cache)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Metrics of the injected cache, if any.
    #[must_use]
    pub fn cache_metrics(&self) -> Option<CacheMetricsSnapshot> {
        self.cache.as_ref().map(|c| c.metrics())
    }

    /// Scores one raw payload. Never fails.
    ///
    /// The payload may be lightly corrected during validation (synthetic
    /// timestamp, unusable sections removed).
    pub async fn analyze(&self, mut payload: Value) -> ConfluenceResult {
        let mut trace = FlowTrace::start(self.config.debug.enabled);
        let detailed = self.config.debug.level == DebugLevel::Detailed;

        let prepared = match self.prepare(&mut payload, &mut trace) {
            Ok(prepared) => prepared,
            Err(report) => return self.default_result(report, trace),
        };
        let Prepared { snapshot, report } = prepared;

        let runs = self.registry.iter().map(|(name, adapter)| {
            let snapshot = &snapshot;
            async move {
                let (result, outcome) = self.score_one(adapter, snapshot).await;
                (name.to_string(), result, outcome)
            }
        });
        let outcomes = join_all(runs).await;

        let mut results = BTreeMap::new();
        let mut failed = 0usize;
        for (name, result, outcome) in outcomes {
            if detailed {
                let detail = match &outcome {
                    Outcome::Computed => format!("score {:.2}", result.score),
                    Outcome::Skipped => "insufficient data, neutral".to_string(),
                    Outcome::Failed(e) => format!("neutralized: {e}"),
                };
                trace.record(&format!("indicator:{name}"), detail);
            }
            if matches!(outcome, Outcome::Failed(_)) {
                failed += 1;
            }
            results.insert(name, result);
        }
        trace.record(
            "indicators",
            format!("{} run, {failed} neutralized", results.len()),
        );

        let combination = self.weights.combine(&results);
        trace.record(
            "aggregate",
            format!(
                "score {:.2}, reliability {:.3}",
                combination.confluence_score, combination.reliability
            ),
        );

        tracing::info!(
            symbol = %snapshot.symbol,
            score = combination.confluence_score,
            reliability = combination.reliability,
            degraded = report.is_degraded(),
            elapsed_ms = trace.elapsed_ms(),
            "Confluence computed"
        );

        let metadata = ResultMetadata {
            flow_id: trace.flow_id().to_string(),
            symbol: snapshot.symbol.clone(),
            calculation_time: trace.elapsed_ms(),
            validity_ratio: report.validity_ratio,
            degraded: report.is_degraded(),
            error: None,
            debug_info: trace.finish(),
        };

        ConfluenceResult {
            timestamp: chrono::Utc::now().timestamp_millis(),
            confluence_score: combination.confluence_score,
            reliability: combination.reliability,
            scores: combination.scores,
            components: combination.components,
            metadata,
        }
    }

    /// Runs both validation passes without scoring.
    pub fn validate_only(&self, payload: &mut Value) -> ValidationReport {
        let mut trace = FlowTrace::start(false);
        match self.prepare(payload, &mut trace) {
            Ok(prepared) => prepared.report,
            Err(report) => report,
        }
    }

    /// Validation, normalization and coverage. `Err` carries the report of
    /// a rejected payload.
    fn prepare(
        &self,
        payload: &mut Value,
        trace: &mut FlowTrace,
    ) -> Result<Prepared, ValidationReport> {
        let outcome = self.validator.validate(payload);
        let mut report = outcome.report;
        let Some(mut parsed) = outcome.parsed else {
            trace.record("validate", "rejected");
            return Err(report);
        };
        trace.record(
            "validate",
            format!(
                "{} usable, {} dropped timeframes",
                report.usable_timeframes.len(),
                report.dropped_timeframes.len()
            ),
        );

        let tables = std::mem::take(&mut parsed.tables);
        let normalized = self.normalizer.normalize(tables);
        let filled = normalized.report.filled_roles();
        if !filled.is_empty() {
            let roles: Vec<&str> = filled.iter().map(|r| r.as_str()).collect();
            report.warn(format!("timeframes approximated: {}", roles.join(", ")));
        }
        trace.record("normalize", format!("{} roles filled", filled.len()));

        let snapshot = parsed.into_snapshot(normalized.tables);
        self.validator
            .assess_coverage(&mut report, &snapshot, &self.registry);
        trace.record(
            "coverage",
            format!("validity ratio {:.3}", report.validity_ratio.unwrap_or(0.0)),
        );

        if report.is_valid() {
            Ok(Prepared { snapshot, report })
        } else {
            Err(report)
        }
    }

    /// Scores one indicator, substituting neutral on skip or failure.
    async fn score_one(
        &self,
        adapter: &Arc<dyn IndicatorAdapter>,
        snapshot: &MarketSnapshot,
    ) -> (ComponentResult, Outcome) {
        if !adapter.can_run(snapshot) {
            tracing::debug!(indicator = %adapter.name(), "Insufficient data, scoring neutral");
            let result = ComponentResult::neutral().with_signal("status", "insufficient_data");
            return (result, Outcome::Skipped);
        }

        let cached = self
            .cache
            .as_ref()
            .filter(|_| self.config.cache.enabled)
            .and_then(|cache| Some((cache, adapter.cache_input(snapshot)?)));

        let computed = match cached {
            Some((cache, input)) => {
                let request = serde_json::json!({
                    "params": adapter.cache_params(),
                    "input": input,
                });
                let key = cache.key(&snapshot.symbol, adapter.name(), &request);
                cache
                    .try_get_or_compute(
                        &key,
                        || compute_guarded(adapter.as_ref(), snapshot),
                        cache.ttl_for(adapter.data_class()),
                    )
                    .await
            }
            None => compute_guarded(adapter.as_ref(), snapshot).await,
        };

        match computed {
            Ok(mut result) => {
                result.score = clamp_score(result.score);
                (result, Outcome::Computed)
            }
            Err(e) => {
                tracing::warn!(
                    indicator = %adapter.name(),
                    symbol = %snapshot.symbol,
                    error = %e,
                    "Indicator failed, substituting neutral score"
                );
                (ComponentResult::neutral(), Outcome::Failed(e))
            }
        }
    }

    fn default_result(&self, report: ValidationReport, trace: FlowTrace) -> ConfluenceResult {
        let reason = report
            .error
            .clone()
            .unwrap_or_else(|| "payload rejected".to_string());
        let error = EngineError::Validation(reason);
        tracing::warn!(symbol = ?report.symbol, error = %error, "Returning default result");

        let metadata = ResultMetadata {
            flow_id: trace.flow_id().to_string(),
            symbol: report.symbol.clone().unwrap_or_default(),
            calculation_time: trace.elapsed_ms(),
            validity_ratio: report.validity_ratio,
            degraded: false,
            error: Some(error.to_string()),
            debug_info: trace.finish(),
        };
        ConfluenceResult::neutral_default(
            chrono::Utc::now().timestamp_millis(),
            self.weights.iter(),
            metadata,
        )
    }
}

impl std::fmt::Debug for ConfluenceAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceAnalyzer")
            .field("registry", &self.registry)
            .field("weights", &self.weights)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
